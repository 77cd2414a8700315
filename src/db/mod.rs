//! Signature database: loads save-file signature definitions and classifies
//! raw blocks against them.

pub mod def;

use crate::card::{CommentRegionLayout, GCN_BLOCK_SIZE};
use crate::error::LoadError;
use crate::types::EntryDraft;
use crate::vars;
use encoding_rs::{SHIFT_JIS, WINDOWS_1252};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

pub use def::{FileSignature, RecordError, SignatureRecord};

/// Card geometry the database needs to index and classify blocks.
///
/// Passed in explicitly; the database carries no global state and may be
/// shared read-only across any number of scans.
#[derive(Debug, Clone, Copy)]
pub struct DbConfig {
    /// Block size in bytes; search addresses are masked to this.
    pub block_size: usize,
    pub layout: CommentRegionLayout,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            block_size: GCN_BLOCK_SIZE,
            layout: CommentRegionLayout::default(),
        }
    }
}

/// Ephemeral result of classifying one block against one signature.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    /// Index of the matched signature within its database.
    pub signature: usize,

    /// Raw capture groups of the game-description regex (group 0 first).
    pub game_captures: Vec<Option<String>>,

    /// Raw capture groups of the file-description regex.
    pub file_captures: Vec<Option<String>>,

    /// Merged variable map: `G0,G1,…` from the game description,
    /// `F0,F1,…` from the file description.
    pub vars: HashMap<String, String>,
}

/// An indexed set of file signatures.
pub struct SignatureDb {
    config: DbConfig,
    signatures: Vec<FileSignature>,

    /// Signature indices grouped by masked comment-region address.
    buckets: BTreeMap<usize, Vec<usize>>,
}

impl SignatureDb {
    /// Parse a TOML signature document.
    ///
    /// Individually malformed records are logged and skipped; the load only
    /// fails when the document is unparseable or yields no valid records.
    pub fn load(source: &str, config: DbConfig) -> Result<Self, LoadError> {
        let document: def::DbDocument = toml::from_str(source)?;

        let mut signatures = Vec::new();
        for (index, record) in document.signatures.into_iter().enumerate() {
            match record.compile(config.block_size, config.layout) {
                Ok(sig) => signatures.push(sig),
                Err(e) => warn!(record = index, error = %e, "skipping signature record"),
            }
        }

        if signatures.is_empty() {
            return Err(LoadError::NoValidRecords);
        }

        let mut buckets: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, sig) in signatures.iter().enumerate() {
            buckets.entry(sig.address).or_default().push(index);
        }

        Ok(Self {
            config,
            signatures,
            buckets,
        })
    }

    /// Load a signature document from a file.
    pub fn load_file<P: AsRef<Path>>(path: P, config: DbConfig) -> Result<Self, LoadError> {
        let source = std::fs::read_to_string(path)?;
        Self::load(&source, config)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn signature(&self, index: usize) -> &FileSignature {
        &self.signatures[index]
    }

    /// Match a block's comment regions against every signature.
    ///
    /// A signature matches only when both of its regexes match some decoded
    /// candidate; each regex may independently match either the primary
    /// (cp1252) or Japanese (Shift_JIS) decoding.
    pub fn matches(&self, block: &[u8]) -> Vec<SearchMatch> {
        let layout = self.config.layout;
        let mut found = Vec::new();

        for (&address, indices) in &self.buckets {
            if address + layout.total_len() > block.len() {
                continue;
            }

            let game_bytes = &block[address..address + layout.game_desc_len];
            let file_bytes =
                &block[address + layout.game_desc_len..address + layout.total_len()];
            let game_texts = decode_candidates(game_bytes);
            let file_texts = decode_candidates(file_bytes);

            for &index in indices {
                let sig = &self.signatures[index];
                let Some(game_captures) = capture_any(&sig.game_desc, &game_texts) else {
                    continue;
                };
                let Some(file_captures) = capture_any(&sig.file_desc, &file_texts) else {
                    continue;
                };

                let mut vars = HashMap::new();
                merge_captures(&mut vars, 'G', &game_captures);
                merge_captures(&mut vars, 'F', &file_captures);

                found.push(SearchMatch {
                    signature: index,
                    game_captures,
                    file_captures,
                    vars,
                });
            }
        }

        found
    }

    /// Classify a block: match signatures, then render a draft entry for
    /// each match whose variable modifiers accept the captured values.
    pub fn classify(&self, block: &[u8]) -> Vec<EntryDraft> {
        self.matches(block)
            .into_iter()
            .filter_map(|m| {
                let sig = &self.signatures[m.signature];
                match vars::apply_modifiers(&sig.variables, &m.vars) {
                    Ok((rendered, timestamp)) => Some(EntryDraft {
                        description: sig.description.clone(),
                        id6: sig.id6,
                        regions: sig.regions,
                        filename: vars::substitute(&sig.filename_template, &rendered),
                        timestamp,
                        dir_entry: sig.dir_entry.clone(),
                        checksums: sig.checksums.clone(),
                    }),
                    Err(e) => {
                        debug!(signature = %sig.description, error = %e,
                               "modifier rejected captured value");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Decode a description field with both candidate encodings, trimming
/// trailing NUL padding first. Primary region (cp1252) comes first.
fn decode_candidates(bytes: &[u8]) -> Vec<String> {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    let trimmed = &bytes[..end];

    let (primary, _, _) = WINDOWS_1252.decode(trimmed);
    let (japanese, _, _) = SHIFT_JIS.decode(trimmed);

    let mut candidates = vec![primary.into_owned()];
    let japanese = japanese.into_owned();
    if japanese != candidates[0] {
        candidates.push(japanese);
    }
    candidates
}

/// Run a regex over the candidates in order, returning the first capture
/// set, with group 0 preserved.
fn capture_any(regex: &regex::Regex, candidates: &[String]) -> Option<Vec<Option<String>>> {
    candidates.iter().find_map(|text| {
        regex.captures(text).map(|caps| {
            caps.iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect()
        })
    })
}

fn merge_captures(vars: &mut HashMap<String, String>, prefix: char, captures: &[Option<String>]) {
    for (i, group) in captures.iter().enumerate() {
        if let Some(value) = group {
            vars.insert(format!("{}{}", prefix, i), value.clone());
        }
    }
}
