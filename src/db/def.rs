//! On-disk signature definition records.
//!
//! A signature database is a TOML document of `[[signature]]` tables. Records
//! are deserialized leniently and then compiled into validated
//! [`FileSignature`]s; a record that fails validation is skipped on its own,
//! never failing the whole load.

use crate::card::CommentRegionLayout;
use crate::checksum::{ChecksumAlgorithm, ChecksumDescriptor};
use crate::types::{DirEntryFields, RegionSet};
use crate::vars::VarModifier;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Top-level document shape.
#[derive(Debug, Deserialize)]
pub struct DbDocument {
    #[serde(default, rename = "signature")]
    pub signatures: Vec<SignatureRecord>,
}

/// One raw `[[signature]]` record, prior to validation.
#[derive(Debug, Deserialize)]
pub struct SignatureRecord {
    #[serde(default)]
    pub description: String,

    /// Six-character game+company identity.
    pub id6: Option<String>,
    /// Legacy split identity: four-character game code...
    pub gamecode: Option<String>,
    /// ...plus two-character company code.
    pub company: Option<String>,

    /// Extra region characters beyond the one in the game code.
    #[serde(default)]
    pub regions: String,

    pub search: SearchRecord,

    #[serde(default, rename = "checksum")]
    pub checksums: Vec<ChecksumRecord>,

    pub dir_entry: DirEntryRecord,

    #[serde(default)]
    pub variables: HashMap<String, VarModifier>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRecord {
    /// Byte offset of the comment region, masked to one block.
    pub address: u32,
    pub game_desc: String,
    pub file_desc: String,
}

#[derive(Debug, Deserialize)]
pub struct ChecksumRecord {
    pub algorithm: ChecksumAlgorithm,
    pub param: Option<u32>,
    pub address: u32,
    pub start: u32,
    pub length: u32,
    /// Replicate this checksum `instances` times...
    #[serde(default)]
    pub instances: u32,
    /// ...spaced this many bytes apart.
    #[serde(default)]
    pub increment: u32,
}

#[derive(Debug, Deserialize)]
pub struct DirEntryRecord {
    /// Filename template; may embed `$G<n>` / `$F<n>` variables.
    pub filename: String,
    #[serde(default)]
    pub banner_format: u8,
    #[serde(default)]
    pub icon_address: u32,
    #[serde(default)]
    pub icon_format: u16,
    #[serde(default)]
    pub icon_speed: u16,
    #[serde(default)]
    pub permission: u8,
    /// File length in blocks.
    pub length: u16,
}

/// Why one record was rejected. Logged, never fatal.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("identity must be either id6 or gamecode+company, not a mix")]
    MixedIdentity,

    #[error("missing identity (id6 or gamecode+company)")]
    MissingIdentity,

    #[error("identity {0:?} is not the expected length")]
    BadIdentityLength(String),

    #[error("search address {0:#x} leaves no room for the comment region in a block")]
    AddressOutOfBlock(u32),

    #[error("checksum descriptor has a zero-length covered range")]
    ZeroChecksumRange,

    #[error("directory entry length must be at least one block")]
    ZeroBlockLength,

    #[error("bad regex: {0}")]
    BadRegex(#[from] regex::Error),
}

/// A validated, compiled signature ready for classification.
#[derive(Debug)]
pub struct FileSignature {
    pub description: String,
    pub id6: [u8; 6],
    pub regions: RegionSet,

    /// Comment-region offset, masked to the per-block address space.
    pub address: usize,
    pub game_desc: Regex,
    pub file_desc: Regex,

    /// Replication already expanded into concrete descriptors.
    pub checksums: Vec<ChecksumDescriptor>,

    pub filename_template: String,
    pub dir_entry: DirEntryFields,
    pub variables: HashMap<String, VarModifier>,
}

impl SignatureRecord {
    /// Validate and compile one record against the card geometry.
    pub fn compile(
        self,
        block_size: usize,
        layout: CommentRegionLayout,
    ) -> Result<FileSignature, RecordError> {
        let id6 = self.identity()?;

        let mut regions = RegionSet::from_char(id6[3] as char);
        for c in self.regions.chars() {
            regions.insert(c);
        }

        let address = self.search.address as usize & (block_size - 1);
        if address + layout.total_len() > block_size {
            return Err(RecordError::AddressOutOfBlock(self.search.address));
        }

        if self.dir_entry.length == 0 {
            return Err(RecordError::ZeroBlockLength);
        }

        let mut checksums = Vec::new();
        for record in &self.checksums {
            if record.length == 0 {
                return Err(RecordError::ZeroChecksumRange);
            }
            let base = ChecksumDescriptor {
                algorithm: record.algorithm,
                param: record.param,
                address: record.address,
                start: record.start,
                length: record.length,
            };
            checksums.extend(base.replicate(record.instances, record.increment));
        }

        Ok(FileSignature {
            description: self.description,
            id6,
            regions,
            address,
            game_desc: Regex::new(&self.search.game_desc)?,
            file_desc: Regex::new(&self.search.file_desc)?,
            checksums,
            filename_template: self.dir_entry.filename,
            dir_entry: DirEntryFields {
                banner_format: self.dir_entry.banner_format,
                icon_address: self.dir_entry.icon_address,
                icon_format: self.dir_entry.icon_format,
                icon_speed: self.dir_entry.icon_speed,
                permission: self.dir_entry.permission,
                length: self.dir_entry.length,
            },
            variables: self.variables,
        })
    }

    /// Resolve the identity fields into a fixed six-byte code.
    ///
    /// A record carries either an explicit `id6` or the legacy
    /// `gamecode`+`company` pair, never a mix of the two styles.
    fn identity(&self) -> Result<[u8; 6], RecordError> {
        let text = match (&self.id6, &self.gamecode, &self.company) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(RecordError::MixedIdentity)
            }
            (Some(id6), None, None) => {
                if id6.len() != 6 {
                    return Err(RecordError::BadIdentityLength(id6.clone()));
                }
                id6.clone()
            }
            (None, Some(game), Some(company)) => {
                if game.len() != 4 || company.len() != 2 {
                    return Err(RecordError::BadIdentityLength(format!(
                        "{}{}",
                        game, company
                    )));
                }
                format!("{}{}", game, company)
            }
            _ => return Err(RecordError::MissingIdentity),
        };

        let bytes = text.as_bytes();
        if !bytes.is_ascii() {
            return Err(RecordError::BadIdentityLength(text));
        }

        let mut id6 = [0u8; 6];
        id6.copy_from_slice(bytes);
        Ok(id6)
    }
}
