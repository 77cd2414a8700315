use crate::checksum::ChecksumDescriptor;
use chrono::NaiveDateTime;

/// Bitmask of region characters ('A'..='Z') a signature applies to.
///
/// GameCube game codes carry the region in their fourth character ('E' for
/// NTSC-U, 'J' for NTSC-J, 'P' for PAL, ...); a signature may list extra
/// region characters beyond the one baked into its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionSet(pub u32);

impl RegionSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_char(c: char) -> Self {
        let mut set = Self::new();
        set.insert(c);
        set
    }

    fn bit(c: char) -> Option<u32> {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_uppercase() {
            Some(1 << (c as u32 - 'A' as u32))
        } else {
            None
        }
    }

    pub fn insert(&mut self, c: char) {
        if let Some(bit) = Self::bit(c) {
            self.0 |= bit;
        }
    }

    pub fn contains(&self, c: char) -> bool {
        Self::bit(c).map_or(false, |bit| self.0 & bit != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RegionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in 'A'..='Z' {
            if self.contains(c) {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

/// Scan parameters supplied by the caller.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Region character to prefer when several signatures match one block.
    pub preferred_region: Option<char>,

    /// Also scan blocks the card's own bitmap marks as used.
    pub include_used_blocks: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            preferred_region: None,
            include_used_blocks: false,
        }
    }
}

/// Notification sent over the scan event channel.
///
/// Delivery order is start, zero or more progress updates, then exactly one
/// of finished/cancelled/error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Started {
        total_blocks: usize,
        blocks_to_search: usize,
        first_block: usize,
    },
    Progress {
        current_block: usize,
        scanned: usize,
        found: usize,
    },
    Finished {
        found: usize,
    },
    Cancelled,
    Error {
        message: String,
    },
}

/// Fixed directory-entry fields copied from a signature's template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirEntryFields {
    pub banner_format: u8,
    pub icon_address: u32,
    pub icon_format: u16,
    pub icon_speed: u16,
    pub permission: u8,
    /// Declared file length in blocks.
    pub length: u16,
}

/// An unconfirmed match between a block's content and a signature, prior to
/// region tie-break selection.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    /// Human-readable signature title, for UI listing.
    pub description: String,

    /// Six-character game+company code, region-adjusted if a preferred
    /// region was applicable.
    pub id6: [u8; 6],

    /// Regions the matched signature applies to.
    pub regions: RegionSet,

    /// Filename rendered from the signature's template and the captured
    /// variables.
    pub filename: String,

    /// Timestamp reconstructed from captured date/time variables, if the
    /// signature declares any.
    pub timestamp: Option<NaiveDateTime>,

    pub dir_entry: DirEntryFields,

    /// Expanded checksum descriptors for the external checksum library.
    pub checksums: Vec<ChecksumDescriptor>,
}

impl EntryDraft {
    /// Region character baked into this draft's game code.
    pub fn region_char(&self) -> char {
        self.id6[3] as char
    }
}

/// A reconstructed directory record for one recovered file.
///
/// Created by the scanner when a signature matches a block; consumed by the
/// caller to materialize a real directory entry. Never persisted here.
#[derive(Debug, Clone)]
pub struct SyntheticEntry {
    pub draft: EntryDraft,

    /// Block the signature matched at (first block of the file).
    pub block: usize,

    /// Ordered allocation chain, starting with `block`.
    pub chain: Vec<usize>,
}

/// Per-pass counter of blocks claimed by chain reconstruction.
///
/// Seeded from the card's own used-block bitmap, incremented (saturating) as
/// chains claim blocks, never decremented during a pass.
#[derive(Debug, Clone)]
pub struct UsedBlockMap {
    counts: Vec<u8>,
}

impl UsedBlockMap {
    pub fn new(total_blocks: usize) -> Self {
        Self {
            counts: vec![0; total_blocks],
        }
    }

    /// Seed from a card bitmap plus its reserved system blocks.
    pub fn from_card_state(bitmap: &[bool], system_blocks: usize) -> Self {
        let mut map = Self::new(bitmap.len());
        for (idx, &used) in bitmap.iter().enumerate() {
            if used || idx < system_blocks {
                map.claim(idx);
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn claim(&mut self, block: usize) {
        if let Some(count) = self.counts.get_mut(block) {
            *count = count.saturating_add(1);
        }
    }

    pub fn count(&self, block: usize) -> u8 {
        self.counts.get(block).copied().unwrap_or(0)
    }

    pub fn is_used(&self, block: usize) -> bool {
        self.count(block) > 0
    }
}
