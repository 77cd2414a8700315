//! Lost-file recovery engine for GameCube-family memory card images.
//!
//! Recovers save entries whose directory/allocation metadata was erased
//! while the data blocks survived:
//! - Signature database of known save-file layouts (TOML records)
//! - Block classifier matching comment-region text against paired regexes,
//!   decoded as cp1252 and Shift_JIS
//! - Variable/template engine synthesizing filenames and timestamps from
//!   captured text
//! - Heuristic allocation-chain reconstructor with a per-pass used-block map
//! - Scan controller with synchronous and worker-thread execution, progress
//!   streaming via tokio::sync::mpsc
//!
//! The engine only reads blocks; applying reconstructed entries to a card,
//! checksum computation and the GUI all live with the caller.

pub mod card;
pub mod checksum;
pub mod controller;
pub mod db;
pub mod error;
pub mod scanner;
pub mod types;
pub mod vars;

// Re-export commonly used types
pub use card::{Card, CommentRegionLayout, ImageCard, GCN_BLOCK_SIZE, GCN_SYSTEM_BLOCKS};
pub use checksum::{ChecksumAlgorithm, ChecksumDescriptor, MAX_CHECKSUM_INSTANCES};
pub use controller::ScanController;
pub use db::{DbConfig, FileSignature, SearchMatch, SignatureDb};
pub use error::{LoadError, ModifierError, ScanError};
pub use scanner::{BlockScanner, ScanState};
pub use types::{
    DirEntryFields, EntryDraft, RegionSet, ScanEvent, ScanOptions, SyntheticEntry, UsedBlockMap,
};
pub use vars::{parse_integer, remap_fullwidth, substitute, VarAlign, VarKind, VarModifier, VarRole};
