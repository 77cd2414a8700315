//! Block scanner: drives a full-card pass and reconstructs directory entries
//! and allocation chains for every signature match.

use crate::card::Card;
use crate::db::SignatureDb;
use crate::error::ScanError;
use crate::types::{EntryDraft, ScanEvent, ScanOptions, SyntheticEntry, UsedBlockMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Lifecycle of one scanner instance. No retries: a scan completes, is
/// cancelled, or fails outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Finished,
    Cancelled,
    Errored,
}

/// One-pass scanner over a card's blocks.
///
/// The scanner exclusively owns its used-block map for the duration of a
/// pass; databases are only read and may be shared across scans.
pub struct BlockScanner {
    options: ScanOptions,
    cancel: Arc<AtomicBool>,
    state: ScanState,
    used_map: Option<UsedBlockMap>,
}

impl BlockScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self::with_cancel(options, Arc::new(AtomicBool::new(false)))
    }

    /// Construct with an externally owned cancellation flag, so a controller
    /// can cancel a scanner living on a worker thread.
    pub fn with_cancel(options: ScanOptions, cancel: Arc<AtomicBool>) -> Self {
        Self {
            options,
            cancel,
            state: ScanState::Idle,
            used_map: None,
        }
    }

    /// Shared flag a controller can set to stop the scan; polled once per
    /// block.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Used-block map of the last completed pass.
    pub fn used_map(&self) -> Option<&UsedBlockMap> {
        self.used_map.as_ref()
    }

    /// Scan every candidate block and reconstruct an entry per match.
    ///
    /// Events mirror the return value: `Started`, one `Progress` per block,
    /// then exactly one of `Finished`/`Cancelled`/`Error`.
    pub fn scan(
        &mut self,
        card: &dyn Card,
        databases: &[Arc<SignatureDb>],
        events: Option<&UnboundedSender<ScanEvent>>,
    ) -> Result<Vec<SyntheticEntry>, ScanError> {
        if databases.is_empty() || databases.iter().all(|db| db.is_empty()) {
            self.state = ScanState::Errored;
            emit(events, ScanEvent::Error {
                message: ScanError::NoDatabases.to_string(),
            });
            return Err(ScanError::NoDatabases);
        }

        self.state = ScanState::Running;

        let total_blocks = card.total_blocks();
        let system_blocks = card.system_block_count();
        let bitmap = card.used_block_bitmap();

        // Non-system blocks in descending index order, optionally restricted
        // to blocks the card itself considers free.
        let candidates: Vec<usize> = (system_blocks..total_blocks)
            .rev()
            .filter(|&block| self.options.include_used_blocks || !bitmap[block])
            .collect();

        emit(events, ScanEvent::Started {
            total_blocks,
            blocks_to_search: candidates.len(),
            first_block: candidates.first().copied().unwrap_or(0),
        });

        let mut used_map = UsedBlockMap::from_card_state(&bitmap, system_blocks);
        let mut entries: Vec<SyntheticEntry> = Vec::new();
        let mut scanned = 0usize;

        for &block in &candidates {
            if self.cancel.load(Ordering::SeqCst) {
                self.state = ScanState::Cancelled;
                self.used_map = Some(used_map);
                emit(events, ScanEvent::Cancelled);
                return Ok(entries);
            }

            scanned += 1;

            let data = match card.read_block(block) {
                Ok(data) if data.len() >= card.block_size() => data,
                Ok(data) => {
                    warn!(block, got = data.len(), "short block read, skipping");
                    emit_progress(events, block, scanned, entries.len());
                    continue;
                }
                Err(e) => {
                    warn!(block, error = %e, "block read failed, skipping");
                    emit_progress(events, block, scanned, entries.len());
                    continue;
                }
            };

            let mut drafts: Vec<EntryDraft> = databases
                .iter()
                .flat_map(|db| db.classify(&data))
                .collect();

            if drafts.is_empty() {
                emit_progress(events, block, scanned, entries.len());
                continue;
            }

            let draft = select_draft(&mut drafts, self.options.preferred_region);
            debug!(block, filename = %draft.filename, "signature match");

            let chain = reconstruct_chain(
                &mut used_map,
                block,
                draft.dir_entry.length as usize,
                system_blocks,
                total_blocks,
            );

            entries.push(SyntheticEntry {
                draft,
                block,
                chain,
            });
            emit_progress(events, block, scanned, entries.len());
        }

        self.state = ScanState::Finished;
        self.used_map = Some(used_map);
        emit(events, ScanEvent::Finished {
            found: entries.len(),
        });
        Ok(entries)
    }
}

fn emit(events: Option<&UnboundedSender<ScanEvent>>, event: ScanEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event);
    }
}

fn emit_progress(
    events: Option<&UnboundedSender<ScanEvent>>,
    current_block: usize,
    scanned: usize,
    found: usize,
) {
    emit(events, ScanEvent::Progress {
        current_block,
        scanned,
        found,
    });
}

/// Pick one draft from the matches at a block.
///
/// With a preferred region, the first draft covering that region wins and
/// gets its game code's region character rewritten to it; otherwise the
/// tie-break is stable definition order.
fn select_draft(drafts: &mut Vec<EntryDraft>, preferred_region: Option<char>) -> EntryDraft {
    let position = preferred_region
        .and_then(|region| drafts.iter().position(|d| d.regions.contains(region)))
        .unwrap_or(0);
    let mut draft = drafts.remove(position);

    if let Some(region) = preferred_region {
        if draft.regions.contains(region) {
            draft.id6[3] = region.to_ascii_uppercase() as u8;
        }
    }
    draft
}

/// Reconstruct an allocation chain of `length` blocks starting at `matched`.
///
/// Phase A walks forward (wrapping past the last block to the first
/// non-system block) claiming only unclaimed blocks, until the walk returns
/// to the matched block or the chain is full. Phase B continues from just
/// after phase A's last claim and takes every block, claimed or not. Blocks
/// reached after wrapping are never marked in the used map: they may belong
/// to real files not yet discovered, so a later chain in the same pass is
/// allowed to claim them again.
pub(crate) fn reconstruct_chain(
    used_map: &mut UsedBlockMap,
    matched: usize,
    length: usize,
    first_data_block: usize,
    total_blocks: usize,
) -> Vec<usize> {
    let mut chain = vec![matched];
    used_map.claim(matched);

    let step = |i: usize| {
        if i + 1 >= total_blocks {
            first_data_block
        } else {
            i + 1
        }
    };

    // Phase A: fill from unclaimed gaps.
    let mut wrapped = matched + 1 >= total_blocks;
    let mut cursor = step(matched);
    let mut last_claimed = matched;
    while chain.len() < length && cursor != matched {
        if !used_map.is_used(cursor) && !chain.contains(&cursor) {
            chain.push(cursor);
            if !wrapped {
                used_map.claim(cursor);
            }
            last_claimed = cursor;
        }
        if cursor + 1 >= total_blocks {
            wrapped = true;
        }
        cursor = step(cursor);
    }

    // Phase B: sequential fallback, claimed blocks included.
    if chain.len() < length {
        if last_claimed + 1 >= total_blocks {
            wrapped = true;
        }
        let mut cursor = step(last_claimed);
        let mut stalled = 0usize;
        while chain.len() < length {
            if !chain.contains(&cursor) {
                chain.push(cursor);
                if !wrapped {
                    used_map.claim(cursor);
                }
                stalled = 0;
            } else {
                stalled += 1;
                // A full lap without claiming anything: the card has fewer
                // free-standing blocks than the declared length.
                if stalled > total_blocks {
                    break;
                }
            }
            if cursor + 1 >= total_blocks {
                wrapped = true;
            }
            cursor = step(cursor);
        }
    }

    chain
}
