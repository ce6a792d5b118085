//! Post-finalize analysis: chapter/volume summaries, canon updates,
//! conflict detection, card proposals, and the batch-sync driver that
//! runs all of them across a chapter range.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod batch;
pub mod canon;
pub mod chapter_summary;
pub mod proposals;

pub use batch::{run_batch_sync, BatchSyncReport};
pub use canon::{
    detect_fact_conflicts, detect_state_conflicts, detect_timeline_conflicts, extract_canon_updates,
    CanonUpdates, Conflict, ConflictKind, DEFAULT_AVG_CHAPTERS_PER_VOLUME,
};
pub use chapter_summary::{generate_chapter_summary, refresh_volume_summary};
pub use proposals::{create_cards_from_proposals, detect_proposals};
