//! Memory-pack building and caching: resolves a chapter's authoritative
//! `memory_packs/<chapter>.json`, refreshing it through the research
//! loop when nothing usable is cached, and falling back to the prior
//! pack when a refresh fails.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod builder;
pub mod card_snapshot;

pub use builder::{ensure_memory_pack, EnsureMemoryPackInput};
pub use card_snapshot::{build_card_snapshot, is_snapshot_empty};
