//! Chapter Binding Service (spec §4.5): answers "who is in this chapter?"
//! by scoring character, world-entity, and world-rule candidates against
//! a chapter's resolved draft text and persisting the result as a
//! [`ChapterBinding`](wenshape_protocol::ChapterBinding).

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod candidates;
pub mod scoring;
pub mod service;
pub mod stopwords;

pub use service::{batch_rebuild, build_binding, extract_entities_from_text, extract_loose_mentions, get_seed_entities};
