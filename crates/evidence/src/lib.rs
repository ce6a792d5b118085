//! Evidence indexing and retrieval (spec §4.3 BM25 evidence indices, §4.4
//! text-chunk indexer): builds per-source JSONL indices under a
//! project's `index/` directory and ranks them against research/context
//! queries.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod bm25;
pub mod builders;
pub mod index;
pub mod text_chunks;
pub mod tokenize;

pub use index::{
    apply_type_quotas, append_memory_items, build_all, build_cards_index, build_facts_index,
    build_summaries_index, build_text_chunks_index, default_quotas, search, BuildReport,
    SearchQuery, SearchResult, SearchStats, TypeQuota,
};
pub use text_chunks::{chunk_text, ChunkConfig, RerankError, SemanticReranker, TextChunkQuery};
