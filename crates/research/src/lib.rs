//! Multi-round retrieval planning for chapter memory packs: gap
//! extraction, query planning (LLM-backed with an offline fallback), and
//! the bounded research loop that drives them to a stop reason.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod gaps;
pub mod plan;
pub mod research_loop;
pub mod working_memory;

pub use gaps::{build_gap_items, GapItem};
pub use plan::{generate_research_plan, offline_plan, ResearchPlan};
pub use research_loop::{run_research_loop, ResearchLoopInput, MAX_RESEARCH_ROUNDS};
pub use working_memory::{PreparedRetrieval, WorkingMemoryService};
