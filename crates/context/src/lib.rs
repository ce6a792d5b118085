//! Context engineering pipeline (spec §4.6): token budgeting,
//! deterministic and retrieval-based item selection, compression, the
//! degradation guard, and final assembly into an agent-ready prompt
//! payload.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod assembly;
pub mod budget;
pub mod compress;
pub mod degradation;
pub mod select;
pub mod types;

pub use assembly::{AssembledContext, ContextOrchestrator, Section, SectionedItem};
pub use budget::BudgetManager;
pub use compress::{llm_compress, rule_based_compress, smart_compress, CompressError, CompressionBackend, CompressionStats, PreserveType};
pub use degradation::{health_check, DegradationFinding, DegradationKind, HealthCheck, Severity};
pub use select::{deterministic_select, retrieval_select};
pub use types::{estimate_tokens, BudgetCategory, ContextItem, ContextItemKind, Priority};
