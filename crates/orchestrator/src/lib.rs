//! Session orchestration (spec §4.9, C9): ties the brief, memory-pack,
//! context-assembly, research, and analysis crates together into the
//! single state machine a chapter-writing session drives through.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod brief;
pub mod confirmations;
pub mod error;
pub mod session;
pub mod writer_context;

pub use brief::generate_scene_brief;
pub use confirmations::{collect_pending_confirmations, extract_confirmations};
pub use error::OrchestratorError;
pub use session::{ContextMode, EditSuggestion, FeedbackAction, Orchestrator};
pub use writer_context::{build_agent_context, context_for_writing, AgentContext, ChapterContext, RetrievalLevel, VolumeContext, WritingContext};
