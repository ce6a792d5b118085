//! LLM gateway abstraction (spec §6.1): one trait agents and orchestration
//! code call through, a first-class deterministic mock backend, the spec §5
//! retry policy, and tolerant parsing of YAML/JSON model output.
//!
//! HTTP-backed providers are assembled by an outer binary from whatever
//! credentials it holds; this crate only defines the seam and ships the
//! backend every test and offline session can always reach.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod gateway;
pub mod mock;
pub mod retry;
pub mod tolerant;
pub mod types;

pub use gateway::{ChatStream, LLMGateway};
pub use mock::MockGateway;
pub use retry::with_retry;
pub use tolerant::{parse_json, parse_yaml, TolerantParseError};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, FinishReason, ProviderId, ProviderProfile,
    TokenUsage,
};
