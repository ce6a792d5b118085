//! Wire-ish types for the gateway boundary (spec §6.1). These are distinct
//! from [`wenshape_protocol::Card`] etc.: they describe one chat exchange,
//! not domain state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// One request to a [`crate::gateway::LLMGateway`].
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub provider: Option<ProviderId>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Whether a transient failure should be retried (spec §5). Agents that
    /// stream partial output to a session already in progress usually pass
    /// `false`, since a mid-stream retry would duplicate already-emitted
    /// tokens; one-shot calls default to `true`.
    pub retry: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, provider: None, temperature: None, max_tokens: None, retry: true }
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: FinishReason,
}

/// Identifies a configured backend. `Mock` is first-class (Design Notes
/// §9), not a magic string: a session can run entirely offline by routing
/// every [`AgentKind`](wenshape_protocol::AgentKind) to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderId {
    Mock,
    Named(String),
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::Mock => write!(f, "mock"),
            ProviderId::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Capabilities of a configured backend, so callers branch on capability
/// rather than on provider identity (Design Notes §9).
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub id: ProviderId,
    pub model: String,
    pub max_tokens: u32,
    pub can_stream: bool,
    /// Whether this backend reliably produces well-formed YAML when asked;
    /// the archivist/extractor agents fall back to a stricter prompt or a
    /// retry when this is `false`.
    pub can_generate_yaml: bool,
}
