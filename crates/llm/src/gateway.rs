//! The [`LLMGateway`] trait (spec §6.1): the one seam every agent and
//! orchestrator crate talks to. Concrete backends (mock, HTTP) live behind
//! it; callers never match on provider identity, only on
//! [`ProviderProfile`] capability flags.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use wenshape_protocol::{AgentKind, LLMError};

use crate::types::{ChatRequest, ChatResponse, ProviderId, ProviderProfile};

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

#[async_trait]
pub trait LLMGateway: Send + Sync {
    /// Sends `request` and waits for the full response. Retries transient
    /// failures per spec §5 when `request.retry` is `true`.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;

    /// Streams the response as it's generated. The orchestrator owns
    /// cancellation: dropping the stream (or the task polling it) stops
    /// generation without a separate cancel call.
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;

    /// Resolves which backend an agent role is currently routed to
    /// (spec §6.1's per-agent provider assignment).
    fn get_provider_for_agent(&self, agent: AgentKind) -> ProviderId;

    fn get_profile_by_id(&self, provider_id: &ProviderId) -> Option<ProviderProfile>;

    /// Convenience wrapper: resolves the agent's provider and its profile
    /// in one call.
    fn get_profile_for_agent(&self, agent: AgentKind) -> Option<ProviderProfile> {
        self.get_profile_by_id(&self.get_provider_for_agent(agent))
    }
}
