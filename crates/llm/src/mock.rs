//! A deterministic, first-class "mock" backend (Design Notes §9): every
//! [`AgentKind`] can be routed here so a session runs end-to-end offline,
//! with reproducible token counts for tests.

use async_trait::async_trait;
use futures::stream;
use wenshape_protocol::{AgentKind, LLMError};

use crate::gateway::{ChatStream, LLMGateway};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, FinishReason, ProviderId, ProviderProfile,
    TokenUsage,
};

const MOCK_MODEL: &str = "mock-1";
const MOCK_MAX_TOKENS: u32 = 8192;

pub struct MockGateway {
    profile: ProviderProfile,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            profile: ProviderProfile {
                id: ProviderId::Mock,
                model: MOCK_MODEL.to_string(),
                max_tokens: MOCK_MAX_TOKENS,
                can_stream: true,
                can_generate_yaml: true,
            },
        }
    }
}

#[async_trait]
impl LLMGateway for MockGateway {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let content = reply_for(&request.messages);
        let usage = usage_for(&request.messages, &content);
        Ok(ChatResponse { content, usage, model: self.profile.model.clone(), finish_reason: FinishReason::Stop })
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let content = reply_for(&request.messages);
        let chunks: Vec<Result<String, LLMError>> =
            content.split_inclusive(' ').map(|chunk| Ok(chunk.to_string())).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    fn get_provider_for_agent(&self, _agent: AgentKind) -> ProviderId {
        ProviderId::Mock
    }

    fn get_profile_by_id(&self, provider_id: &ProviderId) -> Option<ProviderProfile> {
        match provider_id {
            ProviderId::Mock => Some(self.profile.clone()),
            ProviderId::Named(_) => None,
        }
    }
}

/// Echoes the last user turn back with a fixed prefix. Deterministic by
/// construction: no randomness, no clock, no external call.
fn reply_for(messages: &[ChatMessage]) -> String {
    let last_user = messages.iter().rev().find(|m| m.role == ChatRole::User);
    match last_user {
        Some(msg) => format!("[mock] {}", truncate_chars(&msg.content, 200)),
        None => "[mock] (no user turn provided)".to_string(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn usage_for(messages: &[ChatMessage], content: &str) -> TokenUsage {
    let prompt_tokens: u32 = messages.iter().map(|m| word_count(&m.content)).sum();
    let completion_tokens = word_count(content);
    TokenUsage { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn chat_echoes_last_user_turn() {
        let gateway = MockGateway::new();
        let request = ChatRequest::new(vec![
            ChatMessage::system("You are a helpful writer."),
            ChatMessage::user("Draft chapter one."),
        ]);
        let response = gateway.chat(request).await.unwrap();
        assert!(response.content.contains("Draft chapter one."));
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn chat_is_deterministic_across_calls() {
        let gateway = MockGateway::new();
        let make_request = || ChatRequest::new(vec![ChatMessage::user("Same prompt")]);
        let first = gateway.chat(make_request()).await.unwrap();
        let second = gateway.chat(make_request()).await.unwrap();
        assert_eq!(first.content, second.content);
        assert_eq!(first.usage.total_tokens, second.usage.total_tokens);
    }

    #[tokio::test]
    async fn stream_chat_reassembles_to_the_same_content_as_chat() {
        let gateway = MockGateway::new();
        let prompt = "Summarize the prior chapter.";
        let response = gateway.chat(ChatRequest::new(vec![ChatMessage::user(prompt)])).await.unwrap();

        let mut stream = gateway.stream_chat(ChatRequest::new(vec![ChatMessage::user(prompt)])).await.unwrap();
        let mut reassembled = String::new();
        while let Some(chunk) = stream.next().await {
            reassembled.push_str(&chunk.unwrap());
        }
        assert_eq!(reassembled, response.content);
    }

    #[test]
    fn every_agent_kind_resolves_to_the_mock_provider() {
        let gateway = MockGateway::new();
        for agent in AgentKind::ALL {
            assert_eq!(gateway.get_provider_for_agent(agent), ProviderId::Mock);
        }
    }

    #[test]
    fn profile_reports_yaml_and_stream_capability() {
        let gateway = MockGateway::new();
        let profile = gateway.get_profile_by_id(&ProviderId::Mock).unwrap();
        assert!(profile.can_generate_yaml);
        assert!(profile.can_stream);
    }
}
