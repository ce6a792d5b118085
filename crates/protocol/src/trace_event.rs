//! Process-wide trace events (spec §3, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    AgentStart,
    AgentEnd,
    ToolCall,
    LlmRequest,
    ContextSelect,
    ContextCompress,
    HealthCheck,
    Handoff,
    Diff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TraceEventType,
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

impl TraceEvent {
    pub fn new(kind: TraceEventType, agent_name: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            agent_name: agent_name.into(),
            timestamp: Utc::now(),
            data,
            duration_ms: 0,
            parent_id: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}
