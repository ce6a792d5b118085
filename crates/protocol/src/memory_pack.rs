//! Memory packs (spec §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;
use crate::evidence::EvidenceItem;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardSnapshot {
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub world: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BriefSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub goal: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub queries: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub round: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SufficiencyReport {
    #[serde(default)]
    pub sufficient: bool,
    #[serde(default)]
    pub needs_user_input: bool,
    #[serde(default)]
    pub missing_entities: Vec<String>,
    #[serde(default)]
    pub unresolved_gaps: Vec<String>,
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchTraceEntry {
    pub round: u32,
    pub queries: Vec<String>,
    pub types: Vec<String>,
    pub count: usize,
    pub hits: usize,
    #[serde(default)]
    pub top_sources: Vec<String>,
    #[serde(default)]
    pub extra_queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPackPayload {
    #[serde(default)]
    pub working_memory: String,
    #[serde(default)]
    pub evidence_pack: Vec<EvidenceItem>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub unresolved_gaps: Vec<String>,
    #[serde(default)]
    pub seed_entities: Vec<String>,
    #[serde(default)]
    pub retrieval_requests: Vec<RetrievalRequest>,
    #[serde(default)]
    pub sufficiency_report: SufficiencyReport,
    #[serde(default)]
    pub research_trace: Vec<ResearchTraceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_stop_reason: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl MemoryPackPayload {
    pub fn is_empty(&self) -> bool {
        self.working_memory.is_empty() && self.evidence_pack.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPack {
    pub chapter: ChapterId,
    pub built_at: DateTime<Utc>,
    pub source: String,
    pub chapter_goal: String,
    pub scene_brief: BriefSnapshot,
    pub card_snapshot: CardSnapshot,
    pub payload: MemoryPackPayload,
}
