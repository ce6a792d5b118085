//! Chapter and volume summaries (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub chapter: ChapterId,
    pub volume_id: String,
    pub title: String,
    pub word_count: usize,
    #[serde(default)]
    pub key_events: Vec<String>,
    #[serde(default)]
    pub new_facts: Vec<String>,
    #[serde(default)]
    pub character_state_changes: Vec<String>,
    #[serde(default)]
    pub open_loops: Vec<String>,
    pub brief_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub volume_id: String,
    pub brief_summary: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub major_events: Vec<String>,
    pub chapter_count: usize,
    pub timestamps: DateTime<Utc>,
}
