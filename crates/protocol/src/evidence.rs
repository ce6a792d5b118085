//! Evidence items and index metadata (spec §3, §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Fact,
    Summary,
    Character,
    WorldRule,
    WorldEntity,
    Style,
    TextChunk,
    Memory,
}

impl EvidenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceType::Fact => "fact",
            EvidenceType::Summary => "summary",
            EvidenceType::Character => "character",
            EvidenceType::WorldRule => "world_rule",
            EvidenceType::WorldEntity => "world_entity",
            EvidenceType::Style => "style",
            EvidenceType::TextChunk => "text_chunk",
            EvidenceType::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceScope {
    Chapter,
    Volume,
    Global,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceMeta {
    pub doc_len: usize,
    #[serde(default)]
    pub stars: u8,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EvidenceType,
    pub text: String,
    pub source: EvidenceSource,
    pub scope: EvidenceScope,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub meta: EvidenceMeta,
}

impl EvidenceItem {
    pub fn doc_len(&self) -> usize {
        if self.meta.doc_len > 0 {
            self.meta.doc_len
        } else {
            self.text.split_whitespace().count().max(1)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceIndexMeta {
    pub index_name: String,
    pub built_at: DateTime<Utc>,
    pub item_count: usize,
    pub source_mtime: DateTime<Utc>,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl EvidenceIndexMeta {
    pub fn is_stale(&self, max_source_mtime: DateTime<Utc>) -> bool {
        max_source_mtime > self.source_mtime
    }
}
