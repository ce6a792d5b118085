//! Canon: facts, timeline events, character states (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;

/// `{id: F<nnnn>, statement, source, introduced_in, confidence, title?, summary_ref?}`.
/// Append-only JSONL; ids unique within project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub statement: String,
    pub source: ChapterId,
    pub introduced_in: ChapterId,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_ref: Option<String>,
}

impl Fact {
    /// Format a fact id as `F<nnnn>` from a zero-based ordinal.
    pub fn format_id(ordinal: usize) -> String {
        format!("F{:04}", ordinal)
    }

    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }
}

/// Backward-compat coercion target for a raw fact row read from disk.
/// Missing fields default predictably rather than failing the whole read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFactRow {
    pub id: Option<String>,
    pub statement: Option<String>,
    pub source: Option<String>,
    pub introduced_in: Option<String>,
    pub confidence: Option<f32>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary_ref: Option<String>,
}

/// `normalize_fact_item(idx, row) -> {id,statement,source,introduced_in,
/// confidence,title,content,summary_ref?}` (spec §4.2).
pub fn normalize_fact_item(idx: usize, row: RawFactRow) -> Fact {
    let statement = row
        .statement
        .or(row.content)
        .unwrap_or_else(|| String::new());
    let source = row
        .source
        .as_deref()
        .and_then(|s| ChapterId::parse(s).ok())
        .unwrap_or(ChapterId::new(1, 0, crate::chapter_id::ChapterKind::Base, 0));
    let introduced_in = row
        .introduced_in
        .as_deref()
        .and_then(|s| ChapterId::parse(s).ok())
        .unwrap_or(source);
    Fact {
        id: row.id.unwrap_or_else(|| Fact::format_id(idx)),
        statement,
        source,
        introduced_in,
        confidence: row.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
        title: row.title,
        summary_ref: row.summary_ref,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub time: String,
    pub event: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub location: String,
    pub source: ChapterId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub character: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub injuries: Vec<String>,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub relationships: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<String>,
    #[serde(default)]
    pub last_seen: Option<ChapterId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter_id::ChapterKind;

    #[test]
    fn fact_id_formatting() {
        assert_eq!(Fact::format_id(0), "F0000");
        assert_eq!(Fact::format_id(42), "F0042");
    }

    #[test]
    fn normalize_defaults_missing_fields() {
        let row = RawFactRow {
            id: None,
            statement: None,
            source: Some("V1C3".to_string()),
            introduced_in: None,
            confidence: None,
            title: None,
            content: Some("Alice is a knight".to_string()),
            summary_ref: None,
        };
        let fact = normalize_fact_item(7, row);
        assert_eq!(fact.id, "F0007");
        assert_eq!(fact.statement, "Alice is a knight");
        assert_eq!(fact.source, ChapterId::new(1, 3, ChapterKind::Base, 0));
        assert_eq!(fact.introduced_in, fact.source);
        assert_eq!(fact.confidence, 0.8);
    }

    #[test]
    fn clamp_confidence_bounds() {
        let mut fact = Fact {
            id: "F0000".into(),
            statement: "x".into(),
            source: ChapterId::new(1, 1, ChapterKind::Base, 0),
            introduced_in: ChapterId::new(1, 1, ChapterKind::Base, 0),
            confidence: 1.7,
            title: None,
            summary_ref: None,
        };
        fact.clamp_confidence();
        assert_eq!(fact.confidence, 1.0);
    }
}
