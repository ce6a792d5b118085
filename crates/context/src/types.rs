//! Context item model and token estimation (spec §4.6.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lower numeric value wins: `Critical` items are never dropped, `Low`
/// items are the first compressed or cut when a budget overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl Priority {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// What kind of material a [`ContextItem`] carries. Drives both the
/// budget category it draws from and the deterministic-selection rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextItemKind {
    StyleCard,
    SceneBrief,
    Character,
    World,
    Fact,
    Summary,
    TextChunk,
    Memory,
    CurrentDraft,
    SystemRule,
    ToolTrace,
}

/// The five budget buckets an [`ContextItemKind`] is allocated against
/// (spec §4.6.1). `ToolTrace` and `SceneBrief` aren't part of the
/// informational budget split and map to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
    SystemRules,
    Cards,
    Canon,
    Summaries,
    CurrentDraft,
}

impl BudgetCategory {
    pub const ALL: [BudgetCategory; 5] = [
        BudgetCategory::SystemRules,
        BudgetCategory::Cards,
        BudgetCategory::Canon,
        BudgetCategory::Summaries,
        BudgetCategory::CurrentDraft,
    ];

    pub fn default_ratio(self) -> f64 {
        match self {
            BudgetCategory::SystemRules => 0.05,
            BudgetCategory::Cards => 0.15,
            BudgetCategory::Canon => 0.10,
            BudgetCategory::Summaries => 0.20,
            BudgetCategory::CurrentDraft => 0.30,
        }
    }
}

impl ContextItemKind {
    /// `None` means the item doesn't draw from the informational budget
    /// split (e.g. tool traces live in the actionable section instead).
    pub fn budget_category(self) -> Option<BudgetCategory> {
        match self {
            ContextItemKind::SystemRule => Some(BudgetCategory::SystemRules),
            ContextItemKind::StyleCard | ContextItemKind::Character | ContextItemKind::World => {
                Some(BudgetCategory::Cards)
            }
            ContextItemKind::Fact => Some(BudgetCategory::Canon),
            ContextItemKind::Summary | ContextItemKind::Memory => Some(BudgetCategory::Summaries),
            ContextItemKind::CurrentDraft | ContextItemKind::TextChunk => Some(BudgetCategory::CurrentDraft),
            ContextItemKind::SceneBrief | ContextItemKind::ToolTrace => None,
        }
    }
}

/// One unit of context bound for an agent prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub kind: ContextItemKind,
    pub content: String,
    pub priority: Priority,
    #[serde(default)]
    pub relevance_score: f64,
    pub token_count: usize,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ContextItem {
    pub fn new(id: impl Into<String>, kind: ContextItemKind, content: impl Into<String>, priority: Priority) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&content);
        ContextItem {
            id: id.into(),
            kind,
            content,
            priority,
            relevance_score: 0.0,
            token_count,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_relevance(mut self, relevance_score: f64) -> Self {
        self.relevance_score = relevance_score;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace `content`, recomputing `token_count` to match (used after
    /// compression shrinks an item in place).
    pub fn set_content(&mut self, content: String) {
        self.token_count = estimate_tokens(&content);
        self.content = content;
    }
}

/// Cheap, provider-agnostic token approximation: ~4 characters per token
/// plus one, so empty strings still cost a token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_critical_first() {
        let mut items = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        items.sort();
        assert_eq!(items, vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn estimate_tokens_matches_the_four_chars_per_token_rule() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert_eq!(estimate_tokens("abcdefgh"), 3);
    }

    #[test]
    fn budget_category_mapping_covers_informational_kinds() {
        assert_eq!(ContextItemKind::Character.budget_category(), Some(BudgetCategory::Cards));
        assert_eq!(ContextItemKind::Fact.budget_category(), Some(BudgetCategory::Canon));
        assert_eq!(ContextItemKind::ToolTrace.budget_category(), None);
    }

    #[test]
    fn set_content_recomputes_token_count() {
        let mut item = ContextItem::new("a", ContextItemKind::Fact, "abcdefgh", Priority::Medium);
        assert_eq!(item.token_count, 3);
        item.set_content("ab".to_string());
        assert_eq!(item.token_count, 1);
    }
}
