//! Chapter bindings (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    pub score: f64,
    pub count: u32,
    #[serde(default)]
    pub matched_aliases: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMention {
    pub rule_id: String,
    pub score: f64,
    #[serde(default)]
    pub examples: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingSource {
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u32,
    pub score: f64,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterBinding {
    pub chapter: ChapterId,
    #[serde(default)]
    pub characters: Vec<EntityMention>,
    #[serde(default)]
    pub world_entities: Vec<EntityMention>,
    #[serde(default)]
    pub world_rules: Vec<RuleMention>,
    #[serde(default)]
    pub sources: Vec<BindingSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_path: Option<String>,
    pub built_at: DateTime<Utc>,
}

impl ChapterBinding {
    pub fn empty(chapter: ChapterId) -> Self {
        Self {
            chapter,
            characters: Vec::new(),
            world_entities: Vec::new(),
            world_rules: Vec::new(),
            sources: Vec::new(),
            draft_path: None,
            built_at: Utc::now(),
        }
    }

    /// Entity names carried forward as retrieval seeds (spec §4.5 "Seeds").
    pub fn seed_names(&self, include_world_rules: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .characters
            .iter()
            .map(|c| c.name.clone())
            .chain(self.world_entities.iter().map(|w| w.name.clone()))
            .collect();
        if include_world_rules {
            names.extend(self.world_rules.iter().map(|r| r.rule_id.clone()));
        }
        names
    }
}
