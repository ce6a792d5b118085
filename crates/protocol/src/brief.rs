//! Scene briefs (spec §3).

use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineContext {
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefCharacter {
    pub name: String,
    #[serde(default)]
    pub relevant_traits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneBrief {
    pub chapter: ChapterId,
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub characters: Vec<BriefCharacter>,
    #[serde(default)]
    pub timeline_context: TimelineContext,
    #[serde(default)]
    pub world_constraints: Vec<String>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub style_reminder: String,
    #[serde(default)]
    pub forbidden: Vec<String>,
}

impl SceneBrief {
    /// First three character names, used as retrieval seeds (spec §4.8).
    pub fn lead_character_names(&self, limit: usize) -> Vec<String> {
        self.characters
            .iter()
            .take(limit)
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter_id::ChapterKind;

    #[test]
    fn lead_character_names_respects_limit() {
        let brief = SceneBrief {
            chapter: ChapterId::new(1, 1, ChapterKind::Base, 0),
            title: "Opening".into(),
            goal: "Introduce Alice".into(),
            characters: vec![
                BriefCharacter { name: "Alice".into(), relevant_traits: vec![] },
                BriefCharacter { name: "Bob".into(), relevant_traits: vec![] },
                BriefCharacter { name: "Carol".into(), relevant_traits: vec![] },
                BriefCharacter { name: "Dave".into(), relevant_traits: vec![] },
            ],
            timeline_context: TimelineContext::default(),
            world_constraints: vec![],
            facts: vec![],
            style_reminder: String::new(),
            forbidden: vec![],
        };
        assert_eq!(
            brief.lead_character_names(3),
            vec!["Alice".to_string(), "Bob".to_string(), "Carol".to_string()]
        );
    }
}
