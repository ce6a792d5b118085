//! Gap extraction (spec §4.8 step 1): turns a chapter goal and scene
//! brief into a small set of "things we might be missing", each paired
//! with candidate retrieval queries.

use wenshape_protocol::SceneBrief;

#[derive(Debug, Clone, PartialEq)]
pub struct GapItem {
    pub text: String,
    pub queries: Vec<String>,
}

/// Round-1 gap seeding: the chapter goal is always a gap (we always want
/// evidence supporting it); a scene brief, when present, contributes one
/// gap per world constraint and per lead character plus the preceding
/// timeline context.
pub fn build_gap_items(goal: &str, scene_brief: Option<&SceneBrief>) -> Vec<GapItem> {
    let mut gaps = Vec::new();

    if !goal.trim().is_empty() {
        gaps.push(GapItem { text: format!("chapter goal: {goal}"), queries: vec![goal.to_string()] });
    }

    let Some(brief) = scene_brief else { return gaps };

    if !brief.world_constraints.is_empty() {
        gaps.push(GapItem { text: "world constraints".to_string(), queries: brief.world_constraints.clone() });
    }

    for character in brief.lead_character_names(3) {
        gaps.push(GapItem { text: format!("character: {character}"), queries: vec![character] });
    }

    if !brief.timeline_context.before.is_empty() {
        gaps.push(GapItem {
            text: "preceding timeline context".to_string(),
            queries: vec![brief.timeline_context.before.clone()],
        });
    }

    if !brief.facts.is_empty() {
        gaps.push(GapItem { text: "referenced facts".to_string(), queries: brief.facts.clone() });
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::{BriefCharacter, ChapterId, ChapterKind, TimelineContext};

    fn brief() -> SceneBrief {
        SceneBrief {
            chapter: ChapterId::new(1, 1, ChapterKind::Base, 0),
            title: "Opening".into(),
            goal: "Introduce Alice in a tavern".into(),
            characters: vec![BriefCharacter { name: "Alice".into(), relevant_traits: vec![] }],
            timeline_context: TimelineContext { before: "the war ended".into(), current: String::new(), after: String::new() },
            world_constraints: vec!["magic is forbidden in the capital".into()],
            facts: vec![],
            style_reminder: String::new(),
            forbidden: vec![],
        }
    }

    #[test]
    fn goal_only_produces_a_single_gap() {
        let gaps = build_gap_items("Introduce Alice", None);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].queries, vec!["Introduce Alice".to_string()]);
    }

    #[test]
    fn brief_contributes_world_character_and_timeline_gaps() {
        let b = brief();
        let gaps = build_gap_items(&b.goal, Some(&b));
        assert!(gaps.iter().any(|g| g.text.contains("world constraints")));
        assert!(gaps.iter().any(|g| g.text.contains("Alice")));
        assert!(gaps.iter().any(|g| g.text.contains("preceding timeline")));
    }
}
