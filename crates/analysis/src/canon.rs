//! Canon updates and conflict detection (spec §4.11 steps 3-4).

use std::collections::HashSet;

use wenshape_llm::{parse_yaml, ChatMessage, ChatRequest, LLMGateway};
use wenshape_protocol::canon::{CharacterState, Fact, TimelineEvent};
use wenshape_protocol::summary::ChapterSummary;
use wenshape_protocol::{AgentKind, ChapterId};
use wenshape_storage::Store;

const FACTS_PER_CHAPTER_CAP: usize = 5;
const NEGATION_MARKERS: &[&str] = &["不是", "不", "没有", "无"];
/// Default chapters-per-volume assumed for cross-volume distance when no
/// more specific figure is available (matches the original's
/// `avg_chapters_per_volume` default).
pub const DEFAULT_AVG_CHAPTERS_PER_VOLUME: u32 = 15;

/// Canon rows extracted from a chapter, ready to persist and feed into
/// conflict detection.
#[derive(Debug, Default)]
pub struct CanonUpdates {
    pub facts: Vec<Fact>,
    pub timeline_events: Vec<TimelineEvent>,
    pub character_states: Vec<CharacterState>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CanonUpdatesResponse {
    #[serde(default)]
    facts: Vec<CanonFactItem>,
    #[serde(default)]
    timeline_events: Vec<CanonTimelineItem>,
    #[serde(default)]
    character_states: Vec<CanonCharacterStateItem>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CanonFactItem {
    #[serde(default)]
    statement: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CanonTimelineItem {
    #[serde(default)]
    time: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    location: String,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CanonCharacterStateItem {
    character: String,
    #[serde(default)]
    goals: Vec<String>,
    #[serde(default)]
    injuries: Vec<String>,
    #[serde(default)]
    inventory: Vec<String>,
    #[serde(default)]
    relationships: std::collections::HashMap<String, String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    emotional_state: Option<String>,
}

/// Extracts this chapter's canon updates (spec §4.11 step 3) as facts,
/// timeline events, and character states, and persists all three. Prefers
/// a dedicated archivist extraction over the final draft, which is the
/// only path that can produce a structured timeline event or a
/// character's current location; falls back to the chapter summary's
/// free-text fields (facts and goal-only character changes, same as
/// before) when offline or when the extraction call fails, the same
/// heuristic-fallback shape [`crate::chapter_summary::generate_chapter_summary`]
/// uses.
pub async fn extract_canon_updates(
    store: &Store,
    gateway: Option<&dyn LLMGateway>,
    summary: &ChapterSummary,
    draft_content: &str,
) -> Result<CanonUpdates, wenshape_protocol::error::StorageError> {
    let parsed = match gateway {
        Some(gw) => call_archivist_canon_updates(gw, summary.chapter, draft_content).await,
        None => None,
    };

    let mut updates = match parsed {
        Some(response) => build_from_response(summary.chapter, response),
        None => heuristic_updates(summary),
    };

    let existing = store.read_facts().await?;
    let mut next_ordinal = existing.len();
    updates.facts.truncate(FACTS_PER_CHAPTER_CAP);
    for fact in &mut updates.facts {
        fact.id = Fact::format_id(next_ordinal);
        fact.clamp_confidence();
        next_ordinal += 1;
    }

    for fact in &updates.facts {
        store.append_fact(fact).await?;
    }
    for event in &updates.timeline_events {
        store.append_timeline_event(event).await?;
    }
    for state in &updates.character_states {
        store.upsert_character_state(state.clone()).await?;
    }

    Ok(updates)
}

fn heuristic_updates(summary: &ChapterSummary) -> CanonUpdates {
    let facts = summary
        .new_facts
        .iter()
        .take(FACTS_PER_CHAPTER_CAP)
        .map(|statement| Fact {
            id: String::new(),
            statement: statement.clone(),
            source: summary.chapter,
            introduced_in: summary.chapter,
            confidence: 0.8,
            title: None,
            summary_ref: Some(summary.chapter.to_string()),
        })
        .collect();

    let character_states = summary
        .character_state_changes
        .iter()
        .filter_map(|change| change.split_once(':'))
        .map(|(character, rest)| CharacterState {
            character: character.trim().to_string(),
            goals: vec![rest.trim().to_string()],
            last_seen: Some(summary.chapter),
            ..Default::default()
        })
        .collect();

    CanonUpdates { facts, timeline_events: Vec::new(), character_states }
}

fn build_from_response(chapter: ChapterId, response: CanonUpdatesResponse) -> CanonUpdates {
    let facts = response
        .facts
        .into_iter()
        .filter(|f| !f.statement.trim().is_empty())
        .map(|f| Fact {
            id: String::new(),
            statement: f.statement.trim().to_string(),
            source: chapter,
            introduced_in: chapter,
            confidence: f.confidence.unwrap_or(1.0),
            title: None,
            summary_ref: None,
        })
        .collect();

    let timeline_events = response
        .timeline_events
        .into_iter()
        .map(|e| TimelineEvent {
            time: e.time,
            event: e.event,
            participants: e.participants,
            location: e.location,
            source: chapter,
        })
        .collect();

    let character_states = response
        .character_states
        .into_iter()
        .filter(|c| !c.character.trim().is_empty())
        .map(|c| CharacterState {
            character: c.character.trim().to_string(),
            goals: c.goals,
            injuries: c.injuries,
            inventory: c.inventory,
            relationships: c.relationships,
            location: c.location,
            emotional_state: c.emotional_state,
            last_seen: Some(chapter),
        })
        .collect();

    CanonUpdates { facts, timeline_events, character_states }
}

async fn call_archivist_canon_updates(
    gateway: &dyn LLMGateway,
    chapter: ChapterId,
    draft_content: &str,
) -> Option<CanonUpdatesResponse> {
    let prompt = format!(
        "Extract canon updates from the final draft of chapter {chapter} as YAML with keys \
         facts (list of {{statement, confidence}}), timeline_events (list of {{time, event, \
         participants, location}}), character_states (list of {{character, goals, injuries, \
         inventory, relationships, location, emotional_state}}). Only include what the draft \
         actually supports; use empty strings/lists for anything unknown.\n\nDraft:\n\n{draft_content}"
    );
    let request = ChatRequest::new(vec![
        ChatMessage::system("You are the archivist agent. Respond with YAML only, no prose."),
        ChatMessage::user(prompt),
    ])
    .with_provider(gateway.get_provider_for_agent(AgentKind::Archivist));

    match gateway.chat(request).await {
        Ok(response) => match parse_yaml::<CanonUpdatesResponse>(&response.content) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(error = %e, "canon updates yaml unparseable, falling back to summary heuristic");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "archivist canon-update call failed, falling back to summary heuristic");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictKind {
    Fact,
    Timeline,
    State,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub detail: String,
    pub involved: Vec<String>,
}

fn tokenize(text: &str) -> HashSet<String> {
    wenshape_evidence::tokenize::tokens(text).into_iter().collect()
}

fn has_negation(text: &str) -> bool {
    NEGATION_MARKERS.iter().any(|m| text.contains(m))
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Fact contradictions: shared-token overlap `>= max(6, min(len)/3)` with
/// disagreement on negation (spec §4.11 step 4).
pub fn detect_fact_conflicts(existing: &[Fact], new_facts: &[Fact]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for new_fact in new_facts {
        let new_tokens = tokenize(&new_fact.statement);
        for old_fact in existing {
            if old_fact.id == new_fact.id {
                continue;
            }
            let old_tokens = tokenize(&old_fact.statement);
            let overlap = new_tokens.intersection(&old_tokens).count();
            let threshold = (new_tokens.len().min(old_tokens.len()) / 3).max(6);
            if overlap >= threshold && has_negation(&new_fact.statement) != has_negation(&old_fact.statement) {
                conflicts.push(Conflict {
                    kind: ConflictKind::Fact,
                    detail: format!("{} vs {}", old_fact.statement, new_fact.statement),
                    involved: vec![old_fact.id.clone(), new_fact.id.clone()],
                });
            }
        }
    }
    conflicts
}

/// Timeline: same normalized `time`, overlapping `participants`, but
/// different normalized `event`/`location`.
pub fn detect_timeline_conflicts(existing: &[TimelineEvent], new_events: &[TimelineEvent]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for new_event in new_events {
        for old_event in existing {
            let same_time = normalize(&old_event.time) == normalize(&new_event.time);
            let overlapping_participants = old_event.participants.iter().any(|p| new_event.participants.contains(p));
            let different = normalize(&old_event.event) != normalize(&new_event.event) || normalize(&old_event.location) != normalize(&new_event.location);
            if same_time && overlapping_participants && different {
                conflicts.push(Conflict {
                    kind: ConflictKind::Timeline,
                    detail: format!("{} ({}) vs {} ({})", old_event.event, old_event.location, new_event.event, new_event.location),
                    involved: new_event.participants.clone(),
                });
            }
        }
    }
    conflicts
}

/// State: prior & new `location` differ and `distance(prev.last_seen,
/// chapter) <= 1`.
pub fn detect_state_conflicts(existing: &[CharacterState], new_states: &[CharacterState], chapter: ChapterId, avg_per_volume: u32) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for new_state in new_states {
        for old_state in existing {
            if old_state.character != new_state.character {
                continue;
            }
            let (Some(old_loc), Some(new_loc)) = (&old_state.location, &new_state.location) else { continue };
            if old_loc == new_loc {
                continue;
            }
            let Some(last_seen) = old_state.last_seen else { continue };
            if last_seen.distance(&chapter, avg_per_volume) <= 1 {
                conflicts.push(Conflict {
                    kind: ConflictKind::State,
                    detail: format!("{}: {} vs {}", new_state.character, old_loc, new_loc),
                    involved: vec![new_state.character.clone()],
                });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::ChapterKind;
    use wenshape_storage::Store;

    fn summary(chapter: ChapterId) -> ChapterSummary {
        ChapterSummary {
            chapter,
            volume_id: "V1".into(),
            title: "Test".into(),
            word_count: 100,
            key_events: vec![],
            new_facts: vec!["Alice has a sword".into()],
            character_state_changes: vec!["Alice: resolved to leave the capital".into()],
            open_loops: vec![],
            brief_summary: "Alice leaves.".into(),
            order_index: Some(0),
        }
    }

    #[tokio::test]
    async fn offline_extraction_falls_back_to_summary_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path(), wenshape_protocol::ProjectId::new("p").unwrap());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);

        let updates = extract_canon_updates(&store, None, &summary(chapter), "draft text").await.unwrap();
        assert_eq!(updates.facts.len(), 1);
        assert!(updates.timeline_events.is_empty());
        assert_eq!(updates.character_states.len(), 1);
        assert!(updates.character_states[0].location.is_none());

        let persisted_facts = store.read_facts().await.unwrap();
        assert_eq!(persisted_facts.len(), 1);
        let persisted_states = store.read_character_states().await.unwrap();
        assert_eq!(persisted_states.len(), 1);
    }

    #[test]
    fn fact_conflict_requires_overlap_and_negation_disagreement() {
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let old = Fact { id: "F0000".into(), statement: "Alice is a loyal knight of the capital".into(), source: chapter, introduced_in: chapter, confidence: 0.8, title: None, summary_ref: None };
        let new = Fact { id: "F0001".into(), statement: "Alice is not a loyal knight of the capital".into(), source: chapter, introduced_in: chapter, confidence: 0.8, title: None, summary_ref: None };
        let conflicts = detect_fact_conflicts(&[old], &[new]);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn timeline_conflict_needs_same_time_and_overlap() {
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let old = TimelineEvent { time: "Day 1".into(), event: "Meeting at the tavern".into(), participants: vec!["Alice".into()], location: "Tavern".into(), source: chapter };
        let new = TimelineEvent { time: "day 1".into(), event: "Battle in the square".into(), participants: vec!["Alice".into(), "Bob".into()], location: "Square".into(), source: chapter };
        let conflicts = detect_timeline_conflicts(&[old], &[new]);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn state_conflict_requires_close_chapters() {
        let c1 = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let c2 = ChapterId::new(1, 2, ChapterKind::Base, 0);
        let c9 = ChapterId::new(1, 9, ChapterKind::Base, 0);
        let old = CharacterState { character: "Alice".into(), location: Some("Capital".into()), last_seen: Some(c1), ..Default::default() };
        let new_close = CharacterState { character: "Alice".into(), location: Some("Forest".into()), last_seen: Some(c2), ..Default::default() };
        let conflicts = detect_state_conflicts(&[old.clone()], &[new_close], c2, 20);
        assert_eq!(conflicts.len(), 1);

        let new_far = CharacterState { character: "Alice".into(), location: Some("Forest".into()), last_seen: Some(c9), ..Default::default() };
        let conflicts = detect_state_conflicts(&[old], &[new_far], c9, 20);
        assert!(conflicts.is_empty());
    }
}
