//! Chapter and volume summary generation (spec §4.11 steps 1-2).

use wenshape_llm::{parse_yaml, ChatMessage, ChatRequest, LLMGateway};
use wenshape_protocol::summary::{ChapterSummary, VolumeSummary};
use wenshape_protocol::{AgentKind, ChapterId};
use wenshape_storage::Store;

#[derive(Debug, serde::Deserialize)]
struct ChapterSummaryResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    key_events: Vec<String>,
    #[serde(default)]
    new_facts: Vec<String>,
    #[serde(default)]
    character_state_changes: Vec<String>,
    #[serde(default)]
    open_loops: Vec<String>,
    #[serde(default)]
    brief_summary: String,
}

/// Falls back to a truncated-content heuristic when the archivist call
/// fails or its YAML can't be parsed, so a chapter summary always exists.
pub async fn generate_chapter_summary(
    gateway: Option<&dyn LLMGateway>,
    chapter: ChapterId,
    volume_id: &str,
    draft_content: &str,
    order_index: Option<u32>,
) -> ChapterSummary {
    let word_count = draft_content.split_whitespace().count();

    let parsed = match gateway {
        Some(gw) => call_archivist(gw, draft_content).await,
        None => None,
    };

    match parsed {
        Some(r) => ChapterSummary {
            chapter,
            volume_id: volume_id.to_string(),
            title: r.title,
            word_count,
            key_events: r.key_events,
            new_facts: r.new_facts,
            character_state_changes: r.character_state_changes,
            open_loops: r.open_loops,
            brief_summary: r.brief_summary,
            order_index,
        },
        None => heuristic_summary(chapter, volume_id, draft_content, word_count, order_index),
    }
}

async fn call_archivist(gateway: &dyn LLMGateway, draft_content: &str) -> Option<ChapterSummaryResponse> {
    let prompt = format!(
        "Summarize this chapter draft as YAML with keys title, key_events, new_facts, \
         character_state_changes, open_loops, brief_summary (all list fields are string \
         lists; brief_summary and title are short strings). Draft:\n\n{draft_content}"
    );
    let request = ChatRequest::new(vec![
        ChatMessage::system("You are the archivist agent. Respond with YAML only, no prose."),
        ChatMessage::user(prompt),
    ])
    .with_provider(gateway.get_provider_for_agent(AgentKind::Archivist));

    match gateway.chat(request).await {
        Ok(response) => match parse_yaml::<ChapterSummaryResponse>(&response.content) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(error = %e, "chapter summary yaml unparseable, falling back to heuristic");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "archivist call failed, falling back to heuristic chapter summary");
            None
        }
    }
}

const HEURISTIC_SUMMARY_CHARS: usize = 400;

fn heuristic_summary(
    chapter: ChapterId,
    volume_id: &str,
    draft_content: &str,
    word_count: usize,
    order_index: Option<u32>,
) -> ChapterSummary {
    let brief_summary: String = draft_content.chars().take(HEURISTIC_SUMMARY_CHARS).collect();
    let key_events = draft_content
        .split(['\n', '。'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(3)
        .map(str::to_string)
        .collect();

    ChapterSummary {
        chapter,
        volume_id: volume_id.to_string(),
        title: chapter.to_string(),
        word_count,
        key_events,
        new_facts: Vec::new(),
        character_state_changes: Vec::new(),
        open_loops: Vec::new(),
        brief_summary,
        order_index,
    }
}

/// Refreshes a volume's summary by folding its chapters' summaries
/// together (spec §4.11 step 2: once per volume touched in a batch, not
/// per chapter).
pub async fn refresh_volume_summary(store: &Store, volume_id: &str, chapter_summaries: &[ChapterSummary]) -> Option<VolumeSummary> {
    let relevant: Vec<&ChapterSummary> = chapter_summaries.iter().filter(|s| s.volume_id == volume_id).collect();
    if relevant.is_empty() {
        return store.read_volume_summary(volume_id).await.ok().flatten();
    }

    let key_themes = relevant.iter().flat_map(|s| s.open_loops.iter().cloned()).take(10).collect();
    let major_events = relevant.iter().flat_map(|s| s.key_events.iter().cloned()).take(20).collect();
    let brief_summary = relevant.iter().map(|s| s.brief_summary.as_str()).collect::<Vec<_>>().join(" ");

    Some(VolumeSummary {
        volume_id: volume_id.to_string(),
        brief_summary,
        key_themes,
        major_events,
        chapter_count: relevant.len(),
        timestamps: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::ChapterKind;

    #[tokio::test]
    async fn offline_summary_falls_back_to_heuristic() {
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let summary = generate_chapter_summary(None, chapter, "V1", "Alice enters the tavern. She orders tea.", Some(0)).await;
        assert_eq!(summary.chapter, chapter);
        assert!(!summary.brief_summary.is_empty());
        assert!(!summary.key_events.is_empty());
    }
}
