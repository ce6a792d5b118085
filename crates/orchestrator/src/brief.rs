//! Scene brief generation: the archivist turns a chapter goal plus prior
//! canon into a structured [`SceneBrief`], falling back to a minimal
//! heuristic brief when no gateway is available or the response can't be
//! parsed.

use wenshape_llm::{parse_yaml, ChatMessage, ChatRequest, LLMGateway};
use wenshape_protocol::brief::{BriefCharacter, SceneBrief, TimelineContext};
use wenshape_protocol::error::StorageError;
use wenshape_protocol::{AgentKind, ChapterId};
use wenshape_storage::Store;

#[derive(Debug, serde::Deserialize)]
struct SceneBriefResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    characters: Vec<String>,
    #[serde(default)]
    timeline_before: String,
    #[serde(default)]
    world_constraints: Vec<String>,
    #[serde(default)]
    facts: Vec<String>,
    #[serde(default)]
    style_reminder: String,
    #[serde(default)]
    forbidden: Vec<String>,
}

pub async fn generate_scene_brief(
    store: &Store,
    gateway: Option<&dyn LLMGateway>,
    chapter: ChapterId,
    goal: &str,
) -> Result<SceneBrief, StorageError> {
    let existing_facts = store.read_facts().await?;
    let style = store.read_style_card().await?;

    if let Some(gw) = gateway {
        if let Some(parsed) = call_archivist(gw, chapter, goal, &existing_facts).await {
            let brief = SceneBrief {
                chapter,
                title: parsed.title,
                goal: goal.to_string(),
                characters: parsed.characters.into_iter().map(|name| BriefCharacter { name, relevant_traits: Vec::new() }).collect(),
                timeline_context: TimelineContext { before: parsed.timeline_before, current: String::new(), after: String::new() },
                world_constraints: parsed.world_constraints,
                facts: parsed.facts,
                style_reminder: parsed.style_reminder,
                forbidden: parsed.forbidden,
            };
            store.write_scene_brief(&brief).await?;
            return Ok(brief);
        }
    }

    let brief = SceneBrief {
        chapter,
        title: chapter.to_string(),
        goal: goal.to_string(),
        characters: Vec::new(),
        timeline_context: TimelineContext::default(),
        world_constraints: Vec::new(),
        facts: existing_facts.iter().rev().take(5).map(|f| f.statement.clone()).collect(),
        style_reminder: style.map(|s| s.style).unwrap_or_default(),
        forbidden: Vec::new(),
    };
    store.write_scene_brief(&brief).await?;
    Ok(brief)
}

async fn call_archivist(
    gateway: &dyn LLMGateway,
    chapter: ChapterId,
    goal: &str,
    facts: &[wenshape_protocol::canon::Fact],
) -> Option<SceneBriefResponse> {
    let fact_text = facts.iter().rev().take(10).map(|f| f.statement.as_str()).collect::<Vec<_>>().join("\n- ");
    let prompt = format!(
        "Chapter: {chapter}\nGoal: {goal}\nKnown facts:\n- {fact_text}\n\n\
         Return YAML with keys title, characters (list of names), timeline_before, \
         world_constraints (list), facts (list), style_reminder, forbidden (list)."
    );
    let request = ChatRequest::new(vec![
        ChatMessage::system("You are the archivist agent drafting a scene brief. Respond with YAML only."),
        ChatMessage::user(prompt),
    ])
    .with_provider(gateway.get_provider_for_agent(AgentKind::Archivist));

    match gateway.chat(request).await {
        Ok(response) => parse_yaml(&response.content).ok(),
        Err(e) => {
            tracing::warn!(error = %e, "archivist brief generation failed, falling back to heuristic brief");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::{ChapterKind, ProjectId};

    fn test_store(root: &std::path::Path) -> Store {
        Store::new(root, ProjectId::new("proj").unwrap())
    }

    #[tokio::test]
    async fn offline_brief_uses_heuristic_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let brief = generate_scene_brief(&store, None, chapter, "Introduce Alice").await.unwrap();
        assert_eq!(brief.goal, "Introduce Alice");
        assert_eq!(brief.chapter, chapter);
    }
}
