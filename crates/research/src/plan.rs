//! Research planning (spec §4.8 steps 1 and 7): asks the writer agent for
//! follow-up queries, or folds gap queries directly when running
//! offline (no LLM gateway configured).

use serde::Deserialize;
use wenshape_llm::{parse_json, ChatMessage, ChatRequest, LLMGateway};
use wenshape_protocol::{AgentKind, LLMError};

use crate::gaps::GapItem;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchPlan {
    pub queries: Vec<String>,
    pub note: String,
}

#[derive(Debug, Deserialize)]
struct ResearchPlanResponse {
    #[serde(default)]
    queries: Vec<String>,
    #[serde(default)]
    note: Option<String>,
}

/// Offline fallback (spec §4.8 step 1): each gap's own queries become the
/// plan directly, no LLM round-trip.
pub fn offline_plan(gaps: &[GapItem]) -> ResearchPlan {
    let queries = gaps.iter().flat_map(|g| g.queries.iter().cloned()).collect();
    ResearchPlan { queries, note: "offline: folded gap queries directly".to_string() }
}

/// Calls `generate_research_plan(goal, gaps, stats, round)` against the
/// writer agent's provider. On any gateway failure or unparseable
/// response, falls back to [`offline_plan`] rather than propagating the
/// error — a research round never needs to hard-fail because the planner
/// LLM call failed.
pub async fn generate_research_plan(
    gateway: &dyn LLMGateway,
    goal: &str,
    gaps: &[GapItem],
    stats_note: &str,
    round: u32,
) -> ResearchPlan {
    let gap_text = gaps.iter().map(|g| format!("- {}: {}", g.text, g.queries.join(", "))).collect::<Vec<_>>().join("\n");
    let prompt = format!(
        "Chapter goal: {goal}\nRound: {round}\nKnown gaps:\n{gap_text}\n\
         Retrieval stats so far: {stats_note}\n\n\
         Return compact JSON only: {{\"queries\": [string, ...], \"note\": string}} \
         with up to 5 follow-up search queries that would fill the remaining gaps."
    );

    let request = ChatRequest::new(vec![
        ChatMessage::system("You are the research planner for a novel-writing assistant. Respond with JSON only, no prose."),
        ChatMessage::user(prompt),
    ])
    .with_provider(gateway.get_provider_for_agent(AgentKind::Writer));

    match gateway.chat(request).await {
        Ok(response) => parse_plan_response(&response.content).unwrap_or_else(|| offline_plan(gaps)),
        Err(e) => {
            tracing::warn!(error = %e, "research plan llm call failed, falling back to offline plan");
            offline_plan(gaps)
        }
    }
}

fn parse_plan_response(content: &str) -> Option<ResearchPlan> {
    let parsed: ResearchPlanResponse = parse_json(content).ok()?;
    Some(ResearchPlan { queries: parsed.queries, note: parsed.note.unwrap_or_default() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_plan_folds_all_gap_queries() {
        let gaps = vec![
            GapItem { text: "a".into(), queries: vec!["q1".into(), "q2".into()] },
            GapItem { text: "b".into(), queries: vec!["q3".into()] },
        ];
        let plan = offline_plan(&gaps);
        assert_eq!(plan.queries, vec!["q1".to_string(), "q2".to_string(), "q3".to_string()]);
    }

    #[test]
    fn parse_plan_response_reads_fenced_json() {
        let content = "```json\n{\"queries\": [\"x\", \"y\"], \"note\": \"because reasons\"}\n```";
        let plan = parse_plan_response(content).unwrap();
        assert_eq!(plan.queries, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(plan.note, "because reasons");
    }

    #[test]
    fn parse_plan_response_returns_none_on_garbage() {
        assert!(parse_plan_response("not json at all").is_none());
    }
}
