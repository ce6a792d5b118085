//! The research loop (spec §4.8): a bounded-round retrieval planner that
//! alternates between evidence search and query planning until the
//! retrieved evidence is judged sufficient, a round cap is hit, or the
//! planner runs dry.

use wenshape_llm::LLMGateway;
use wenshape_protocol::error::StorageError;
use wenshape_protocol::memory_pack::{MemoryPackPayload, ResearchTraceEntry, RetrievalRequest, SufficiencyReport};
use wenshape_protocol::{ChapterId, SceneBrief};
use wenshape_storage::Store;

use crate::gaps::build_gap_items;
use crate::plan::{generate_research_plan, offline_plan};
use crate::working_memory::WorkingMemoryService;

pub const MAX_RESEARCH_ROUNDS: u32 = 5;
/// Below this many retrieved items (with no missing cards), a round is
/// never considered sufficient regardless of round number — an Open
/// Question resolution (spec §4.8 doesn't give a concrete threshold).
const SUFFICIENCY_MIN_ITEMS: usize = 5;

/// Everything the loop needs besides storage: whether it's allowed to
/// call the writer agent for planning (`gateway = None` means fully
/// offline), any answers the user already gave to outstanding questions,
/// and a forced-offline override.
pub struct ResearchLoopInput<'a> {
    pub chapter: ChapterId,
    pub goal: String,
    pub scene_brief: Option<&'a SceneBrief>,
    pub user_answers: Vec<String>,
    pub extra_queries: Vec<String>,
    pub offline: bool,
}

/// Runs the full research loop described in spec §4.8 and returns a
/// populated [`MemoryPackPayload`] (minus `questions`, set by the caller
/// once the loop's stop reason is known).
pub async fn run_research_loop(
    store: &Store,
    gateway: Option<&dyn LLMGateway>,
    input: ResearchLoopInput<'_>,
) -> Result<MemoryPackPayload, StorageError> {
    let working_memory = WorkingMemoryService::new(store);
    let mut extra_queries = input.extra_queries.clone();
    let mut research_trace = Vec::new();
    let mut last_missing_cards: Vec<String> = Vec::new();
    let mut last_items = Vec::new();
    let mut last_seed_entities = Vec::new();
    let mut stop_reason = "max_rounds".to_string();

    let mut gaps = build_gap_items(&input.goal, input.scene_brief);

    let mut round = 1u32;
    loop {
        tracing::debug!(chapter = %input.chapter, round, "generate_plan");
        let plan = if round == 1 {
            if input.offline || gateway.is_none() {
                offline_plan(&gaps)
            } else {
                generate_research_plan(gateway.unwrap(), &input.goal, &gaps, "round 1", round).await
            }
        } else {
            crate::plan::ResearchPlan { queries: extra_queries.clone(), note: String::new() }
        };
        if round > 1 {
            extra_queries = plan.queries.clone();
        } else {
            extra_queries.extend(plan.queries.iter().cloned());
        }

        tracing::debug!(chapter = %input.chapter, round, "prepare_retrieval");
        let prepared = working_memory
            .prepare(&input.chapter, input.scene_brief, &input.goal, &input.user_answers, &extra_queries, !input.offline)
            .await?;

        let trace_entry = ResearchTraceEntry {
            round,
            queries: prepared.stats.queries.clone(),
            types: prepared.stats.types.keys().cloned().collect(),
            count: prepared.items.len(),
            hits: prepared.stats.hits,
            top_sources: prepared.top_sources.clone(),
            extra_queries: extra_queries.clone(),
            stop_reason: None,
            note: None,
        };
        research_trace.push(trace_entry);

        let sufficiency = evaluate_sufficiency(&prepared.items.len(), &prepared.missing_cards, round, input.offline);
        last_missing_cards = prepared.missing_cards;
        last_seed_entities = prepared.seed_entities;
        last_items = prepared.items;

        if sufficiency.sufficient {
            stop_reason = "sufficient".to_string();
            annotate_last_trace(&mut research_trace, &stop_reason, "证据充分，提前结束研究");
            break;
        }
        if round >= MAX_RESEARCH_ROUNDS {
            stop_reason = "max_rounds".to_string();
            annotate_last_trace(&mut research_trace, &stop_reason, "达到最大研究轮数");
            break;
        }
        if input.offline {
            stop_reason = "offline_stop".to_string();
            annotate_last_trace(&mut research_trace, &stop_reason, "离线模式，停止研究");
            break;
        }

        tracing::debug!(chapter = %input.chapter, round, "self_check: 证据不足，继续检索");
        let stats_note = format!("round {round}: {} items, {} missing cards", last_items.len(), last_missing_cards.len());
        gaps = build_gap_items(&input.goal, input.scene_brief);
        let next_plan = match gateway {
            Some(gw) => generate_research_plan(gw, &input.goal, &gaps, &stats_note, round + 1).await,
            None => offline_plan(&gaps),
        };
        if next_plan.queries.is_empty() {
            stop_reason = "no_queries".to_string();
            annotate_last_trace(&mut research_trace, &stop_reason, "规划器未返回新查询，停止研究");
            break;
        }
        extra_queries = next_plan.queries;
        round += 1;
    }

    let retrieval_requests: Vec<RetrievalRequest> = research_trace
        .iter()
        .map(|entry| RetrievalRequest { queries: entry.queries.clone(), types: entry.types.clone(), round: entry.round })
        .collect();

    let working_memory_text = summarize_working_memory(&last_items, &input.goal);

    let sufficiency_report = SufficiencyReport {
        sufficient: stop_reason == "sufficient",
        needs_user_input: stop_reason == "max_rounds" && !last_missing_cards.is_empty(),
        missing_entities: last_missing_cards.clone(),
        unresolved_gaps: gaps.iter().map(|g| g.text.clone()).collect(),
        offline: input.offline,
    };

    Ok(MemoryPackPayload {
        working_memory: working_memory_text,
        evidence_pack: last_items,
        gaps: gaps.into_iter().map(|g| g.text).collect(),
        unresolved_gaps: sufficiency_report.unresolved_gaps.clone(),
        seed_entities: last_seed_entities,
        retrieval_requests,
        sufficiency_report,
        research_trace,
        research_stop_reason: Some(stop_reason),
        questions: Vec::new(),
    })
}

struct Sufficiency {
    sufficient: bool,
}

/// Open Question resolution: "sufficient" once the round has retrieved
/// at least [`SUFFICIENCY_MIN_ITEMS`] items with no still-missing
/// mentioned cards, or once running offline (where a second round
/// wouldn't add new evidence anyway).
fn evaluate_sufficiency(item_count: &usize, missing_cards: &[String], round: u32, offline: bool) -> Sufficiency {
    if offline && round >= 1 {
        return Sufficiency { sufficient: *item_count > 0 };
    }
    Sufficiency { sufficient: *item_count >= SUFFICIENCY_MIN_ITEMS && missing_cards.is_empty() }
}

fn annotate_last_trace(trace: &mut [ResearchTraceEntry], stop_reason: &str, note: &str) {
    if let Some(last) = trace.last_mut() {
        last.stop_reason = Some(stop_reason.to_string());
        last.note = Some(note.to_string());
    }
}

fn summarize_working_memory(items: &[wenshape_protocol::evidence::EvidenceItem], goal: &str) -> String {
    if items.is_empty() {
        return format!("未检索到与目标相关的证据：{goal}");
    }
    let joined = items.iter().map(|i| i.text.as_str()).collect::<Vec<_>>().join("\n");
    let (compressed, _stats) = wenshape_context::smart_compress(&joined, 0.6, Some(goal));
    compressed
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::ChapterKind;
    use wenshape_protocol::ProjectId;

    fn test_store(root: &std::path::Path) -> Store {
        Store::new(root, ProjectId::new("proj").unwrap())
    }

    #[tokio::test]
    async fn offline_loop_stops_after_one_round_with_offline_stop_reason() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let input = ResearchLoopInput {
            chapter,
            goal: "Introduce Alice in a tavern".to_string(),
            scene_brief: None,
            user_answers: vec![],
            extra_queries: vec![],
            offline: true,
        };
        let payload = run_research_loop(&store, None, input).await.unwrap();
        assert_eq!(payload.research_stop_reason.as_deref(), Some("offline_stop"));
        assert_eq!(payload.research_trace.len(), 1);
    }

    #[test]
    fn evaluate_sufficiency_requires_no_missing_cards() {
        let s = evaluate_sufficiency(&10, &["Bob".to_string()], 3, false);
        assert!(!s.sufficient);
        let s = evaluate_sufficiency(&10, &[], 3, false);
        assert!(s.sufficient);
    }
}
