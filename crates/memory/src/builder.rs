//! `ensure_memory_pack` (spec §4.7): resolves (or rebuilds) the
//! authoritative memory pack for a chapter, driving the research loop
//! when nothing usable is cached.

use chrono::Utc;
use wenshape_llm::LLMGateway;
use wenshape_protocol::error::StorageError;
use wenshape_protocol::memory_pack::{BriefSnapshot, MemoryPack};
use wenshape_protocol::progress::ProgressEvent;
use wenshape_protocol::{ChapterId, ProjectId, SceneBrief};
use wenshape_research::{run_research_loop, ResearchLoopInput};
use wenshape_storage::Store;
use wenshape_trace::ProgressBus;

use crate::card_snapshot::{build_card_snapshot, is_snapshot_empty};

pub struct EnsureMemoryPackInput<'a> {
    pub project_id: ProjectId,
    pub chapter: ChapterId,
    pub goal: Option<String>,
    pub scene_brief: Option<&'a SceneBrief>,
    pub user_feedback: Option<String>,
    pub user_answers: Vec<String>,
    pub force_refresh: bool,
    pub source: String,
}

/// Resolves the effective goal text (spec §4.7 step 2): explicit `goal`
/// wins, then the scene brief's goal, then feedback alone; feedback is
/// always appended if not already present in the chosen text.
fn resolve_goal_text(goal: Option<&str>, scene_brief: Option<&SceneBrief>, feedback: Option<&str>) -> String {
    let base = goal
        .map(str::to_string)
        .or_else(|| scene_brief.map(|b| b.goal.clone()))
        .or_else(|| feedback.map(str::to_string))
        .unwrap_or_else(|| "未提供".to_string());

    match feedback {
        Some(fb) if !base.contains(fb) => format!("{base}\n\n用户最新指令：{fb}"),
        _ => base,
    }
}

pub async fn ensure_memory_pack(
    store: &Store,
    gateway: Option<&dyn LLMGateway>,
    progress: Option<&ProgressBus>,
    input: EnsureMemoryPackInput<'_>,
) -> Result<MemoryPack, StorageError> {
    let goal_text = resolve_goal_text(input.goal.as_deref(), input.scene_brief, input.user_feedback.as_deref());

    if !input.force_refresh {
        if let Some(mut cached) = store.read_memory_pack(&input.chapter).await? {
            if !cached.payload.is_empty() {
                if is_snapshot_empty(&cached.card_snapshot) {
                    cached.card_snapshot =
                        build_card_snapshot(store, &cached.payload.evidence_pack, &cached.payload.seed_entities).await?;
                    store.write_memory_pack(&cached).await?;
                }
                emit(progress, &input.project_id, &input.chapter, "memory_pack", "cached").await;
                return Ok(cached);
            }
        }
    }

    let offline = gateway.is_none();
    let loop_input = ResearchLoopInput {
        chapter: input.chapter,
        goal: goal_text.clone(),
        scene_brief: input.scene_brief,
        user_answers: input.user_answers.clone(),
        extra_queries: Vec::new(),
        offline,
    };

    match run_research_loop(store, gateway, loop_input).await {
        Ok(mut payload) => {
            if payload.research_stop_reason.as_deref() == Some("max_rounds") && payload.sufficiency_report.needs_user_input {
                payload.questions = payload.sufficiency_report.missing_entities.clone();
            } else {
                payload.questions.clear();
            }

            let card_snapshot = build_card_snapshot(store, &payload.evidence_pack, &payload.seed_entities).await?;
            let brief_snapshot = input
                .scene_brief
                .map(|b| BriefSnapshot { title: b.title.clone(), goal: b.goal.clone() })
                .unwrap_or_else(|| BriefSnapshot { title: String::new(), goal: goal_text.clone() });

            let pack = MemoryPack {
                chapter: input.chapter,
                built_at: Utc::now(),
                source: input.source.clone(),
                chapter_goal: goal_text,
                scene_brief: brief_snapshot,
                card_snapshot,
                payload,
            };
            store.write_memory_pack(&pack).await?;
            emit(progress, &input.project_id, &input.chapter, "memory_pack", "记忆包已更新").await;
            Ok(pack)
        }
        Err(e) => {
            tracing::warn!(chapter = %input.chapter, error = %e, "research loop failed, falling back to prior pack");
            if let Some(mut prior) = store.read_memory_pack(&input.chapter).await? {
                prior.source = format!("{}:fallback", input.source);
                emit(progress, &input.project_id, &input.chapter, "memory_pack", "fallback").await;
                return Ok(prior);
            }
            Err(e)
        }
    }
}

async fn emit(progress: Option<&ProgressBus>, project_id: &ProjectId, chapter: &ChapterId, kind: &str, status: &str) {
    if let Some(bus) = progress {
        let event = ProgressEvent::new(kind, project_id.clone(), Some(*chapter)).with_status(status);
        bus.publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_goal_text_prefers_explicit_goal_and_appends_feedback() {
        let goal = resolve_goal_text(Some("Introduce Alice"), None, Some("add more tension"));
        assert!(goal.starts_with("Introduce Alice"));
        assert!(goal.contains("add more tension"));
    }

    #[test]
    fn resolve_goal_text_defaults_when_nothing_given() {
        assert_eq!(resolve_goal_text(None, None, None), "未提供");
    }

    #[test]
    fn resolve_goal_text_does_not_duplicate_feedback_already_present() {
        let goal = resolve_goal_text(Some("Do X, add more tension"), None, Some("add more tension"));
        assert_eq!(goal, "Do X, add more tension");
    }
}
