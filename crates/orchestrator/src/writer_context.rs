//! Builds the prompt text an agent call sends to the gateway: scene
//! brief + memory pack + an assembled, budgeted, health-checked context
//! window (spec flow diagram: C9 -> C6 -> writer.stream_draft), plus the
//! tiered cross-chapter "context for writing" accessor (spec §6.2) that
//! ranks every earlier chapter by distance from the one being written.

use wenshape_context::{BudgetManager, ContextOrchestrator};
use wenshape_protocol::error::StorageError;
use wenshape_protocol::evidence::EvidenceType;
use wenshape_protocol::memory_pack::MemoryPack;
use wenshape_protocol::summary::ChapterSummary;
use wenshape_protocol::{AgentKind, ChapterId, SceneBrief};
use wenshape_storage::Store;

const DEFAULT_EVIDENCE_TYPES: [EvidenceType; 5] =
    [EvidenceType::Fact, EvidenceType::Summary, EvidenceType::Character, EvidenceType::WorldEntity, EvidenceType::WorldRule];

pub struct AgentContext {
    pub prompt: String,
    pub health_findings: usize,
}

/// Assembles a budgeted context window for `agent` and renders it plus
/// the scene brief and memory pack's working-memory text into one
/// prompt string.
pub async fn build_agent_context(
    store: &Store,
    agent: AgentKind,
    chapter: &ChapterId,
    brief: &SceneBrief,
    memory_pack: &MemoryPack,
    current_draft: Option<&str>,
) -> Result<AgentContext, StorageError> {
    let orchestrator = ContextOrchestrator::new(store, BudgetManager::default());
    let assembled = orchestrator
        .assemble_context(agent, chapter, &brief.goal, &DEFAULT_EVIDENCE_TYPES, current_draft)
        .await?;
    let writing_context = context_for_writing(store, chapter).await?;

    let mut prompt = String::new();
    prompt.push_str(&format!("# Scene brief: {}\nGoal: {}\n", brief.title, brief.goal));
    if !brief.style_reminder.is_empty() {
        prompt.push_str(&format!("Style: {}\n", brief.style_reminder));
    }
    if !brief.forbidden.is_empty() {
        prompt.push_str(&format!("Forbidden: {}\n", brief.forbidden.join(", ")));
    }
    prompt.push('\n');
    prompt.push_str("# Working memory\n");
    prompt.push_str(&memory_pack.payload.working_memory);
    prompt.push_str("\n\n");
    prompt.push_str(&assembled.render_debug());
    prompt.push_str("\n\n");
    prompt.push_str(&writing_context.render());

    Ok(AgentContext { prompt, health_findings: assembled.health.findings.len() })
}

// ---- dynamic, distance-tiered cross-chapter retrieval ----------------

/// Ceiling on how many tokens [`context_for_writing`] will spend across
/// every tier combined.
const MAX_CONTEXT_TOKENS: u32 = 100_000;
const TOKENS_PER_FACT_LIST: u32 = 250;
const TOKENS_PER_CHAPTER_SUMMARY: u32 = 100;
const TOKENS_PER_VOLUME_SUMMARY: u32 = 150;
const TOKENS_PER_TITLE: u32 = 10;
/// Assumed chapters per volume for cross-volume distance, absent a
/// per-project figure (spec §3 `ChapterId::distance`'s `avg_per_volume`).
const AVG_CHAPTERS_PER_VOLUME: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalLevel {
    FullFacts,
    SummaryWithEvents,
    SummaryOnly,
    TitleOnly,
}

impl RetrievalLevel {
    fn downgrade(self) -> Self {
        match self {
            RetrievalLevel::FullFacts => RetrievalLevel::SummaryWithEvents,
            RetrievalLevel::SummaryWithEvents => RetrievalLevel::SummaryOnly,
            RetrievalLevel::SummaryOnly | RetrievalLevel::TitleOnly => RetrievalLevel::TitleOnly,
        }
    }

    fn estimated_tokens(self) -> u32 {
        match self {
            RetrievalLevel::FullFacts => TOKENS_PER_FACT_LIST + TOKENS_PER_CHAPTER_SUMMARY,
            RetrievalLevel::SummaryWithEvents | RetrievalLevel::SummaryOnly => TOKENS_PER_CHAPTER_SUMMARY,
            RetrievalLevel::TitleOnly => TOKENS_PER_TITLE,
        }
    }
}

/// One previous chapter's retrieved content at its assigned level.
#[derive(Debug, Clone)]
pub struct ChapterContext {
    pub chapter: ChapterId,
    pub title: String,
    pub level: RetrievalLevel,
    pub summary: Option<String>,
    pub key_events: Option<Vec<String>>,
    pub open_loops: Option<Vec<String>>,
}

/// A non-current volume's rolled-up summary, included as far background.
#[derive(Debug, Clone)]
pub struct VolumeContext {
    pub volume_id: String,
    pub brief_summary: String,
    pub key_themes: Vec<String>,
    pub major_events: Vec<String>,
}

/// The tiered context a writer/editor call needs for `chapter`: every
/// earlier chapter bucketed by how much detail its distance from
/// `chapter` earns it, filled greedily within [`MAX_CONTEXT_TOKENS`].
#[derive(Debug, Clone, Default)]
pub struct WritingContext {
    pub full_facts: Vec<ChapterContext>,
    pub summary_with_events: Vec<ChapterContext>,
    pub summary_only: Vec<ChapterContext>,
    pub title_only: Vec<ChapterContext>,
    pub volume_summaries: Vec<VolumeContext>,
    pub total_tokens: u32,
    pub chapters_retrieved: usize,
}

impl WritingContext {
    fn bucket_mut(&mut self, level: RetrievalLevel) -> &mut Vec<ChapterContext> {
        match level {
            RetrievalLevel::FullFacts => &mut self.full_facts,
            RetrievalLevel::SummaryWithEvents => &mut self.summary_with_events,
            RetrievalLevel::SummaryOnly => &mut self.summary_only,
            RetrievalLevel::TitleOnly => &mut self.title_only,
        }
    }

    /// Renders the tiered context as prompt-ready text, most detailed
    /// tier first (mirrors [`wenshape_context::AssembledContext::render_debug`]'s
    /// plain-text-section style).
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Prior chapters\n");
        for (label, bucket) in [
            ("Full facts", &self.full_facts),
            ("Summary + key events", &self.summary_with_events),
            ("Summary only", &self.summary_only),
        ] {
            for ctx in bucket {
                out.push_str(&format!("- [{label}] {} ({})\n", ctx.title, ctx.chapter));
                if let Some(summary) = &ctx.summary {
                    out.push_str(&format!("  {summary}\n"));
                }
                if let Some(events) = &ctx.key_events {
                    if !events.is_empty() {
                        out.push_str(&format!("  Key events: {}\n", events.join("; ")));
                    }
                }
                if let Some(loops) = &ctx.open_loops {
                    if !loops.is_empty() {
                        out.push_str(&format!("  Open loops: {}\n", loops.join("; ")));
                    }
                }
            }
        }
        if !self.title_only.is_empty() {
            let titles: Vec<String> = self.title_only.iter().map(|c| format!("{} ({})", c.title, c.chapter)).collect();
            out.push_str(&format!("- [Titles only] {}\n", titles.join(", ")));
        }
        if !self.volume_summaries.is_empty() {
            out.push_str("# Other volumes\n");
            for volume in &self.volume_summaries {
                out.push_str(&format!("- {}: {}\n", volume.volume_id, volume.brief_summary));
            }
        }
        out
    }
}

struct DynamicRanges {
    full_facts: u32,
    summary_events: u32,
    summary_only: u32,
    title_only: u32,
}

/// Bucket width scales with how many chapters exist so a 500-chapter
/// novel doesn't give chapter 1 the same "full facts" window as a
/// 10-chapter one (spec §4 supplemented feature: dynamic context
/// retriever).
fn calculate_dynamic_ranges(total_chapters: usize) -> DynamicRanges {
    if total_chapters <= 20 {
        DynamicRanges { full_facts: 2, summary_events: 5, summary_only: 10, title_only: 20 }
    } else if total_chapters <= 50 {
        DynamicRanges { full_facts: 2, summary_events: 5, summary_only: 15, title_only: 50 }
    } else if total_chapters <= 100 {
        DynamicRanges { full_facts: 3, summary_events: 8, summary_only: 25, title_only: 100 }
    } else if total_chapters <= 300 {
        DynamicRanges { full_facts: 3, summary_events: 10, summary_only: 40, title_only: 300 }
    } else {
        DynamicRanges { full_facts: 5, summary_events: 15, summary_only: 60, title_only: total_chapters as u32 }
    }
}

fn assign_retrieval_levels(previous: &[ChapterId], current: &ChapterId, ranges: &DynamicRanges) -> Vec<(ChapterId, RetrievalLevel, u32)> {
    let mut assigned: Vec<(ChapterId, RetrievalLevel, u32)> = previous
        .iter()
        .map(|chapter| {
            let distance = current.distance(chapter, AVG_CHAPTERS_PER_VOLUME);
            let level = if distance <= ranges.full_facts {
                RetrievalLevel::FullFacts
            } else if distance <= ranges.summary_events {
                RetrievalLevel::SummaryWithEvents
            } else if distance <= ranges.summary_only {
                RetrievalLevel::SummaryOnly
            } else {
                RetrievalLevel::TitleOnly
            };
            (*chapter, level, distance)
        })
        .collect();
    assigned.sort_by_key(|(_, _, distance)| *distance);
    assigned
}

fn chapter_content(summary: Option<&ChapterSummary>, chapter: ChapterId, level: RetrievalLevel) -> ChapterContext {
    let Some(summary) = summary else {
        return ChapterContext { chapter, title: chapter.to_string(), level, summary: None, key_events: None, open_loops: None };
    };
    match level {
        RetrievalLevel::FullFacts => ChapterContext {
            chapter,
            title: summary.title.clone(),
            level,
            summary: Some(summary.brief_summary.clone()),
            key_events: Some(summary.key_events.clone()),
            open_loops: Some(summary.open_loops.clone()),
        },
        RetrievalLevel::SummaryWithEvents => ChapterContext {
            chapter,
            title: summary.title.clone(),
            level,
            summary: Some(summary.brief_summary.clone()),
            key_events: Some(summary.key_events.clone()),
            open_loops: None,
        },
        RetrievalLevel::SummaryOnly => ChapterContext {
            chapter,
            title: summary.title.clone(),
            level,
            summary: Some(summary.brief_summary.clone()),
            key_events: None,
            open_loops: None,
        },
        RetrievalLevel::TitleOnly => {
            ChapterContext { chapter, title: summary.title.clone(), level, summary: None, key_events: None, open_loops: None }
        }
    }
}

async fn retrieve_within_budget(
    summaries: &std::collections::HashMap<ChapterId, ChapterSummary>,
    chapter_levels: Vec<(ChapterId, RetrievalLevel, u32)>,
    max_tokens: u32,
) -> WritingContext {
    let mut result = WritingContext::default();
    let mut used_tokens = 0u32;

    for (chapter, level, _distance) in chapter_levels {
        let summary = summaries.get(&chapter);
        let (chosen_level, tokens_needed) = if used_tokens + level.estimated_tokens() <= max_tokens {
            (level, level.estimated_tokens())
        } else {
            let downgraded = level.downgrade();
            if used_tokens + downgraded.estimated_tokens() <= max_tokens {
                (downgraded, downgraded.estimated_tokens())
            } else {
                (RetrievalLevel::TitleOnly, TOKENS_PER_TITLE)
            }
        };
        result.bucket_mut(chosen_level).push(chapter_content(summary, chapter, chosen_level));
        used_tokens += tokens_needed;
        result.chapters_retrieved += 1;
    }

    result.total_tokens = used_tokens;
    result
}

async fn retrieve_volume_summaries(store: &Store, current_volume: &str, used_tokens: u32) -> Result<(Vec<VolumeContext>, u32), StorageError> {
    let mut items = Vec::new();
    let mut tokens = 0u32;
    for summary in store.list_volume_summaries().await? {
        if summary.volume_id == current_volume {
            continue;
        }
        if used_tokens + tokens + TOKENS_PER_VOLUME_SUMMARY > MAX_CONTEXT_TOKENS {
            break;
        }
        items.push(VolumeContext {
            volume_id: summary.volume_id,
            brief_summary: summary.brief_summary,
            key_themes: summary.key_themes,
            major_events: summary.major_events,
        });
        tokens += TOKENS_PER_VOLUME_SUMMARY;
    }
    Ok((items, tokens))
}

/// The spec §6.2 "context-for-writing accessor": every chapter before
/// `current_chapter`, ranked by distance and bucketed into one of four
/// detail tiers, filled greedily within a fixed token budget, plus a
/// light summary of every other volume.
pub async fn context_for_writing(store: &Store, current_chapter: &ChapterId) -> Result<WritingContext, StorageError> {
    let all_summaries = store.list_chapter_summaries().await?;
    let mut by_chapter = std::collections::HashMap::new();
    let mut previous = Vec::new();
    for summary in all_summaries {
        if summary.chapter < *current_chapter {
            previous.push(summary.chapter);
        }
        by_chapter.insert(summary.chapter, summary);
    }
    ChapterId::sort(&mut previous);

    if previous.is_empty() {
        let (volume_summaries, tokens) = retrieve_volume_summaries(store, &current_chapter.volume_token(), 0).await?;
        return Ok(WritingContext { volume_summaries, total_tokens: tokens, ..Default::default() });
    }

    let ranges = calculate_dynamic_ranges(previous.len());
    let chapter_levels = assign_retrieval_levels(&previous, current_chapter, &ranges);
    let mut context = retrieve_within_budget(&by_chapter, chapter_levels, MAX_CONTEXT_TOKENS).await;

    let (volume_summaries, volume_tokens) = retrieve_volume_summaries(store, &current_chapter.volume_token(), context.total_tokens).await?;
    context.volume_summaries = volume_summaries;
    context.total_tokens += volume_tokens;
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::ChapterKind;

    fn summary(chapter: ChapterId, title: &str) -> ChapterSummary {
        ChapterSummary {
            chapter,
            volume_id: chapter.volume_token(),
            title: title.to_string(),
            word_count: 500,
            key_events: vec![format!("event in {chapter}")],
            new_facts: vec![],
            character_state_changes: vec![],
            open_loops: vec![format!("loop from {chapter}")],
            brief_summary: format!("Summary of {chapter}"),
            order_index: Some(chapter.chapter()),
        }
    }

    #[test]
    fn ranges_scale_with_total_chapters() {
        let small = calculate_dynamic_ranges(10);
        assert_eq!((small.full_facts, small.summary_events, small.summary_only, small.title_only), (2, 5, 10, 20));
        let huge = calculate_dynamic_ranges(500);
        assert_eq!(huge.title_only, 500);
    }

    #[test]
    fn level_downgrades_one_step_at_a_time() {
        assert_eq!(RetrievalLevel::FullFacts.downgrade(), RetrievalLevel::SummaryWithEvents);
        assert_eq!(RetrievalLevel::SummaryWithEvents.downgrade(), RetrievalLevel::SummaryOnly);
        assert_eq!(RetrievalLevel::SummaryOnly.downgrade(), RetrievalLevel::TitleOnly);
        assert_eq!(RetrievalLevel::TitleOnly.downgrade(), RetrievalLevel::TitleOnly);
    }

    #[tokio::test]
    async fn no_previous_chapters_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path(), wenshape_protocol::ProjectId::new("p").unwrap());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let context = context_for_writing(&store, &chapter).await.unwrap();
        assert_eq!(context.chapters_retrieved, 0);
        assert!(context.full_facts.is_empty());
    }

    #[tokio::test]
    async fn nearby_chapter_gets_full_facts_and_far_one_gets_title_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path(), wenshape_protocol::ProjectId::new("p").unwrap());
        let near = ChapterId::new(1, 29, ChapterKind::Base, 0);
        let far = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let current = ChapterId::new(1, 30, ChapterKind::Base, 0);
        store.write_summary(&summary(near, "Near")).await.unwrap();
        store.write_summary(&summary(far, "Far")).await.unwrap();

        let context = context_for_writing(&store, &current).await.unwrap();
        assert_eq!(context.chapters_retrieved, 2);
        assert_eq!(context.full_facts.len(), 1);
        assert_eq!(context.full_facts[0].chapter, near);
        assert_eq!(context.title_only.len(), 1);
        assert_eq!(context.title_only[0].chapter, far);
    }

    #[tokio::test]
    async fn tight_budget_downgrades_to_title_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path(), wenshape_protocol::ProjectId::new("p").unwrap());
        let prev = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let current = ChapterId::new(1, 2, ChapterKind::Base, 0);
        store.write_summary(&summary(prev, "Prev")).await.unwrap();

        let by_chapter: std::collections::HashMap<_, _> = [(prev, summary(prev, "Prev"))].into_iter().collect();
        let levels = vec![(prev, RetrievalLevel::FullFacts, 1u32)];
        let context = retrieve_within_budget(&by_chapter, levels, 5).await;
        assert!(context.full_facts.is_empty());
        assert_eq!(context.title_only.len(), 1);
    }
}
