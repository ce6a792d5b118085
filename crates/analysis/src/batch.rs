//! Batch-sync driver (spec §4.11 "Batch-sync"): orders chapters by
//! ChapterID, runs summary → canon → conflicts → proposals per chapter,
//! rebuilds bindings, then refreshes every touched volume once at the end.

use wenshape_llm::LLMGateway;
use wenshape_protocol::{ChapterId, StorageError};
use wenshape_storage::Store;
use wenshape_trace::ProgressBus;

use crate::canon::{
    detect_fact_conflicts, detect_state_conflicts, detect_timeline_conflicts, extract_canon_updates,
    Conflict, DEFAULT_AVG_CHAPTERS_PER_VOLUME,
};
use crate::chapter_summary::{generate_chapter_summary, refresh_volume_summary};
use crate::proposals::{create_cards_from_proposals, detect_proposals};

#[derive(Debug, Default)]
pub struct BatchSyncReport {
    pub chapters_processed: usize,
    pub facts_added: usize,
    pub conflicts: Vec<Conflict>,
    pub proposals_created: usize,
    pub volumes_refreshed: Vec<String>,
}

pub async fn run_batch_sync(
    store: &Store,
    gateway: Option<&dyn LLMGateway>,
    progress: Option<&ProgressBus>,
    project_id: wenshape_protocol::ProjectId,
    mut chapters: Vec<ChapterId>,
) -> Result<BatchSyncReport, StorageError> {
    ChapterId::sort(&mut chapters);

    let mut report = BatchSyncReport::default();
    let mut chapter_summaries = Vec::new();
    let mut touched_volumes = std::collections::HashSet::new();

    for chapter in &chapters {
        emit(progress, &project_id, Some(*chapter), "batch_sync", "chapter_start").await;

        let Some(draft) = store.read_draft(chapter, &wenshape_protocol::draft::DraftVersion::current()).await? else {
            continue;
        };
        let volume_id = chapter.volume_token();
        touched_volumes.insert(volume_id.clone());

        let summary = generate_chapter_summary(gateway, *chapter, &volume_id, &draft.content, Some(chapter.weight() as u32)).await;
        store.write_summary(&summary).await?;

        let existing_facts = store.read_facts().await?;
        let existing_timeline = store.read_timeline().await?;
        let existing_states = store.read_character_states().await?;

        let updates = extract_canon_updates(store, gateway, &summary, &draft.content).await?;
        report.facts_added += updates.facts.len();

        report.conflicts.extend(detect_fact_conflicts(&existing_facts, &updates.facts));
        report.conflicts.extend(detect_timeline_conflicts(&existing_timeline, &updates.timeline_events));
        report.conflicts.extend(detect_state_conflicts(
            &existing_states,
            &updates.character_states,
            *chapter,
            DEFAULT_AVG_CHAPTERS_PER_VOLUME,
        ));

        let proposals = detect_proposals(store, *chapter, &draft.content).await?;
        report.proposals_created += create_cards_from_proposals(store, &proposals).await?;

        let binding = match wenshape_binding::build_binding(store, chapter).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(chapter = %chapter, error = %e, "binding rebuild failed during batch sync");
                continue;
            }
        };
        store.write_binding(&binding).await?;

        chapter_summaries.push(summary);
        report.chapters_processed += 1;
        emit(progress, &project_id, Some(*chapter), "batch_sync", "chapter_done").await;
    }

    for volume_id in &touched_volumes {
        if let Some(volume_summary) = refresh_volume_summary(store, volume_id, &chapter_summaries).await {
            store.write_volume_summary(&volume_summary).await?;
            report.volumes_refreshed.push(volume_id.clone());
        }
    }

    emit(progress, &project_id, None, "batch_sync", "complete").await;
    Ok(report)
}

async fn emit(progress: Option<&ProgressBus>, project_id: &wenshape_protocol::ProjectId, chapter: Option<ChapterId>, kind: &str, status: &str) {
    if let Some(bus) = progress {
        let event = wenshape_protocol::progress::ProgressEvent::new(kind, project_id.clone(), chapter).with_status(status);
        bus.publish(event).await;
    }
}
