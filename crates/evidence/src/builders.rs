//! Evidence item builders for the `facts`, `summaries`, `cards`, and
//! `text_chunks` indices (spec §4.3, §4.4).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use wenshape_protocol::error::StorageError;
use wenshape_protocol::evidence::{EvidenceItem, EvidenceMeta, EvidenceScope, EvidenceSource, EvidenceType};
use wenshape_protocol::{Card, ChapterId, CharacterCard, ChapterSummary, VolumeSummary, WorldCard};
use wenshape_storage::Store;

use crate::text_chunks::{chunk_text, chunk_to_evidence_item, ChunkConfig};

/// Sentences containing one of these are treated as world *rules* rather
/// than plain entity description lines.
const RULE_MARKERS: &[&str] = &["必须", "禁止", "不得", "只能", "会导致", "不能", "严禁", "只有", "务必"];

const GENERIC_TERMS: &[&str] = &[
    "the", "a", "an", "it", "this", "that", "he", "she", "they", "世界", "角色", "设定",
];

fn looks_like_entity_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.chars().count() >= 2
        && !trimmed.chars().all(|c| c.is_ascii_digit())
        && !GENERIC_TERMS.contains(&trimmed.to_lowercase().as_str())
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn make_item(
    id: String,
    kind: EvidenceType,
    text: String,
    source: EvidenceSource,
    scope: EvidenceScope,
    entities: Vec<String>,
    stars: u8,
) -> EvidenceItem {
    let doc_len = text.split_whitespace().count().max(1);
    EvidenceItem {
        id,
        kind,
        text,
        source,
        scope,
        entities,
        meta: EvidenceMeta {
            doc_len,
            stars,
            extra: Default::default(),
        },
    }
}

/// One item per fact, deduped on normalized (trimmed, lowercased) text.
pub async fn build_fact_items(store: &Store) -> Result<Vec<EvidenceItem>, StorageError> {
    let facts = store.read_facts().await?;
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for fact in facts {
        let normalized = fact.statement.trim().to_lowercase();
        if normalized.is_empty() || !seen.insert(normalized) {
            continue;
        }
        items.push(make_item(
            fact.id.clone(),
            EvidenceType::Fact,
            fact.statement.clone(),
            EvidenceSource {
                chapter: Some(fact.source.to_string()),
                path: Some("canon/facts.jsonl".to_string()),
                field: Some("statement".to_string()),
                ..Default::default()
            },
            EvidenceScope::Chapter,
            Vec::new(),
            1,
        ));
    }
    Ok(items)
}

fn io_err(path: &std::path::Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Items for each chapter summary's `brief_summary`, `key_events[i]`, and
/// `open_loops[i]`, plus each touched volume's `brief_summary`.
pub async fn build_summary_items(store: &Store) -> Result<Vec<EvidenceItem>, StorageError> {
    let mut items = Vec::new();

    let summaries_dir = store.paths().root().join("summaries");
    if let Ok(mut entries) = tokio::fs::read_dir(&summaries_dir).await {
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&summaries_dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let summary = match serde_yaml::from_slice::<ChapterSummary>(&bytes) {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparseable chapter summary");
                    continue;
                }
            };
            items.extend(chapter_summary_items(&summary, &path));
        }
    }

    let volumes_dir = store.paths().root().join("volumes");
    if let Ok(mut entries) = tokio::fs::read_dir(&volumes_dir).await {
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&volumes_dir, e))? {
            let path = entry.path();
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if !name.ends_with("_summary.yaml") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let summary = match serde_yaml::from_slice::<VolumeSummary>(&bytes) {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparseable volume summary");
                    continue;
                }
            };
            if summary.brief_summary.trim().is_empty() {
                continue;
            }
            items.push(make_item(
                format!("summary:{}:brief", summary.volume_id),
                EvidenceType::Summary,
                summary.brief_summary.clone(),
                EvidenceSource {
                    path: Some(path.display().to_string()),
                    field: Some("brief_summary".to_string()),
                    ..Default::default()
                },
                EvidenceScope::Volume,
                Vec::new(),
                1,
            ));
        }
    }

    Ok(items)
}

fn chapter_summary_items(summary: &ChapterSummary, path: &std::path::Path) -> Vec<EvidenceItem> {
    let chapter_str = summary.chapter.to_string();
    let mut items = Vec::new();
    if !summary.brief_summary.trim().is_empty() {
        items.push(make_item(
            format!("summary:{chapter_str}:brief"),
            EvidenceType::Summary,
            summary.brief_summary.clone(),
            EvidenceSource {
                chapter: Some(chapter_str.clone()),
                path: Some(path.display().to_string()),
                field: Some("brief_summary".to_string()),
                ..Default::default()
            },
            EvidenceScope::Chapter,
            Vec::new(),
            1,
        ));
    }
    for (i, event) in summary.key_events.iter().enumerate() {
        items.push(make_item(
            format!("summary:{chapter_str}:key_events:{i}"),
            EvidenceType::Summary,
            event.clone(),
            EvidenceSource {
                chapter: Some(chapter_str.clone()),
                path: Some(path.display().to_string()),
                field: Some("key_events".to_string()),
                ..Default::default()
            },
            EvidenceScope::Chapter,
            Vec::new(),
            1,
        ));
    }
    for (i, open_loop) in summary.open_loops.iter().enumerate() {
        items.push(make_item(
            format!("summary:{chapter_str}:open_loops:{i}"),
            EvidenceType::Summary,
            open_loop.clone(),
            EvidenceSource {
                chapter: Some(chapter_str.clone()),
                path: Some(path.display().to_string()),
                field: Some("open_loops".to_string()),
                ..Default::default()
            },
            EvidenceScope::Chapter,
            Vec::new(),
            1,
        ));
    }
    items
}

/// Character/world card fields split into short lines, plus derived
/// `world_rule`/`world_entity` pseudo-items (spec §4.3).
pub async fn build_card_items(store: &Store) -> Result<Vec<EvidenceItem>, StorageError> {
    let cards = store.list_cards().await?;
    let mut items = Vec::new();
    for card in cards {
        match card {
            Card::Character(c) => items.extend(character_card_items(&c)),
            Card::World(w) => items.extend(world_card_items(&w)),
            Card::Style(_) => {}
        }
    }
    Ok(items)
}

fn character_card_items(card: &CharacterCard) -> Vec<EvidenceItem> {
    let mut items = Vec::new();
    for (i, line) in split_lines(&card.description).into_iter().enumerate() {
        items.push(make_item(
            format!("character:{}:description:{i}", card.name),
            EvidenceType::Character,
            line,
            EvidenceSource {
                card: Some(card.name.clone()),
                field: Some("description".to_string()),
                ..Default::default()
            },
            EvidenceScope::Global,
            vec![card.name.clone()],
            card.stars,
        ));
    }
    if !card.aliases.is_empty() {
        items.push(make_item(
            format!("character:{}:aliases", card.name),
            EvidenceType::Character,
            format!("{}: {}", card.name, card.aliases.join(", ")),
            EvidenceSource {
                card: Some(card.name.clone()),
                field: Some("aliases".to_string()),
                ..Default::default()
            },
            EvidenceScope::Global,
            vec![card.name.clone()],
            card.stars,
        ));
    }
    items
}

fn world_card_items(card: &WorldCard) -> Vec<EvidenceItem> {
    let mut items = Vec::new();
    for (i, line) in split_lines(&card.description).into_iter().enumerate() {
        items.push(make_item(
            format!("world_entity:{}:description:{i}", card.name),
            EvidenceType::WorldEntity,
            line,
            EvidenceSource {
                card: Some(card.name.clone()),
                field: Some("description".to_string()),
                ..Default::default()
            },
            EvidenceScope::Global,
            vec![card.name.clone()],
            card.stars,
        ));
    }
    if let Some(category) = &card.category {
        if !category.trim().is_empty() {
            items.push(make_item(
                format!("world_entity:{}:category", card.name),
                EvidenceType::WorldEntity,
                format!("{}: {category}", card.name),
                EvidenceSource {
                    card: Some(card.name.clone()),
                    field: Some("category".to_string()),
                    ..Default::default()
                },
                EvidenceScope::Global,
                vec![card.name.clone()],
                card.stars,
            ));
        }
    }
    if card.immutable {
        items.push(make_item(
            format!("world_rule:{}:immutable", card.name),
            EvidenceType::WorldRule,
            format!("{} 不可更改", card.name),
            EvidenceSource {
                card: Some(card.name.clone()),
                field: Some("immutable".to_string()),
                ..Default::default()
            },
            EvidenceScope::Global,
            vec![card.name.clone()],
            card.stars,
        ));
    }
    for (i, rule) in card.rules.iter().enumerate() {
        let is_rule = RULE_MARKERS.iter().any(|m| rule.contains(m));
        let kind = if is_rule { EvidenceType::WorldRule } else { EvidenceType::WorldEntity };
        let prefix = if is_rule { "world_rule" } else { "world_entity" };
        items.push(make_item(
            format!("{prefix}:{}:{i}", card.name),
            kind,
            rule.clone(),
            EvidenceSource {
                card: Some(card.name.clone()),
                field: Some("rules".to_string()),
                ..Default::default()
            },
            EvidenceScope::Global,
            vec![card.name.clone()],
            card.stars,
        ));
    }
    if looks_like_entity_name(&card.name) {
        items.push(make_item(
            format!("world_entity:{}:name", card.name),
            EvidenceType::WorldEntity,
            card.name.clone(),
            EvidenceSource {
                card: Some(card.name.clone()),
                field: Some("name".to_string()),
                ..Default::default()
            },
            EvidenceScope::Global,
            vec![card.name.clone()],
            card.stars,
        ));
    }
    items
}

/// Locates each chapter's resolved draft (`final.md` if it exists, else
/// the highest-numbered `draft_vN.md`) and chunks it (spec §4.4). Returns
/// the chunk items alongside the latest draft mtime seen, used by the
/// index's incremental-rebuild check.
pub async fn build_text_chunk_items(
    store: &Store,
    config: &ChunkConfig,
) -> Result<(Vec<EvidenceItem>, Option<DateTime<Utc>>), StorageError> {
    let drafts_dir = store.paths().root().join("drafts");
    let mut items = Vec::new();
    let mut latest_mtime: Option<DateTime<Utc>> = None;

    let mut chapter_dirs = match tokio::fs::read_dir(&drafts_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((items, latest_mtime)),
        Err(e) => return Err(io_err(&drafts_dir, e)),
    };

    while let Some(entry) = chapter_dirs.next_entry().await.map_err(|e| io_err(&drafts_dir, e))? {
        let dir_path = entry.path();
        if !dir_path.is_dir() {
            continue;
        }
        let dir_name = dir_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let Ok(chapter) = ChapterId::parse(&dir_name) else { continue };

        let Some((label, resolved_path)) = resolve_latest_draft(&dir_path).await else { continue };
        let Ok(content) = tokio::fs::read_to_string(&resolved_path).await else { continue };
        let Ok(metadata) = tokio::fs::metadata(&resolved_path).await else { continue };
        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            latest_mtime = Some(latest_mtime.map_or(modified, |current| current.max(modified)));
        }

        let relative_path = format!("drafts/{dir_name}/{label}.md");
        for chunk in chunk_text(&content, config) {
            items.push(chunk_to_evidence_item(&chapter, &label, &relative_path, &chunk));
        }
    }

    Ok((items, latest_mtime))
}

/// `final.md` wins if present; otherwise the highest `draft_vN.md`.
async fn resolve_latest_draft(chapter_dir: &std::path::Path) -> Option<(String, std::path::PathBuf)> {
    let final_path = chapter_dir.join("final.md");
    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        return Some(("final".to_string(), final_path));
    }

    let mut entries = tokio::fs::read_dir(chapter_dir).await.ok()?;
    let mut best: Option<(u32, std::path::PathBuf)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = path.file_name()?.to_string_lossy().to_string();
        if let Some(n) = name.strip_prefix("draft_v").and_then(|s| s.strip_suffix(".md")).and_then(|s| s.parse::<u32>().ok())
        {
            let is_better = match &best {
                Some((current, _)) => n > *current,
                None => true,
            };
            if is_better {
                best = Some((n, path));
            }
        }
    }
    best.map(|(n, path)| (format!("v{n}"), path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wenshape_protocol::{ChapterId, ChapterKind, ProjectId};

    fn store(dir: &tempfile::TempDir) -> Store {
        Store::new(dir.path(), ProjectId::new("demo").unwrap())
    }

    #[tokio::test]
    async fn fact_items_dedup_by_normalized_text() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let fact = wenshape_protocol::Fact {
            id: "F0000".into(),
            statement: "Alice is a knight".into(),
            source: chapter,
            introduced_in: chapter,
            confidence: 0.9,
            title: None,
            summary_ref: None,
        };
        let fact_dup = wenshape_protocol::Fact {
            id: "F0001".into(),
            statement: "ALICE IS A KNIGHT  ".into(),
            ..fact.clone()
        };
        store.append_fact(&fact).await.unwrap();
        store.append_fact(&fact_dup).await.unwrap();
        let items = build_fact_items(&store).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn world_card_rule_lines_become_world_rule_items() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let card = WorldCard {
            name: "Arcane Law".into(),
            description: "Binds all mages.".into(),
            aliases: vec![],
            category: None,
            rules: vec!["魔法师必须佩戴徽章".into(), "拥有悠久的历史".into()],
            immutable: true,
            stars: 2,
        };
        store.write_world_card(&card).await.unwrap();
        let items = build_card_items(&store).await.unwrap();
        let rule_item = items.iter().find(|i| i.id.starts_with("world_rule:")).unwrap();
        assert_eq!(rule_item.kind, EvidenceType::WorldRule);
        let entity_item = items.iter().find(|i| i.id == "world_entity:Arcane Law:rules:1").unwrap();
        assert_eq!(entity_item.kind, EvidenceType::WorldEntity);
    }

    #[tokio::test]
    async fn text_chunks_prefer_final_over_draft_versions() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        store.save_draft(&chapter, "An early pass at the opening scene.".into()).await.unwrap();
        store.finalize_draft(&chapter, "The dragon circled the tower at dusk, wings dark against the sky.".into()).await.unwrap();

        let (items, latest_mtime) = build_text_chunk_items(&store, &ChunkConfig::default()).await.unwrap();
        assert!(!items.is_empty());
        assert!(items.iter().all(|i| i.source.path.as_deref().unwrap().contains("final")));
        assert!(latest_mtime.is_some());
    }

    #[tokio::test]
    async fn text_chunks_fall_back_to_highest_draft_version() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = ChapterId::new(1, 2, ChapterKind::Base, 0);
        store.save_draft(&chapter, "First draft of the council scene.".into()).await.unwrap();
        store.save_draft(&chapter, "Second draft of the council scene, now with more tension.".into()).await.unwrap();

        let (items, _) = build_text_chunk_items(&store, &ChunkConfig::default()).await.unwrap();
        assert!(!items.is_empty());
        assert!(items.iter().all(|i| i.source.path.as_deref().unwrap().contains("v2")));
    }
}
