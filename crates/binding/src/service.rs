//! Chapter Binding Service (spec §4.5): "who is in this chapter?" — per
//! chapter sets of character names, world-entity names, and world-rule
//! ids, computed from the chapter's own resolved draft text.

use std::collections::HashSet;

use chrono::Utc;
use wenshape_evidence::{chunk_text, ChunkConfig};
use wenshape_protocol::binding::{BindingSource, EntityMention, RuleMention};
use wenshape_protocol::error::StorageError;
use wenshape_protocol::{Card, ChapterBinding, ChapterId};
use wenshape_storage::Store;

use crate::candidates::{character_candidates, read_cards_index, world_entity_candidates, world_rule_candidates};
use crate::scoring::{score_entity, score_rule, ScoredEntity, ScoredRule};
use crate::stopwords;

/// Default lookback window for seed entities (spec §4.5 "Seeds").
const DEFAULT_SEED_WINDOW: usize = 2;
const LOOSE_MENTION_DEFAULT_LIMIT: usize = 20;

fn io_err(path: &std::path::Path, source: std::io::Error) -> StorageError {
    StorageError::Io { path: path.display().to_string(), source }
}

/// `final.md` if present, else the highest `draft_vN.md`; `None` if the
/// chapter has no draft content at all.
async fn resolve_latest_draft(
    store: &Store,
    chapter: &ChapterId,
) -> Result<Option<(String, String)>, StorageError> {
    let final_path = match store.paths().final_path(chapter) {
        Ok(p) => p,
        Err(_) => return Ok(None),
    };
    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        let content = tokio::fs::read_to_string(&final_path).await.map_err(|e| io_err(&final_path, e))?;
        return Ok(Some((format!("drafts/{chapter}/final.md"), content)));
    }

    let Ok(chapter_dir) = store.paths().drafts_chapter_dir(chapter) else { return Ok(None) };
    let mut entries = match tokio::fs::read_dir(&chapter_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(&chapter_dir, e)),
    };

    let mut best: Option<u32> = None;
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&chapter_dir, e))? {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(n) = name
            .strip_prefix("draft_v")
            .and_then(|s| s.strip_suffix(".md"))
            .and_then(|s| s.parse::<u32>().ok())
        {
            best = Some(best.map_or(n, |current| current.max(n)));
        }
    }

    match best {
        Some(n) => {
            let label = format!("v{n}");
            let path = store.paths().draft_path(chapter, &label).map_err(|e| StorageError::NotFound(e.to_string()))?;
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| io_err(&path, e))?;
            Ok(Some((format!("drafts/{chapter}/draft_{label}.md"), content)))
        }
        None => Ok(None),
    }
}

/// Rebuilds and persists the binding for one chapter.
pub async fn build_binding(store: &Store, chapter: &ChapterId) -> Result<ChapterBinding, StorageError> {
    let Some((draft_path, content)) = resolve_latest_draft(store, chapter).await? else {
        tracing::debug!(%chapter, "no draft content found, persisting empty binding");
        let binding = ChapterBinding::empty(*chapter);
        store.write_binding(&binding).await?;
        return Ok(binding);
    };

    let chunks: Vec<String> = chunk_text(&content, &ChunkConfig::default()).into_iter().map(|c| c.text).collect();

    let cards = store.list_cards().await?;
    let cards_index = read_cards_index(store).await;
    let seeds: HashSet<String> = get_seed_entities(store, chapter, DEFAULT_SEED_WINDOW, false)
        .await?
        .into_iter()
        .collect();

    let characters = score_candidates(&character_candidates(&cards), &content, &chunks, &seeds);
    let world_entities = score_candidates(&world_entity_candidates(&cards_index), &content, &chunks, &seeds);
    let world_rules = score_rules(&world_rule_candidates(&cards_index), &content, &chunks);

    let sources = build_sources(&characters, &world_entities, &world_rules);

    let binding = ChapterBinding {
        chapter: *chapter,
        characters: characters.into_iter().map(into_entity_mention).collect(),
        world_entities: world_entities.into_iter().map(into_entity_mention).collect(),
        world_rules: world_rules.into_iter().map(into_rule_mention).collect(),
        sources,
        draft_path: Some(draft_path),
        built_at: Utc::now(),
    };
    store.write_binding(&binding).await?;
    Ok(binding)
}

fn score_candidates(
    candidates: &[crate::candidates::EntityCandidate],
    full_text: &str,
    chunks: &[String],
    seeds: &HashSet<String>,
) -> Vec<ScoredEntity> {
    candidates.iter().filter_map(|c| score_entity(c, full_text, chunks, seeds)).collect()
}

fn score_rules(candidates: &[crate::candidates::RuleCandidate], full_text: &str, chunks: &[String]) -> Vec<ScoredRule> {
    candidates.iter().filter_map(|c| score_rule(c, full_text, chunks)).collect()
}

fn into_entity_mention(scored: ScoredEntity) -> EntityMention {
    EntityMention {
        name: scored.name,
        score: scored.score,
        count: scored.count,
        matched_aliases: scored.matched_aliases,
        examples: scored.examples,
    }
}

fn into_rule_mention(scored: ScoredRule) -> RuleMention {
    RuleMention { rule_id: scored.rule_id, score: scored.score, examples: scored.examples, text: scored.text }
}

fn build_sources(characters: &[ScoredEntity], world_entities: &[ScoredEntity], world_rules: &[ScoredRule]) -> Vec<BindingSource> {
    let mut sources = Vec::new();
    for c in characters {
        sources.push(BindingSource {
            entity: c.name.clone(),
            kind: "character".to_string(),
            count: c.count,
            score: c.score,
            examples: c.examples.clone(),
        });
    }
    for w in world_entities {
        sources.push(BindingSource {
            entity: w.name.clone(),
            kind: "world_entity".to_string(),
            count: w.count,
            score: w.score,
            examples: w.examples.clone(),
        });
    }
    for r in world_rules {
        sources.push(BindingSource {
            entity: r.rule_id.clone(),
            kind: "world_rule".to_string(),
            count: u32::from(!r.examples.is_empty()),
            score: r.score,
            examples: r.examples.clone(),
        });
    }
    sources
}

/// Rebuilds bindings for `chapters` in ascending chapter order, or every
/// chapter with draft content when `chapters` is empty. Sequential so a
/// chapter's seed window always sees its already-rebuilt predecessors.
pub async fn batch_rebuild(store: &Store, chapters: Vec<ChapterId>) -> Result<Vec<ChapterBinding>, StorageError> {
    let mut targets = if chapters.is_empty() { all_draft_chapters(store).await? } else { chapters };
    ChapterId::sort(&mut targets);

    let mut bindings = Vec::with_capacity(targets.len());
    for chapter in &targets {
        bindings.push(build_binding(store, chapter).await?);
    }
    Ok(bindings)
}

async fn all_draft_chapters(store: &Store) -> Result<Vec<ChapterId>, StorageError> {
    let drafts_dir = store.paths().root().join("drafts");
    let mut entries = match tokio::fs::read_dir(&drafts_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(&drafts_dir, e)),
    };
    let mut chapters = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&drafts_dir, e))? {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Ok(chapter) = ChapterId::parse(&name) {
            chapters.push(chapter);
        }
    }
    Ok(chapters)
}

/// Union of seed entity names (and, if requested, rule ids) from the
/// `window` chapters immediately preceding `chapter` that already have a
/// persisted binding, deduped in nearest-first order.
pub async fn get_seed_entities(
    store: &Store,
    chapter: &ChapterId,
    window: usize,
    include_world_rules: bool,
) -> Result<Vec<String>, StorageError> {
    let chapters_dir = store.paths().index_dir().join("chapters");
    let mut entries = match tokio::fs::read_dir(&chapters_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(&chapters_dir, e)),
    };

    let mut prior: Vec<ChapterId> = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&chapters_dir, e))? {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Ok(candidate) = ChapterId::parse(&name) {
            if candidate.weight() < chapter.weight() {
                prior.push(candidate);
            }
        }
    }
    ChapterId::sort(&mut prior);
    prior.reverse();
    prior.truncate(window);

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for prior_chapter in &prior {
        if let Some(binding) = store.read_binding(prior_chapter).await? {
            for name in binding.seed_names(include_world_rules) {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }
    }
    Ok(names)
}

/// Runs the same candidate+score pipeline as [`build_binding`] over a
/// single synthesized chunk of ad-hoc text, without touching persisted
/// bindings (used for short excerpts: scene briefs, drafted paragraphs).
pub async fn extract_entities_from_text(
    store: &Store,
    text: &str,
) -> Result<(Vec<EntityMention>, Vec<EntityMention>, Vec<RuleMention>), StorageError> {
    let chunks = vec![text.to_string()];
    let cards: Vec<Card> = store.list_cards().await?;
    let cards_index = read_cards_index(store).await;

    let characters = score_candidates(&character_candidates(&cards), text, &chunks, &HashSet::new());
    let world_entities = score_candidates(&world_entity_candidates(&cards_index), text, &chunks, &HashSet::new());
    let world_rules = score_rules(&world_rule_candidates(&cards_index), text, &chunks);

    Ok((
        characters.into_iter().map(into_entity_mention).collect(),
        world_entities.into_iter().map(into_entity_mention).collect(),
        world_rules.into_iter().map(into_rule_mention).collect(),
    ))
}

fn capitalized_run_pattern() -> &'static regex_lite::Regex {
    static RE: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex_lite::Regex::new(r"[A-Z][a-z']+(?:\s[A-Z][a-z']+)*").expect("static loose-mention pattern is valid")
    })
}

/// Cheap, non-authoritative name-looking candidates pulled straight out of
/// `text` via regex (capitalized-word runs) — for UI hinting only. Must
/// never feed back into [`build_binding`] or persisted bindings (Design
/// Notes §9).
pub fn extract_loose_mentions(text: &str, limit: usize) -> Vec<String> {
    let limit = if limit == 0 { LOOSE_MENTION_DEFAULT_LIMIT } else { limit };
    let mut seen = HashSet::new();
    let mut mentions = Vec::new();
    for m in capitalized_run_pattern().find_iter(text) {
        let candidate = m.as_str();
        if stopwords::is_bindable_name(candidate) && seen.insert(candidate.to_string()) {
            mentions.push(candidate.to_string());
            if mentions.len() >= limit {
                break;
            }
        }
    }
    mentions
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::{ChapterKind, ProjectId};

    fn store(dir: &tempfile::TempDir) -> Store {
        Store::new(dir.path(), ProjectId::new("demo").unwrap())
    }

    #[tokio::test]
    async fn chapter_without_any_draft_persists_an_empty_binding() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let binding = build_binding(&store, &chapter).await.unwrap();
        assert!(binding.characters.is_empty());
        assert!(binding.draft_path.is_none());
        assert!(store.read_binding(&chapter).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn literal_character_mentions_are_bound() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .write_character_card(&wenshape_protocol::CharacterCard {
                name: "Alice".into(),
                aliases: vec![],
                description: String::new(),
                stars: 2,
            })
            .await
            .unwrap();
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        store.finalize_draft(&chapter, "Alice crossed the bridge before dawn. Alice did not look back.".into()).await.unwrap();

        let binding = build_binding(&store, &chapter).await.unwrap();
        assert_eq!(binding.characters.len(), 1);
        assert_eq!(binding.characters[0].name, "Alice");
        assert_eq!(binding.characters[0].count, 2);
        assert_eq!(binding.draft_path.as_deref(), Some("drafts/V1C1/final.md"));
    }

    #[tokio::test]
    async fn seed_entities_come_from_the_preceding_window_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let c1 = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let c2 = ChapterId::new(1, 2, ChapterKind::Base, 0);
        let c3 = ChapterId::new(1, 3, ChapterKind::Base, 0);

        store.write_binding(&ChapterBinding {
            characters: vec![EntityMention { name: "Alice".into(), score: 2.0, count: 2, matched_aliases: vec![], examples: vec![] }],
            ..ChapterBinding::empty(c1)
        }).await.unwrap();
        store.write_binding(&ChapterBinding::empty(c2)).await.unwrap();

        let seeds = get_seed_entities(&store, &c3, 2, false).await.unwrap();
        assert!(seeds.contains(&"Alice".to_string()));
    }

    #[test]
    fn loose_mentions_pull_capitalized_runs_without_touching_bindings() {
        let mentions = extract_loose_mentions("Alice met Bob near the Old Mill at dusk.", 10);
        assert!(mentions.contains(&"Alice".to_string()));
        assert!(mentions.contains(&"Bob".to_string()));
        assert!(mentions.iter().any(|m| m.contains("Old Mill")));
    }
}
