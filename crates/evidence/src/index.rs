//! Evidence index orchestration (spec §4.3): incremental builds per
//! source, BM25 + bonus ranking, type-quota selection, and the
//! append-only memory index.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use wenshape_protocol::error::StorageError;
use wenshape_protocol::evidence::{EvidenceIndexMeta, EvidenceItem, EvidenceType};
use wenshape_protocol::ChapterId;
use wenshape_storage::Store;

use crate::bm25::{self, Bm25Params};
use crate::builders::{build_card_items, build_fact_items, build_summary_items, build_text_chunk_items};
use crate::text_chunks::{search_text_chunks, ChunkConfig, SemanticReranker, TextChunkQuery};
use crate::tokenize::query_terms;

const INDEX_FACTS: &str = "facts";
const INDEX_SUMMARIES: &str = "summaries";
const INDEX_CARDS: &str = "cards";
const INDEX_TEXT_CHUNKS: &str = "text_chunks";
const INDEX_MEMORY: &str = "memory";

/// Per-type selection bounds applied by [`apply_type_quotas`] (spec
/// §4.3's documented defaults). `World` is deliberately absent: the
/// spec's "world 0..2" line has no corresponding [`EvidenceType`]
/// variant, since world-card evidence is already split into
/// `WorldRule`/`WorldEntity`, each individually quota'd below.
#[derive(Debug, Clone, Copy)]
pub struct TypeQuota {
    pub min: usize,
    pub max: usize,
}

pub fn default_quotas() -> HashMap<EvidenceType, TypeQuota> {
    [
        (EvidenceType::Fact, TypeQuota { min: 3, max: 8 }),
        (EvidenceType::Summary, TypeQuota { min: 1, max: 6 }),
        (EvidenceType::TextChunk, TypeQuota { min: 3, max: 8 }),
        (EvidenceType::Character, TypeQuota { min: 0, max: 6 }),
        (EvidenceType::WorldRule, TypeQuota { min: 2, max: 6 }),
        (EvidenceType::WorldEntity, TypeQuota { min: 1, max: 6 }),
        (EvidenceType::Style, TypeQuota { min: 0, max: 1 }),
        (EvidenceType::Memory, TypeQuota { min: 0, max: 4 }),
    ]
    .into_iter()
    .collect()
}

/// Two-phase selection: Phase A fills each type's minimum (in descending
/// score order within the type), Phase B fills remaining slots in global
/// score order while respecting each type's maximum.
pub fn apply_type_quotas(
    ranked: &[(EvidenceItem, f64)],
    quotas: &HashMap<EvidenceType, TypeQuota>,
    limit: usize,
) -> Vec<EvidenceItem> {
    let mut selected: Vec<(EvidenceItem, f64)> = Vec::new();
    let mut selected_ids: HashSet<String> = HashSet::new();
    let mut per_type_count: HashMap<EvidenceType, usize> = HashMap::new();

    for (kind, quota) in quotas {
        if quota.min == 0 || selected.len() >= limit {
            continue;
        }
        let mut taken = 0;
        for (item, score) in ranked {
            if taken >= quota.min || selected.len() >= limit {
                break;
            }
            if item.kind != *kind || selected_ids.contains(&item.id) {
                continue;
            }
            selected.push((item.clone(), *score));
            selected_ids.insert(item.id.clone());
            *per_type_count.entry(*kind).or_insert(0) += 1;
            taken += 1;
        }
    }

    for (item, score) in ranked {
        if selected.len() >= limit {
            break;
        }
        if selected_ids.contains(&item.id) {
            continue;
        }
        let max = quotas.get(&item.kind).map(|q| q.max).unwrap_or(usize::MAX);
        let current = *per_type_count.get(&item.kind).unwrap_or(&0);
        if current >= max {
            continue;
        }
        selected.push((item.clone(), *score));
        selected_ids.insert(item.id.clone());
        *per_type_count.entry(item.kind).or_insert(0) += 1;
    }

    selected.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    selected.into_iter().map(|(item, _)| item).collect()
}

async fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// Walks `root` (recursively, non-async-recursive via an explicit stack)
/// and returns the most recent file mtime found underneath it.
async fn dir_max_mtime(root: &Path) -> Option<DateTime<Utc>> {
    let mut stack = vec![root.to_path_buf()];
    let mut max_mtime: Option<DateTime<Utc>> = None;
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(metadata) = entry.metadata().await else { continue };
            if metadata.is_dir() {
                stack.push(path);
            } else if let Ok(modified) = metadata.modified() {
                let modified: DateTime<Utc> = modified.into();
                max_mtime = Some(max_mtime.map_or(modified, |m| m.max(modified)));
            }
        }
    }
    max_mtime
}

async fn current_meta(store: &Store, index_name: &str, force: bool) -> Option<EvidenceIndexMeta> {
    if force {
        return None;
    }
    store.read_index_meta::<EvidenceIndexMeta>(index_name).await.ok().flatten()
}

async fn write_built_index(
    store: &Store,
    index_name: &str,
    items: &[EvidenceItem],
    source_mtime: DateTime<Utc>,
) -> Result<usize, StorageError> {
    store.write_index_jsonl(index_name, items).await?;
    let meta = EvidenceIndexMeta {
        index_name: index_name.to_string(),
        built_at: Utc::now(),
        item_count: items.len(),
        source_mtime,
        details: HashMap::new(),
    };
    store.write_index_meta(index_name, &meta).await?;
    Ok(items.len())
}

/// Rebuilds the `facts` index unless a prior build is already fresh
/// relative to `canon/facts.jsonl`'s mtime.
pub async fn build_facts_index(store: &Store, force: bool) -> Result<usize, StorageError> {
    let source_mtime = file_mtime(&store.paths().facts_path()).await.unwrap_or_else(Utc::now);
    if let Some(meta) = current_meta(store, INDEX_FACTS, force).await {
        if !meta.is_stale(source_mtime) {
            return Ok(meta.item_count);
        }
    }
    let items = build_fact_items(store).await?;
    write_built_index(store, INDEX_FACTS, &items, source_mtime).await
}

/// Rebuilds the `summaries` index unless fresh relative to the newest
/// file under `summaries/` or `volumes/`.
pub async fn build_summaries_index(store: &Store, force: bool) -> Result<usize, StorageError> {
    let summaries_mtime = dir_max_mtime(&store.paths().root().join("summaries")).await;
    let volumes_mtime = dir_max_mtime(&store.paths().root().join("volumes")).await;
    let source_mtime = match (summaries_mtime, volumes_mtime) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => Utc::now(),
    };
    if let Some(meta) = current_meta(store, INDEX_SUMMARIES, force).await {
        if !meta.is_stale(source_mtime) {
            return Ok(meta.item_count);
        }
    }
    let items = build_summary_items(store).await?;
    write_built_index(store, INDEX_SUMMARIES, &items, source_mtime).await
}

/// Rebuilds the `cards` index unless fresh relative to the newest file
/// under `cards/`.
pub async fn build_cards_index(store: &Store, force: bool) -> Result<usize, StorageError> {
    let source_mtime = dir_max_mtime(&store.paths().cards_dir()).await.unwrap_or_else(Utc::now);
    if let Some(meta) = current_meta(store, INDEX_CARDS, force).await {
        if !meta.is_stale(source_mtime) {
            return Ok(meta.item_count);
        }
    }
    let items = build_card_items(store).await?;
    write_built_index(store, INDEX_CARDS, &items, source_mtime).await
}

/// Rebuilds the `text_chunks` index unless fresh relative to the newest
/// resolved draft across all chapters.
pub async fn build_text_chunks_index(store: &Store, config: &ChunkConfig, force: bool) -> Result<usize, StorageError> {
    let (items, latest_draft_mtime) = build_text_chunk_items(store, config).await?;
    let source_mtime = latest_draft_mtime.unwrap_or_else(Utc::now);
    if let Some(meta) = current_meta(store, INDEX_TEXT_CHUNKS, force).await {
        if !meta.is_stale(source_mtime) {
            return Ok(meta.item_count);
        }
    }
    write_built_index(store, INDEX_TEXT_CHUNKS, &items, source_mtime).await
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub facts: usize,
    pub summaries: usize,
    pub cards: usize,
    pub text_chunks: usize,
}

/// Rebuilds every source-derived index (everything but `memory`, which is
/// append-only and never rebuilt from source).
pub async fn build_all(store: &Store, config: &ChunkConfig, force: bool) -> Result<BuildReport, StorageError> {
    Ok(BuildReport {
        facts: build_facts_index(store, force).await?,
        summaries: build_summaries_index(store, force).await?,
        cards: build_cards_index(store, force).await?,
        text_chunks: build_text_chunks_index(store, config, force).await?,
    })
}

/// Appends freshly-minted memory items to the append-only `memory` index
/// and refreshes its `item_count`/`built_at` metadata. Never rebuilt from
/// source — the memory index records decisions made during a session,
/// not facts the filesystem would re-derive.
pub async fn append_memory_items(store: &Store, new_items: Vec<EvidenceItem>) -> Result<usize, StorageError> {
    let mut items: Vec<EvidenceItem> = store.read_index_jsonl(INDEX_MEMORY).await?;
    let existing_ids: HashSet<String> = items.iter().map(|i| i.id.clone()).collect();
    for item in new_items {
        if !existing_ids.contains(&item.id) {
            items.push(item);
        }
    }
    store.write_index_jsonl(INDEX_MEMORY, &items).await?;
    let meta = EvidenceIndexMeta {
        index_name: INDEX_MEMORY.to_string(),
        built_at: Utc::now(),
        item_count: items.len(),
        source_mtime: Utc::now(),
        details: HashMap::new(),
    };
    store.write_index_meta(INDEX_MEMORY, &meta).await?;
    Ok(items.len())
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub queries: Vec<String>,
    pub limit: usize,
    pub seed_entities: Vec<String>,
    pub chapters: Option<Vec<ChapterId>>,
    pub include_text_chunks: bool,
    pub semantic_rerank: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            limit: 12,
            seed_entities: Vec::new(),
            chapters: None,
            include_text_chunks: true,
            semantic_rerank: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub total: usize,
    pub types: HashMap<String, usize>,
    pub queries: Vec<String>,
    pub hits: usize,
    pub top_sources: Vec<String>,
    pub rerank_query: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub items: Vec<EvidenceItem>,
    pub stats: SearchStats,
}

fn bonus_score(item: &EvidenceItem, query: &SearchQuery) -> f64 {
    let mut bonus = 0.0;
    let text_lower = item.text.to_lowercase();

    if query
        .queries
        .iter()
        .any(|q| !q.trim().is_empty() && text_lower.contains(&q.to_lowercase()))
    {
        bonus += 0.8;
    }

    let exact_seed_hit = query.seed_entities.iter().any(|seed| {
        item.entities
            .iter()
            .any(|entity| entity.eq_ignore_ascii_case(seed))
    });
    if exact_seed_hit {
        bonus += 1.0;
    } else if query
        .seed_entities
        .iter()
        .any(|seed| !seed.trim().is_empty() && text_lower.contains(&seed.to_lowercase()))
    {
        bonus += 0.5;
    }

    if item.meta.stars >= 1 {
        bonus += (item.meta.stars - 1) as f64 * 0.35;
    }

    bonus
}

fn chapter_allowed(item: &EvidenceItem, chapters: &Option<Vec<ChapterId>>) -> bool {
    let Some(allowed) = chapters else { return true };
    let Some(chapter_str) = &item.source.chapter else { return true };
    let Ok(chapter) = ChapterId::parse(chapter_str) else { return true };
    allowed.contains(&chapter)
}

/// Runs the full search pipeline (spec §4.3 step 4-6): term union -> BM25
/// -> bonuses -> drop non-positive -> merge in text-chunk hits -> type
/// quotas -> `{items, stats}`.
pub async fn search(
    store: &Store,
    query: &SearchQuery,
    reranker: Option<&dyn SemanticReranker>,
) -> Result<SearchResult, StorageError> {
    let mut pool: Vec<EvidenceItem> = Vec::new();
    for index_name in [INDEX_FACTS, INDEX_SUMMARIES, INDEX_CARDS, INDEX_MEMORY] {
        let items: Vec<EvidenceItem> = store.read_index_jsonl(index_name).await?;
        pool.extend(items.into_iter().filter(|i| chapter_allowed(i, &query.chapters)));
    }

    let terms = query_terms(query.queries.iter().map(|q| q.as_str()));
    let n = pool.len();
    let avgdl = if n == 0 {
        1.0
    } else {
        pool.iter().map(|i| i.doc_len() as f64).sum::<f64>() / n as f64
    };
    let texts: Vec<&str> = pool.iter().map(|i| i.text.as_str()).collect();
    let df = bm25::document_frequencies(texts.iter().copied(), &terms);

    let mut scored: Vec<(EvidenceItem, f64)> = pool
        .into_iter()
        .map(|item| {
            let base = bm25::score(&item.text, &terms, &df, n, avgdl, item.doc_len(), Bm25Params::default());
            let bonus = bonus_score(&item, query);
            let total = base + bonus;
            (item, total)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();

    let mut rerank_query = None;
    if query.include_text_chunks {
        let text_chunk_items: Vec<EvidenceItem> = store.read_index_jsonl(INDEX_TEXT_CHUNKS).await?;
        let text_chunk_items: Vec<EvidenceItem> = text_chunk_items
            .into_iter()
            .filter(|i| chapter_allowed(i, &query.chapters))
            .collect();
        let joined_query = query.queries.join(" ");
        let tq = TextChunkQuery {
            queries: query.queries.clone(),
            limit: query.limit.max(8),
            chapters: query.chapters.clone(),
            exclude_chapters: Vec::new(),
            semantic_rerank: query.semantic_rerank,
            rerank_query: Some(joined_query.clone()),
            rerank_top_k: 6,
        };
        let chunk_hits = search_text_chunks(&text_chunk_items, &tq, reranker).await;
        if query.semantic_rerank && reranker.is_some() && !chunk_hits.is_empty() {
            rerank_query = Some(joined_query);
        }
        for (item, score) in chunk_hits {
            let bonus = bonus_score(&item, query);
            scored.push((item, score + bonus));
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let total = scored.len();

    let quotas = default_quotas();
    let selected = apply_type_quotas(&scored, &quotas, query.limit);

    let mut types: HashMap<String, usize> = HashMap::new();
    for item in &selected {
        *types.entry(item.kind.as_str().to_string()).or_insert(0) += 1;
    }

    let mut source_counts: HashMap<String, usize> = HashMap::new();
    for item in &selected {
        let key = item
            .source
            .chapter
            .clone()
            .or_else(|| item.source.card.clone())
            .or_else(|| item.source.path.clone())
            .unwrap_or_else(|| "unknown".to_string());
        *source_counts.entry(key).or_insert(0) += 1;
    }
    let mut ranked_sources: Vec<(String, usize)> = source_counts.into_iter().collect();
    ranked_sources.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top_sources: Vec<String> = ranked_sources.into_iter().take(3).map(|(k, _)| k).collect();

    Ok(SearchResult {
        stats: SearchStats {
            total,
            types,
            queries: query.queries.clone(),
            hits: selected.len(),
            top_sources,
            rerank_query,
        },
        items: selected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wenshape_protocol::{ChapterKind, Fact, ProjectId};

    fn store(dir: &tempfile::TempDir) -> Store {
        Store::new(dir.path(), ProjectId::new("demo").unwrap())
    }

    #[tokio::test]
    async fn build_facts_index_is_skipped_when_fresh() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        store
            .append_fact(&Fact {
                id: "F0000".into(),
                statement: "Alice carries a silver blade".into(),
                source: chapter,
                introduced_in: chapter,
                confidence: 0.9,
                title: None,
                summary_ref: None,
            })
            .await
            .unwrap();

        let first = build_facts_index(&store, false).await.unwrap();
        assert_eq!(first, 1);
        // Second call with force=false should read the cached count, not
        // rebuild and drift.
        let second = build_facts_index(&store, false).await.unwrap();
        assert_eq!(second, 1);
    }

    #[tokio::test]
    async fn search_applies_quotas_and_reports_stats() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        for i in 0..5 {
            store
                .append_fact(&Fact {
                    id: format!("F{i:04}"),
                    statement: format!("The dragon guards treasure chamber number {i}"),
                    source: chapter,
                    introduced_in: chapter,
                    confidence: 0.9,
                    title: None,
                    summary_ref: None,
                })
                .await
                .unwrap();
        }
        build_facts_index(&store, true).await.unwrap();

        let query = SearchQuery {
            queries: vec!["dragon treasure".to_string()],
            limit: 4,
            include_text_chunks: false,
            ..Default::default()
        };
        let result = search(&store, &query, None).await.unwrap();
        assert!(!result.items.is_empty());
        assert_eq!(result.stats.hits, result.items.len());
        assert!(result.stats.types.contains_key("fact"));
    }

    #[tokio::test]
    async fn append_memory_items_dedupes_by_id() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let item = EvidenceItem {
            id: "memory:m1".into(),
            kind: EvidenceType::Memory,
            text: "The council voted to exile the mage.".into(),
            source: Default::default(),
            scope: wenshape_protocol::evidence::EvidenceScope::Global,
            entities: Vec::new(),
            meta: Default::default(),
        };
        let first = append_memory_items(&store, vec![item.clone()]).await.unwrap();
        let second = append_memory_items(&store, vec![item]).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 1);
    }

    #[test]
    fn quotas_respect_minimums_before_filling() {
        let quotas = default_quotas();
        let mk = |id: &str, kind: EvidenceType, score: f64| {
            (
                EvidenceItem {
                    id: id.to_string(),
                    kind,
                    text: String::new(),
                    source: Default::default(),
                    scope: wenshape_protocol::evidence::EvidenceScope::Global,
                    entities: Vec::new(),
                    meta: Default::default(),
                },
                score,
            )
        };
        let ranked = vec![
            mk("c1", EvidenceType::Character, 5.0),
            mk("c2", EvidenceType::Character, 4.0),
            mk("r1", EvidenceType::WorldRule, 1.0),
            mk("r2", EvidenceType::WorldRule, 0.9),
        ];
        let selected = apply_type_quotas(&ranked, &quotas, 3);
        assert!(selected.iter().any(|i| i.kind == EvidenceType::WorldRule));
    }
}
