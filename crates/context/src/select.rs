//! Deterministic and retrieval-based item selection (spec §4.6.2).

use std::collections::HashSet;

use wenshape_evidence::bm25::{document_frequencies, score as bm25_score, Bm25Params};
use wenshape_evidence::tokenize::{query_terms, tokens};
use wenshape_protocol::error::StorageError;
use wenshape_protocol::evidence::{EvidenceItem, EvidenceType};
use wenshape_protocol::AgentKind;
use wenshape_storage::Store;

use crate::types::{ContextItem, ContextItemKind, Priority};

const MAX_CANDIDATES_PER_TYPE: usize = 50;
const OVERLAP_WEIGHT: f64 = 0.35;
const BM25_WEIGHT: f64 = 0.65;

/// Which index to read candidates from for a requested retrieval type.
fn index_name_for(evidence_type: EvidenceType) -> &'static str {
    match evidence_type {
        EvidenceType::Character | EvidenceType::WorldEntity | EvidenceType::WorldRule | EvidenceType::Style => "cards",
        EvidenceType::Fact => "facts",
        EvidenceType::TextChunk => "text_chunks",
        EvidenceType::Summary => "summaries",
        EvidenceType::Memory => "memory",
    }
}

fn context_kind_for(evidence_type: EvidenceType) -> ContextItemKind {
    match evidence_type {
        EvidenceType::Character => ContextItemKind::Character,
        EvidenceType::WorldEntity | EvidenceType::WorldRule => ContextItemKind::World,
        EvidenceType::Style => ContextItemKind::StyleCard,
        EvidenceType::Fact => ContextItemKind::Fact,
        EvidenceType::TextChunk => ContextItemKind::TextChunk,
        EvidenceType::Summary => ContextItemKind::Summary,
        EvidenceType::Memory => ContextItemKind::Memory,
    }
}

/// Agent-specific always-load set (spec §4.6.2): archivist wants only the
/// style card, writer wants style + scene brief, editor wants only the
/// style card. Missing items are silently skipped (logged), never an
/// error — a project without a style card yet shouldn't block assembly.
pub async fn deterministic_select(
    store: &Store,
    agent: AgentKind,
    chapter: &wenshape_protocol::ChapterId,
) -> Result<Vec<ContextItem>, StorageError> {
    let mut items = Vec::new();

    if let Some(style) = store.read_style_card().await? {
        items.push(
            ContextItem::new("style_card", ContextItemKind::StyleCard, style.style, Priority::Critical)
                .with_relevance(1.0),
        );
    } else {
        tracing::debug!("no style card on disk, skipping deterministic style_card load");
    }

    if matches!(agent, AgentKind::Writer) {
        match store.read_scene_brief(chapter).await? {
            Some(brief) => {
                let content = serde_json::to_string_pretty(&brief).unwrap_or_default();
                items.push(
                    ContextItem::new(
                        format!("scene_brief:{chapter}"),
                        ContextItemKind::SceneBrief,
                        content,
                        Priority::Critical,
                    )
                    .with_relevance(1.0),
                );
            }
            None => tracing::debug!(%chapter, "no scene brief on disk, skipping deterministic load"),
        }
    }

    Ok(items)
}

/// `0.35 * lexical_overlap + 0.65 * bm25`, a deliberately local hybrid:
/// document frequency and average length are computed over the
/// candidate pool itself rather than a persistent corpus-wide index.
fn hybrid_score(query_terms: &HashSet<String>, text: &str, df: &std::collections::HashMap<String, usize>, n: usize, avgdl: f64) -> f64 {
    let doc_tokens: HashSet<String> = tokens(text).into_iter().collect();
    let overlap = if query_terms.is_empty() {
        0.0
    } else {
        query_terms.iter().filter(|t| doc_tokens.contains(t.as_str())).count() as f64 / query_terms.len() as f64
    };
    let doc_len = tokens(text).len();
    let bm25 = bm25_score(text, query_terms, df, n, avgdl, doc_len, Bm25Params::default());
    OVERLAP_WEIGHT * overlap + BM25_WEIGHT * bm25
}

/// Quick, local-only retrieval (spec §4.6.2): loads up to
/// [`MAX_CANDIDATES_PER_TYPE`] items per requested type, scores each with
/// [`hybrid_score`], drops non-positive scores, and returns the global
/// top `top_k`. Used when the full evidence indexer search isn't wanted
/// (e.g. a quick pass inside context assembly).
pub async fn retrieval_select(
    store: &Store,
    query: &str,
    types: &[EvidenceType],
    top_k: usize,
) -> Result<Vec<ContextItem>, StorageError> {
    let terms = query_terms([query]);
    let mut scored: Vec<(EvidenceItem, f64)> = Vec::new();

    let mut seen_indexes: HashSet<&'static str> = HashSet::new();
    for &evidence_type in types {
        let index_name = index_name_for(evidence_type);
        if !seen_indexes.insert(index_name) {
            continue;
        }
        let all: Vec<EvidenceItem> = store.read_index_jsonl(index_name).await?;
        let candidates: Vec<EvidenceItem> = all.into_iter().filter(|i| i.kind == evidence_type).take(MAX_CANDIDATES_PER_TYPE).collect();
        if candidates.is_empty() {
            continue;
        }
        let texts: Vec<&str> = candidates.iter().map(|i| i.text.as_str()).collect();
        let df = document_frequencies(texts.iter().copied(), &terms);
        let n = candidates.len();
        let avgdl = candidates.iter().map(|i| tokens(&i.text).len()).sum::<usize>() as f64 / n as f64;

        for item in candidates {
            let score = hybrid_score(&terms, &item.text, &df, n, avgdl.max(1.0));
            if score > 0.0 {
                scored.push((item, score));
            }
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);

    Ok(scored
        .into_iter()
        .map(|(item, score)| {
            let kind = context_kind_for(item.kind);
            ContextItem::new(item.id.clone(), kind, item.text.clone(), Priority::Medium).with_relevance(score.clamp(0.0, 1.0))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::{ChapterId, ChapterKind, ProjectId};
    use wenshape_storage::Store;

    fn test_store(root: &std::path::Path) -> Store {
        Store::new(root, ProjectId::new("proj").unwrap())
    }

    #[tokio::test]
    async fn deterministic_select_skips_missing_style_card_without_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let items = deterministic_select(&store, AgentKind::Archivist, &chapter).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn retrieval_select_returns_empty_when_index_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let items = retrieval_select(&store, "dragon", &[EvidenceType::Fact], 5).await.unwrap();
        assert!(items.is_empty());
    }
}
