//! Text-chunk indexer (spec §4.4): paragraph/sliding-window chunking of
//! the latest draft per chapter, plus BM25 multi-query search with an
//! optional LLM semantic re-rank pass.

use std::collections::HashMap;

use async_trait::async_trait;
use wenshape_protocol::evidence::{EvidenceItem, EvidenceMeta, EvidenceScope, EvidenceSource, EvidenceType};
use wenshape_protocol::ChapterId;

use crate::bm25::{self, Bm25Params};
use crate::tokenize::query_terms;

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub max_paragraph_chars: usize,
    pub window_size: usize,
    pub window_overlap: usize,
    pub min_chunk_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_paragraph_chars: 800,
            window_size: 520,
            window_overlap: 160,
            min_chunk_chars: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub paragraph: usize,
    pub window: usize,
    pub start: usize,
    pub end: usize,
}

/// Splits `text` into paragraph- or sliding-window-sized chunks per spec
/// §4.4. Offsets are in characters (not bytes), matching the unit the
/// spec's window sizes are expressed in.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut chunks = Vec::new();
    for (paragraph_idx, para) in split_paragraphs(&normalized).into_iter().enumerate() {
        let char_len = para.chars().count();
        if char_len <= config.max_paragraph_chars {
            if char_len >= config.min_chunk_chars {
                chunks.push(Chunk {
                    text: para.to_string(),
                    paragraph: paragraph_idx,
                    window: 0,
                    start: 0,
                    end: char_len,
                });
            }
        } else {
            for (window_idx, (wtext, start, end)) in
                sliding_windows(para, config.window_size, config.window_overlap)
                    .into_iter()
                    .enumerate()
            {
                if wtext.chars().count() >= config.min_chunk_chars {
                    chunks.push(Chunk {
                        text: wtext,
                        paragraph: paragraph_idx,
                        window: window_idx,
                        start,
                        end,
                    });
                }
            }
        }
    }
    chunks
}

/// Splits on runs of two-or-more newlines, dropping blank paragraphs.
fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut pos = 0usize;
    let len = text.len();
    while pos < len {
        let rest = &text[pos..];
        match find_separator(rest) {
            Some(sep_start) => {
                let para = &rest[..sep_start];
                if !para.trim().is_empty() {
                    result.push(para);
                }
                let sep_bytes = rest[sep_start..].as_bytes();
                let mut sep_len = 0;
                while sep_len < sep_bytes.len() && sep_bytes[sep_len] == b'\n' {
                    sep_len += 1;
                }
                pos += sep_start + sep_len;
            }
            None => {
                if !rest.trim().is_empty() {
                    result.push(rest);
                }
                break;
            }
        }
    }
    result
}

fn find_separator(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] == b'\n' {
                j += 1;
            }
            if j - i >= 2 {
                return Some(i);
            }
            i = j;
        } else {
            i += 1;
        }
    }
    None
}

fn sliding_windows(para: &str, window_size: usize, overlap: usize) -> Vec<(String, usize, usize)> {
    let chars: Vec<char> = para.chars().collect();
    let step = window_size.saturating_sub(overlap).max(1);
    let mut result = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window_size).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        result.push((text, start, end));
        if end == chars.len() {
            break;
        }
        start += step;
    }
    result
}

/// Builds the `id`/`source` shape spec §4.4 requires for a single chunk
/// of a chapter's resolved draft.
pub fn chunk_to_evidence_item(
    chapter: &ChapterId,
    draft_label: &str,
    relative_path: &str,
    chunk: &Chunk,
) -> EvidenceItem {
    let doc_len = chunk.text.split_whitespace().count().max(1);
    EvidenceItem {
        id: format!("text:{}#p{}-w{}", chapter, chunk.paragraph, chunk.window),
        kind: EvidenceType::TextChunk,
        text: chunk.text.clone(),
        source: EvidenceSource {
            chapter: Some(chapter.to_string()),
            path: Some(format!("{relative_path}#{draft_label}")),
            paragraph: Some(chunk.paragraph),
            window: Some(chunk.window),
            ..Default::default()
        },
        scope: EvidenceScope::Chapter,
        entities: Vec::new(),
        meta: EvidenceMeta {
            doc_len,
            stars: 0,
            extra: HashMap::new(),
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RerankError {
    #[error("rerank gateway error: {0}")]
    Gateway(String),
    #[error("rerank response could not be parsed: {0}")]
    Parse(String),
}

/// The only seam this crate needs into an LLM: given a query and a small
/// `{id, text}` candidate list, return a relevance score per id. Kept
/// minimal and local so `wenshape-evidence` never depends on
/// `wenshape-llm` directly (spec §4.4's "writer-capable provider").
#[async_trait]
pub trait SemanticReranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[(String, String)]) -> Result<Vec<(String, f64)>, RerankError>;
}

#[derive(Debug, Clone)]
pub struct TextChunkQuery {
    pub queries: Vec<String>,
    pub limit: usize,
    pub chapters: Option<Vec<ChapterId>>,
    pub exclude_chapters: Vec<ChapterId>,
    pub semantic_rerank: bool,
    pub rerank_query: Option<String>,
    pub rerank_top_k: usize,
}

impl Default for TextChunkQuery {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            limit: 8,
            chapters: None,
            exclude_chapters: Vec::new(),
            semantic_rerank: false,
            rerank_query: None,
            rerank_top_k: 6,
        }
    }
}

/// BM25 multi-query search over a pre-built text-chunk index, with an
/// optional semantic re-rank pass (spec §4.4).
pub async fn search_text_chunks(
    items: &[EvidenceItem],
    query: &TextChunkQuery,
    reranker: Option<&dyn SemanticReranker>,
) -> Vec<(EvidenceItem, f64)> {
    let filtered: Vec<&EvidenceItem> = items
        .iter()
        .filter(|item| chapter_allowed(item, query))
        .collect();
    if filtered.is_empty() || query.queries.is_empty() {
        return Vec::new();
    }

    let per_query_limit = query.limit.clamp(4, 12);
    let n = filtered.len();
    let avgdl = if n == 0 {
        1.0
    } else {
        filtered.iter().map(|i| i.doc_len() as f64).sum::<f64>() / n as f64
    };

    let mut merged: HashMap<&str, f64> = HashMap::new();
    for raw_query in query.queries.iter().take(4) {
        let terms = query_terms([raw_query.as_str()]);
        if terms.is_empty() {
            continue;
        }
        let texts: Vec<&str> = filtered.iter().map(|i| i.text.as_str()).collect();
        let df = bm25::document_frequencies(texts.iter().copied(), &terms);
        let mut scored: Vec<(&str, f64)> = filtered
            .iter()
            .map(|item| {
                let s = bm25::score(&item.text, &terms, &df, n, avgdl, item.doc_len(), Bm25Params::default());
                (item.id.as_str(), s)
            })
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(per_query_limit);
        for (id, score) in scored {
            merged.entry(id).and_modify(|existing| *existing = existing.max(score)).or_insert(score);
        }
    }

    let mut ranked: Vec<(&EvidenceItem, f64)> = filtered
        .iter()
        .filter_map(|item| merged.get(item.id.as_str()).map(|s| (*item, *s)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if query.semantic_rerank {
        if let Some(reranker) = reranker {
            let top_k = query.rerank_top_k.max(3);
            let candidates: Vec<(String, String)> = ranked
                .iter()
                .take(top_k)
                .map(|(item, _)| (item.id.clone(), truncate_chars(&item.text, 220)))
                .collect();
            let rerank_query = query
                .rerank_query
                .clone()
                .unwrap_or_else(|| query.queries.join(" "));
            if let Ok(scores) = reranker.rerank(&rerank_query, &candidates).await {
                let score_map: HashMap<String, f64> = scores.into_iter().collect();
                let bm25_map: HashMap<&str, f64> = ranked.iter().map(|(i, s)| (i.id.as_str(), *s)).collect();
                let mut combined: Vec<(&EvidenceItem, f64)> = ranked
                    .iter()
                    .map(|(item, _)| {
                        let bm25_score = *bm25_map.get(item.id.as_str()).unwrap_or(&0.0);
                        let rerank_score = *score_map.get(item.id.as_str()).unwrap_or(&0.0);
                        (*item, bm25_score + rerank_score * 3.0)
                    })
                    .collect();
                combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                ranked = combined;
            }
            // On any reranker error, fall through and keep BM25 order.
        }
    }

    ranked.truncate(query.limit);
    ranked.into_iter().map(|(item, score)| (item.clone(), score)).collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn chapter_allowed(item: &EvidenceItem, query: &TextChunkQuery) -> bool {
    let Some(chapter_str) = &item.source.chapter else { return true };
    let Ok(chapter) = ChapterId::parse(chapter_str) else { return true };
    if query.exclude_chapters.contains(&chapter) {
        return false;
    }
    match &query.chapters {
        Some(allowed) => allowed.contains(&chapter),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_paragraph_becomes_single_chunk() {
        let text = "A short opening line.\n\nA second short paragraph.";
        let chunks = chunk_text(text, &ChunkConfig::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].paragraph, 0);
        assert_eq!(chunks[1].paragraph, 1);
    }

    #[test]
    fn long_paragraph_is_split_into_overlapping_windows() {
        let long_paragraph: String = "a".repeat(1200);
        let chunks = chunk_text(&long_paragraph, &ChunkConfig::default());
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].window, 0);
        assert_eq!(chunks[1].window, 1);
        assert!(chunks[1].start < chunks[0].end, "windows should overlap");
    }

    #[test]
    fn chunks_below_minimum_are_dropped() {
        let text = "hi\n\nok";
        let chunks = chunk_text(text, &ChunkConfig::default());
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn search_ranks_by_bm25_without_reranker() {
        let chapter = ChapterId::parse("V1C1").unwrap();
        let config = ChunkConfig::default();
        let text = "The dragon flew over the burning castle walls at dawn.";
        let chunks = chunk_text(text, &config);
        let items: Vec<EvidenceItem> = chunks
            .iter()
            .map(|c| chunk_to_evidence_item(&chapter, "final", "drafts/V1C1/final.md", c))
            .collect();

        let query = TextChunkQuery {
            queries: vec!["dragon castle".to_string()],
            limit: 5,
            ..Default::default()
        };
        let results = search_text_chunks(&items, &query, None).await;
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn search_respects_chapter_exclusion() {
        let c1 = ChapterId::parse("V1C1").unwrap();
        let c2 = ChapterId::parse("V1C2").unwrap();
        let config = ChunkConfig::default();
        let chunk = &chunk_text("A dragon soared above the misty valley floor.", &config)[0];
        let item_c1 = chunk_to_evidence_item(&c1, "final", "p1", chunk);
        let item_c2 = chunk_to_evidence_item(&c2, "final", "p2", chunk);

        let query = TextChunkQuery {
            queries: vec!["dragon".to_string()],
            exclude_chapters: vec![c1],
            ..Default::default()
        };
        let results = search_text_chunks(&[item_c1, item_c2], &query, None).await;
        assert!(results.iter().all(|(item, _)| item.source.chapter.as_deref() != Some("V1C1")));
    }
}
