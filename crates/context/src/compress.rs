//! Compression strategies (spec §4.6.3): rule-based line truncation,
//! LLM-backed summarization with a rule-based fallback, and the
//! "smart" sentence-scoring compressor used by the degradation guard's
//! auto-fix path.

use std::collections::HashSet;

use wenshape_evidence::tokenize::query_terms;

const RULE_MAX_LINE_CHARS: usize = 200;
const RULE_MIN_LINES: usize = 3;

/// Drops blank lines, hard-truncates long lines to
/// [`RULE_MAX_LINE_CHARS`] with an ellipsis, and keeps the first
/// `ceil(N*ratio)` lines (floor of [`RULE_MIN_LINES`]).
pub fn rule_based_compress(text: &str, ratio: f64) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let keep = ((lines.len() as f64 * ratio).ceil() as usize).max(RULE_MIN_LINES).min(lines.len());
    lines
        .into_iter()
        .take(keep)
        .map(truncate_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_line(line: &str) -> String {
    let char_count = line.chars().count();
    if char_count <= RULE_MAX_LINE_CHARS {
        return line.to_string();
    }
    let truncated: String = line.chars().take(RULE_MAX_LINE_CHARS).collect();
    format!("{truncated}...")
}

/// What kind of material is being compressed, so the LLM prompt (and the
/// rule-based fallback) preserve the right shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreserveType {
    Facts,
    Narrative,
    Mixed,
}

#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("llm compression gateway error: {0}")]
    Gateway(String),
}

/// The minimal seam `llm_compress` needs into an LLM: a compression
/// prompt in, compressed text out. Kept local (not `wenshape-llm`'s
/// `LLMGateway` trait directly) so this crate doesn't need to construct
/// a full `ChatRequest` just to summarize a string, mirroring
/// `wenshape-evidence::SemanticReranker`'s minimal-seam pattern.
#[async_trait::async_trait]
pub trait CompressionBackend: Send + Sync {
    async fn compress(&self, text: &str, target_tokens: usize, preserve: PreserveType) -> Result<String, CompressError>;
}

/// Sends `text` to `backend` asking for roughly `target_tokens`; on any
/// failure, falls back to [`rule_based_compress`] with
/// `ratio = target_tokens / current_tokens` (spec §4.6.3).
pub async fn llm_compress(
    backend: &dyn CompressionBackend,
    text: &str,
    target_tokens: usize,
    preserve: PreserveType,
) -> String {
    match backend.compress(text, target_tokens, preserve).await {
        Ok(compressed) => compressed,
        Err(e) => {
            tracing::warn!(error = %e, "llm_compress failed, falling back to rule-based compression");
            let current = crate::types::estimate_tokens(text).max(1);
            let ratio = (target_tokens as f64 / current as f64).clamp(0.05, 1.0);
            rule_based_compress(text, ratio)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompressionStats {
    pub original_sentences: usize,
    pub kept_sentences: usize,
    pub original_chars: usize,
    pub compressed_chars: usize,
}

/// Splits `text` into sentences on CJK/ASCII terminators (`。！？.!?`),
/// keeping the terminator attached to its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let bytes = text.as_bytes();
    let mut idx = 0usize;
    for ch in text.chars() {
        let ch_len = ch.len_utf8();
        if matches!(ch, '。' | '！' | '？' | '.' | '!' | '?') {
            let end = idx + ch_len;
            let candidate = &text[start..end];
            if !candidate.trim().is_empty() {
                sentences.push(candidate.trim());
            }
            start = end;
        }
        idx += ch_len;
    }
    if start < bytes.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
    }
    sentences
}

const KEYWORD_PATTERNS: &[&str] = &[
    "必须", "禁止", "不得", "决定", "死亡", "真相", "秘密", "because", "therefore", "decided", "must",
];

fn score_sentence(sentence: &str, query_terms: &HashSet<String>) -> f64 {
    let mut score = 0.0;
    let lower = sentence.to_lowercase();

    if KEYWORD_PATTERNS.iter().any(|p| lower.contains(p)) {
        score += 0.3;
    }
    if sentence.starts_with('\u{3000}') || sentence.starts_with("  ") || sentence.starts_with('\t') {
        score += 0.1;
    }
    let char_len = sentence.chars().count();
    if (20..=100).contains(&char_len) {
        score += 0.10;
    } else if char_len > 100 && char_len <= 200 {
        score += 0.05;
    }
    if sentence.chars().any(|c| c.is_ascii_digit()) {
        score += 0.1;
    }
    if sentence.contains('"') || sentence.contains('\u{201c}') || sentence.contains('\u{300c}') {
        score += 0.1;
    }

    if !query_terms.is_empty() {
        let sentence_terms: HashSet<String> = wenshape_evidence::tokenize::tokens(sentence).into_iter().collect();
        let overlap = query_terms.intersection(&sentence_terms).count();
        score += (overlap as f64 * 0.1).min(0.3);
    }

    score
}

/// Sentence-scoring compressor (spec §4.6.3): splits `content` into
/// sentences, scores each, and keeps a target-length budget split
/// 30% head / 40% middle (by score) / 30% tail, re-emitted in original
/// order with `\n[...]\n` markers between kept segments.
pub fn smart_compress(content: &str, target_ratio: f64, query: Option<&str>) -> (String, CompressionStats) {
    let sentences = split_sentences(content);
    let original_chars = content.chars().count();
    if sentences.is_empty() || target_ratio >= 1.0 {
        return (
            content.to_string(),
            CompressionStats {
                original_sentences: sentences.len(),
                kept_sentences: sentences.len(),
                original_chars,
                compressed_chars: original_chars,
            },
        );
    }

    let target_chars = ((original_chars as f64) * target_ratio.clamp(0.0, 1.0)) as usize;
    let head_budget = (target_chars as f64 * 0.30) as usize;
    let middle_budget = (target_chars as f64 * 0.40) as usize;
    let tail_budget = target_chars.saturating_sub(head_budget + middle_budget);

    let terms = query.map(|q| query_terms([q])).unwrap_or_default();

    let mut kept: HashSet<usize> = HashSet::new();

    let mut used = 0usize;
    let mut head_end = 0usize;
    for (i, s) in sentences.iter().enumerate() {
        let len = s.chars().count();
        if used + len > head_budget {
            break;
        }
        kept.insert(i);
        used += len;
        head_end = i + 1;
    }

    let mut used = 0usize;
    let mut tail_start = sentences.len();
    for (rev_i, s) in sentences.iter().enumerate().rev() {
        if rev_i < head_end {
            break;
        }
        let len = s.chars().count();
        if used + len > tail_budget {
            break;
        }
        kept.insert(rev_i);
        used += len;
        tail_start = rev_i;
    }

    let mut middle_candidates: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .filter(|(i, _)| *i >= head_end && *i < tail_start)
        .map(|(i, s)| (i, score_sentence(s, &terms)))
        .collect();
    middle_candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut middle_used = 0usize;
    for (i, _) in middle_candidates {
        let len = sentences[i].chars().count();
        if middle_used + len > middle_budget {
            continue;
        }
        kept.insert(i);
        middle_used += len;
    }

    let mut indices: Vec<usize> = kept.into_iter().collect();
    indices.sort_unstable();

    let mut out = String::new();
    let mut previous: Option<usize> = None;
    for i in &indices {
        if let Some(prev) = previous {
            if *i > prev + 1 {
                out.push_str("\n[...]\n");
            }
        } else if *i > 0 {
            out.push_str("\n[...]\n");
        }
        out.push_str(sentences[*i]);
        previous = Some(*i);
    }
    if let Some(prev) = previous {
        if prev + 1 < sentences.len() {
            out.push_str("\n[...]\n");
        }
    }

    let stats = CompressionStats {
        original_sentences: sentences.len(),
        kept_sentences: indices.len(),
        original_chars,
        compressed_chars: out.chars().count(),
    };
    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_based_compress_keeps_a_minimum_of_three_lines() {
        let text = "one\ntwo\n\nthree\nfour\nfive\nsix";
        let compressed = rule_based_compress(text, 0.1);
        assert_eq!(compressed.lines().count(), RULE_MIN_LINES);
    }

    #[test]
    fn rule_based_compress_truncates_long_lines() {
        let long_line = "a".repeat(300);
        let compressed = rule_based_compress(&long_line, 1.0);
        assert!(compressed.ends_with("..."));
        assert!(compressed.chars().count() <= RULE_MAX_LINE_CHARS + 3);
    }

    #[test]
    fn smart_compress_preserves_short_content_unchanged() {
        let (out, stats) = smart_compress("Short.", 0.9, None);
        assert_eq!(out, "Short.");
        assert_eq!(stats.kept_sentences, stats.original_sentences);
    }

    #[test]
    fn smart_compress_shrinks_long_content() {
        let mut content = String::new();
        for i in 0..40 {
            content.push_str(&format!("This is sentence number {i} in a long narrative passage. "));
        }
        let (out, stats) = smart_compress(&content, 0.3, None);
        assert!(stats.compressed_chars < stats.original_chars);
        assert!(out.contains("[...]"));
    }

    #[test]
    fn smart_compress_biases_toward_query_terms() {
        let content = "Alice walked through the market. \
            A dragon appeared near the old tower. \
            Bob bought bread for dinner. \
            The dragon breathed fire over the tower walls. \
            Carol sold flowers by the fountain.";
        let (out, _) = smart_compress(content, 0.4, Some("dragon tower"));
        assert!(out.contains("dragon"));
    }
}
