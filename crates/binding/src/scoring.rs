//! Mention scoring (spec §4.5 step 4): literal occurrence counting first,
//! BM25 best-chunk fallback when a candidate never appears literally, and
//! a seed bonus for names carried forward from recent chapters.

use std::collections::HashSet;

use wenshape_evidence::bm25::{document_frequencies, score as bm25_score, Bm25Params};
use wenshape_evidence::tokenize::{query_terms, tokens};

use crate::candidates::{EntityCandidate, RuleCandidate};
use crate::stopwords::is_generic_name;

const SNIPPET_RADIUS: usize = 12;
const MAX_EXAMPLES: usize = 2;
const SEED_BONUS: f64 = 0.8;

pub struct ScoredEntity {
    pub name: String,
    pub score: f64,
    pub count: u32,
    pub matched_aliases: Vec<String>,
    pub examples: Vec<String>,
}

pub struct ScoredRule {
    pub rule_id: String,
    pub text: String,
    pub score: f64,
    pub examples: Vec<String>,
}

struct Occurrence {
    count: usize,
    snippets: Vec<String>,
}

/// Counts (case-insensitive, char-safe) occurrences of `needle` in
/// `haystack`, capturing up to [`MAX_EXAMPLES`] snippets with
/// [`SNIPPET_RADIUS`] characters of context on each side.
fn count_occurrences(haystack: &str, needle: &str) -> Occurrence {
    if needle.trim().is_empty() {
        return Occurrence { count: 0, snippets: Vec::new() };
    }
    let hay_chars: Vec<char> = haystack.chars().collect();
    let hay_lower: Vec<char> = haystack.to_lowercase().chars().collect();
    let needle_lower: Vec<char> = needle.to_lowercase().chars().collect();
    let needle_len = needle_lower.len();

    let mut count = 0;
    let mut snippets = Vec::new();
    let mut start = 0;
    while start + needle_len <= hay_lower.len() {
        if hay_lower[start..start + needle_len] == needle_lower[..] {
            count += 1;
            if snippets.len() < MAX_EXAMPLES {
                let from = start.saturating_sub(SNIPPET_RADIUS);
                let to = (start + needle_len + SNIPPET_RADIUS).min(hay_chars.len());
                snippets.push(hay_chars[from..to].iter().collect());
            }
            start += needle_len.max(1);
        } else {
            start += 1;
        }
    }
    Occurrence { count, snippets }
}

/// `len<=2 -> 1, len<=4 -> 2, else 3`, where `len` is the candidate's own
/// tokenized term count.
fn min_term_hits(term_count: usize) -> usize {
    match term_count {
        0..=2 => 1,
        3..=4 => 2,
        _ => 3,
    }
}

/// Rule overlap needs a higher floor than an entity name: 2 terms up to a
/// short rule, 3 for longer ones.
fn min_rule_overlap(term_count: usize) -> usize {
    match term_count {
        0..=4 => 2,
        _ => 3,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

struct BestChunk {
    score: f64,
    term_hits: usize,
}

/// BM25-scores `terms` against every chunk, treating the chunk set as its
/// own tiny corpus (document frequency and average length both computed
/// over `chunks`), and returns the single best-scoring chunk.
fn best_chunk_bm25(terms: &HashSet<String>, chunks: &[String]) -> Option<BestChunk> {
    if terms.is_empty() || chunks.is_empty() {
        return None;
    }
    let df = document_frequencies(chunks.iter().map(|c| c.as_str()), terms);
    let avgdl = chunks.iter().map(|c| tokens(c).len()).sum::<usize>() as f64 / chunks.len() as f64;
    if avgdl <= 0.0 {
        return None;
    }
    chunks
        .iter()
        .map(|chunk| {
            let doc_tokens: HashSet<String> = tokens(chunk).into_iter().collect();
            let term_hits = terms.iter().filter(|t| doc_tokens.contains(t.as_str())).count();
            let doc_len = tokens(chunk).len();
            let score = bm25_score(chunk, terms, &df, chunks.len(), avgdl, doc_len, Bm25Params::default());
            BestChunk { score, term_hits }
        })
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
}

/// Scores one character/world-entity candidate against the full chapter
/// text. Returns `None` when the candidate never appears literally and
/// its BM25 fallback doesn't clear the threshold (spec §4.5 step 4).
pub fn score_entity(candidate: &EntityCandidate, full_text: &str, chunks: &[String], seeds: &HashSet<String>) -> Option<ScoredEntity> {
    let mut names = vec![candidate.name.clone()];
    names.extend(candidate.aliases.clone());

    let mut total_count = 0usize;
    let mut matched_aliases = Vec::new();
    let mut examples = Vec::new();
    for alias in &names {
        let occurrence = count_occurrences(full_text, alias);
        if occurrence.count > 0 {
            total_count += occurrence.count;
            matched_aliases.push(alias.clone());
            examples.extend(occurrence.snippets);
        }
    }
    examples.truncate(MAX_EXAMPLES);

    let mut score = if total_count > 0 {
        2.0 * total_count as f64
    } else {
        let terms = query_terms([candidate.name.as_str()]);
        let required_hits = min_term_hits(tokens(&candidate.name).len());
        let threshold = if is_generic_name(&candidate.name) { 1.4 } else { 0.9 };
        let best = best_chunk_bm25(&terms, chunks)?;
        if best.term_hits < required_hits || best.score < threshold {
            return None;
        }
        best.score
    };

    if seeds.contains(&candidate.name) {
        score += SEED_BONUS;
    }

    Some(ScoredEntity { name: candidate.name.clone(), score, count: total_count as u32, matched_aliases, examples })
}

/// Scores one world-rule candidate: requires a bigger term overlap than an
/// entity candidate, a BM25 floor of `1.0`, and adds the seed-independent
/// `0.8` substring bonus when the rule's own text appears verbatim.
pub fn score_rule(candidate: &RuleCandidate, full_text: &str, chunks: &[String]) -> Option<ScoredRule> {
    let terms = query_terms([candidate.text.as_str()]);
    let required_overlap = min_rule_overlap(tokens(&candidate.text).len());
    let best = best_chunk_bm25(&terms, chunks)?;
    if best.term_hits < required_overlap || best.score < 1.0 {
        return None;
    }

    let mut score = best.score;
    let mut examples = Vec::new();
    let occurrence = count_occurrences(full_text, &candidate.text);
    if occurrence.count > 0 {
        score += SEED_BONUS;
        examples = occurrence.snippets;
    }
    if examples.is_empty() {
        if let Some(best_chunk) = chunks
            .iter()
            .max_by(|a, b| {
                let ta: HashSet<String> = tokens(a).into_iter().collect();
                let tb: HashSet<String> = tokens(b).into_iter().collect();
                let oa = terms.iter().filter(|t| ta.contains(t.as_str())).count();
                let ob = terms.iter().filter(|t| tb.contains(t.as_str())).count();
                oa.cmp(&ob)
            })
        {
            examples.push(truncate_chars(best_chunk, 160));
        }
    }

    Some(ScoredRule { rule_id: candidate.rule_id.clone(), text: candidate.text.clone(), score, examples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::{EntityCandidate, RuleCandidate};

    #[test]
    fn literal_occurrences_drive_count_score() {
        let candidate = EntityCandidate { name: "Alice".into(), aliases: vec![] };
        let text = "Alice walked in. Alice smiled.";
        let scored = score_entity(&candidate, text, &[], &HashSet::new()).unwrap();
        assert_eq!(scored.count, 2);
        assert_eq!(scored.score, 4.0);
        assert_eq!(scored.examples.len(), 2);
    }

    #[test]
    fn absent_candidate_without_bm25_support_is_dropped() {
        let candidate = EntityCandidate { name: "Ghostwalker".into(), aliases: vec![] };
        let scored = score_entity(&candidate, "Nothing relevant here.", &[], &HashSet::new());
        assert!(scored.is_none());
    }

    #[test]
    fn seed_bonus_is_added_when_name_is_a_seed() {
        let candidate = EntityCandidate { name: "Alice".into(), aliases: vec![] };
        let mut seeds = HashSet::new();
        seeds.insert("Alice".to_string());
        let scored = score_entity(&candidate, "Alice spoke once.", &[], &seeds).unwrap();
        assert_eq!(scored.score, 2.0 + 0.8);
    }

    #[test]
    fn bm25_fallback_recovers_paraphrased_mentions() {
        let candidate = EntityCandidate { name: "dragon lord".into(), aliases: vec![] };
        let chunks = vec![
            "the dragon lord descended upon the castle".to_string(),
            "a quiet village morning".to_string(),
        ];
        let scored = score_entity(&candidate, "not literally present", &chunks, &HashSet::new());
        assert!(scored.is_some());
    }

    #[test]
    fn rule_requires_higher_overlap_than_entity() {
        let candidate = RuleCandidate { rule_id: "world_rule:law:0".into(), text: "magic users must wear a badge".into() };
        let chunks = vec!["every magic user must wear a badge in the capital".to_string()];
        let scored = score_rule(&candidate, "no literal match here", &chunks);
        assert!(scored.is_some());
    }
}
