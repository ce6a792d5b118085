//! BM25 scoring (spec §4.3 step 4): `k1=1.2, b=0.75`.

use std::collections::{HashMap, HashSet};

use crate::tokenize::tokens;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Document frequency of each query term across the filtered item set.
pub fn document_frequencies<'a>(
    docs: impl IntoIterator<Item = &'a str>,
    terms: &HashSet<String>,
) -> HashMap<String, usize> {
    let mut df: HashMap<String, usize> = terms.iter().map(|t| (t.clone(), 0)).collect();
    for doc in docs {
        let present: HashSet<String> = tokens(doc).into_iter().collect();
        for term in terms {
            if present.contains(term) {
                *df.get_mut(term).unwrap() += 1;
            }
        }
    }
    df
}

/// BM25 score of one document's text against a term set.
#[allow(clippy::too_many_arguments)]
pub fn score(
    doc_text: &str,
    terms: &HashSet<String>,
    df: &HashMap<String, usize>,
    n: usize,
    avgdl: f64,
    doc_len: usize,
    params: Bm25Params,
) -> f64 {
    if terms.is_empty() || n == 0 || avgdl <= 0.0 {
        return 0.0;
    }
    let doc_tokens = tokens(doc_text);
    let mut tf: HashMap<&str, usize> = HashMap::new();
    for t in &doc_tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }

    let mut total = 0.0;
    for term in terms {
        let freq = *tf.get(term.as_str()).unwrap_or(&0) as f64;
        if freq == 0.0 {
            continue;
        }
        let n_q = *df.get(term).unwrap_or(&0) as f64;
        // BM25 idf with the standard +1 smoothing so a term present in
        // every document still contributes a small positive weight.
        let idf = ((n as f64 - n_q + 0.5) / (n_q + 0.5) + 1.0).ln();
        let denom = freq + params.k1 * (1.0 - params.b + params.b * (doc_len as f64 / avgdl));
        total += idf * (freq * (params.k1 + 1.0)) / denom;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_zero_with_no_term_overlap() {
        let terms: HashSet<String> = ["dragon".to_string()].into_iter().collect();
        let df = document_frequencies(["the cat sat"], &terms);
        let s = score("the cat sat", &terms, &df, 1, 3.0, 3, Bm25Params::default());
        assert_eq!(s, 0.0);
    }

    #[test]
    fn scores_positive_with_term_overlap() {
        let docs = ["a dragon flew over the castle", "a cat slept"];
        let terms: HashSet<String> = ["dragon".to_string()].into_iter().collect();
        let df = document_frequencies(docs, &terms);
        let avgdl = 4.5;
        let s = score(docs[0], &terms, &df, docs.len(), avgdl, 6, Bm25Params::default());
        assert!(s > 0.0);
    }

    #[test]
    fn rarer_terms_score_higher() {
        let docs = ["dragon dragon dragon", "cat cat cat", "cat cat cat"];
        let common: HashSet<String> = ["cat".to_string()].into_iter().collect();
        let rare: HashSet<String> = ["dragon".to_string()].into_iter().collect();
        let df_common = document_frequencies(docs, &common);
        let df_rare = document_frequencies(docs, &rare);
        let common_score = score(docs[1], &common, &df_common, docs.len(), 3.0, 3, Bm25Params::default());
        let rare_score = score(docs[0], &rare, &df_rare, docs.len(), 3.0, 3, Bm25Params::default());
        assert!(rare_score > common_score);
    }
}
