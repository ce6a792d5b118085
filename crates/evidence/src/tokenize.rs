//! Tokenization for BM25 (spec §4.3 step 1).
//!
//! ASCII runs become lowercase words; CJK runs are split into overlapping
//! 2-grams and 3-grams, since CJK text carries no whitespace word
//! boundaries a plain ASCII tokenizer could use.

use std::collections::HashSet;

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7A3}'
    )
}

/// Every token occurrence in `text`, duplicates preserved — used wherever
/// term frequency matters (document indexing, BM25 scoring).
pub fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut ascii_run = String::new();
    let mut cjk_run = String::new();

    let flush_ascii = |run: &mut String, out: &mut Vec<String>| {
        if !run.is_empty() {
            out.push(std::mem::take(run).to_lowercase());
        }
    };
    let flush_cjk = |run: &mut String, out: &mut Vec<String>| {
        let chars: Vec<char> = run.chars().collect();
        if chars.len() == 1 {
            out.push(chars[0].to_string());
        } else {
            for w in chars.windows(2) {
                out.push(w.iter().collect());
            }
            for w in chars.windows(3) {
                out.push(w.iter().collect());
            }
        }
        run.clear();
    };

    for c in text.chars() {
        if c.is_alphanumeric() && !is_cjk(c) {
            flush_cjk(&mut cjk_run, &mut out);
            ascii_run.push(c);
        } else if is_cjk(c) {
            flush_ascii(&mut ascii_run, &mut out);
            cjk_run.push(c);
        } else {
            flush_ascii(&mut ascii_run, &mut out);
            flush_cjk(&mut cjk_run, &mut out);
        }
    }
    flush_ascii(&mut ascii_run, &mut out);
    flush_cjk(&mut cjk_run, &mut out);
    out
}

/// Deduplicated term set from one or more queries (spec §4.3 step 1:
/// "union queries -> term set").
pub fn query_terms<'a>(queries: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    let mut set = HashSet::new();
    for q in queries {
        set.extend(tokens(q));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_words_are_lowercased() {
        assert_eq!(tokens("Hello World"), vec!["hello", "world"]);
    }

    #[test]
    fn cjk_run_produces_2_and_3_grams() {
        let toks = tokens("龙与地下城");
        assert!(toks.contains(&"龙与".to_string()));
        assert!(toks.contains(&"龙与地".to_string()));
        // 5 chars -> 4 bigrams + 3 trigrams, no lone single-char tokens.
        assert_eq!(toks.len(), 7);
    }

    #[test]
    fn mixed_text_tokenizes_both_scripts() {
        let toks = tokens("Alice去了城堡");
        assert!(toks.contains(&"alice".to_string()));
        assert!(toks.iter().any(|t| t.chars().all(is_cjk)));
    }

    #[test]
    fn query_terms_deduplicates_across_queries() {
        let set = query_terms(["hello world", "world peace"]);
        assert_eq!(set.len(), 3);
        assert!(set.contains("hello"));
        assert!(set.contains("world"));
        assert!(set.contains("peace"));
    }
}
