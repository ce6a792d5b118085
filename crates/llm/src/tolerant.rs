//! Tolerant parsing of LLM output (Design Notes §9): agents ask for YAML
//! (cards, summaries) or JSON (fact/timeline extraction) but backends
//! routinely wrap the answer in prose or a markdown fence. This mirrors the
//! fence-then-depth-aware-region cascade the editor/extractor agents need,
//! scaled down to the two formats this workspace actually round-trips.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TolerantParseError {
    #[error("no {format} content found in {len} bytes of model output")]
    NotFound { format: &'static str, len: usize },
    #[error("extracted {format} failed to parse: {source}")]
    Malformed {
        format: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Parses `text` as YAML, trying a direct parse first and falling back to
/// the content of a ` ```yaml ` / ` ```yml ` fence if the raw text carries
/// surrounding prose.
pub fn parse_yaml<T: DeserializeOwned>(text: &str) -> Result<T, TolerantParseError> {
    if let Ok(value) = serde_yaml::from_str(text) {
        return Ok(value);
    }
    let candidate = extract_fence(text, &["yaml", "yml"])
        .ok_or(TolerantParseError::NotFound { format: "yaml", len: text.len() })?;
    serde_yaml::from_str(&candidate)
        .map_err(|e| TolerantParseError::Malformed { format: "yaml", source: Box::new(e) })
}

/// Parses `text` as JSON, trying a direct parse, then a ` ```json ` fence,
/// then the outermost `{...}` or `[...]` region (brace/bracket depth
/// tracking that respects string literals, so braces inside quoted prose
/// don't throw off the match).
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, TolerantParseError> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }
    if let Some(candidate) = extract_fence(text, &["json"]) {
        if let Ok(value) = serde_json::from_str(&candidate) {
            return Ok(value);
        }
    }
    let region = extract_balanced_region(text)
        .ok_or(TolerantParseError::NotFound { format: "json", len: text.len() })?;
    serde_json::from_str(&region)
        .map_err(|e| TolerantParseError::Malformed { format: "json", source: Box::new(e) })
}

/// Returns the content of the last fence whose language tag matches one of
/// `languages` (case-insensitive). LLMs sometimes show a schema example
/// fence before the real answer; the last fence is the one most likely to
/// be the actual response.
fn extract_fence(text: &str, languages: &[&str]) -> Option<String> {
    let mut found: Option<String> = None;
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        let Some(tag) = trimmed.strip_prefix("```") else { continue };
        let tag = tag.trim().to_lowercase();
        if !languages.iter().any(|lang| tag == *lang) {
            continue;
        }
        let mut body = Vec::new();
        for inner in lines.by_ref() {
            if inner.trim() == "```" {
                break;
            }
            body.push(inner);
        }
        found = Some(body.join("\n"));
    }
    found
}

/// Finds the first `{` or `[` and returns the text up to its matching
/// close, tracking nesting depth and skipping delimiters inside string
/// literals.
fn extract_balanced_region(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let open = text.as_bytes()[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (offset, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            c if !in_string && c == open => depth += 1,
            c if !in_string && c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Note {
        title: String,
        tags: Vec<String>,
    }

    #[test]
    fn parses_clean_yaml_directly() {
        let text = "title: Dawn\ntags: [a, b]\n";
        let note: Note = parse_yaml(text).unwrap();
        assert_eq!(note.title, "Dawn");
    }

    #[test]
    fn parses_yaml_from_fence_with_surrounding_prose() {
        let text = "Sure, here you go:\n```yaml\ntitle: Dawn\ntags: [a, b]\n```\nLet me know if you need edits.";
        let note: Note = parse_yaml(text).unwrap();
        assert_eq!(note.tags, vec!["a", "b"]);
    }

    #[test]
    fn parses_json_from_depth_aware_region_when_unfenced() {
        let text = "Here is the extracted fact:\n{\"title\": \"Dawn\", \"tags\": [\"a\", \"b\"]}\nHope that helps.";
        let note: Note = parse_json(text).unwrap();
        assert_eq!(note.title, "Dawn");
    }

    #[test]
    fn balanced_region_ignores_braces_inside_strings() {
        let text = r#"noise {"title": "a {weird} brace", "tags": []} trailing"#;
        let region = extract_balanced_region(text).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&region).unwrap();
        assert_eq!(parsed["title"], "a {weird} brace");
    }

    #[test]
    fn missing_content_reports_not_found() {
        let err = parse_yaml::<Note>("just some prose, no structure here").unwrap_err();
        assert!(matches!(err, TolerantParseError::NotFound { format: "yaml", .. }));
    }
}
