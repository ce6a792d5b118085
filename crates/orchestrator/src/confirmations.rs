//! Pending-confirmation extraction (spec §4.9 "Persistence on streaming
//! end"): the writer marks open questions inline as `[待确认：...]`; this
//! pulls them out, merges them with unresolved research gaps and
//! missing-card entities, dedups, and caps the result.

const CONFIRMATION_MARKER: &str = "待确认：";
const CONFIRMATION_CLOSE: char = ']';
const CONFIRMATIONS_CAP: usize = 12;

/// Extracts `[待确认：...]` markers the writer leaves inline in draft text.
pub fn extract_confirmations(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(CONFIRMATION_MARKER) {
        let after_marker = &rest[start + CONFIRMATION_MARKER.len()..];
        let Some(end) = after_marker.find(CONFIRMATION_CLOSE) else { break };
        out.push(after_marker[..end].trim().to_string());
        rest = &after_marker[end + 1..];
    }
    out
}

/// Merges writer-marked confirmations with unresolved gaps and missing
/// card entities, deduplicated and capped at [`CONFIRMATIONS_CAP`].
pub fn collect_pending_confirmations(draft_text: &str, unresolved_gaps: &[String], missing_entities: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in extract_confirmations(draft_text).into_iter().chain(unresolved_gaps.iter().cloned()).chain(missing_entities.iter().cloned()) {
        if item.trim().is_empty() {
            continue;
        }
        if seen.insert(item.clone()) {
            out.push(item);
        }
        if out.len() >= CONFIRMATIONS_CAP {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bracketed_confirmation_markers() {
        let text = "Alice walked in. [待确认：她的年龄] Then she sat down. [待确认：酒馆名字]";
        let confirmations = extract_confirmations(text);
        assert_eq!(confirmations, vec!["她的年龄".to_string(), "酒馆名字".to_string()]);
    }

    #[test]
    fn collect_dedups_and_caps() {
        let gaps = vec!["gap1".to_string(), "gap1".to_string()];
        let missing = vec!["Bob".to_string()];
        let collected = collect_pending_confirmations("no markers here", &gaps, &missing);
        assert_eq!(collected, vec!["gap1".to_string(), "Bob".to_string()]);
    }
}
