//! Generic-term filtering and alias extraction (spec §4.5 step 3).

use regex_lite::Regex;

/// Names that look like entities but are too generic to bind on their own
/// (pronouns, bare category words). Mirrors the evidence crate's own
/// `GENERIC_TERMS` list but kept local: binding candidates come from cards
/// and from the evidence index, not just one source.
const GENERIC_TERMS: &[&str] = &[
    "the", "a", "an", "it", "he", "she", "they", "this", "that", "there", "here",
    "世界", "角色", "设定", "故事", "他", "她", "它", "他们", "她们", "这个", "那个",
];

/// `true` when `name` is long enough and specific enough to bind on.
pub fn is_bindable_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.chars().count() >= 2 && !GENERIC_TERMS.contains(&trimmed.to_lowercase().as_str())
}

/// A name is "generic" (spec §4.5 step 4's `1.4` threshold branch) when it
/// reads as an ordinary word rather than a proper noun: short, or entirely
/// lowercase ASCII with no punctuation that would mark it as a title.
pub fn is_generic_name(name: &str) -> bool {
    let trimmed = name.trim();
    let char_count = trimmed.chars().count();
    if char_count <= 2 {
        return true;
    }
    trimmed.chars().all(|c| c.is_ascii_lowercase() || c.is_whitespace())
}

fn parenthetical_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[(（]([^)）]+)[)）]").expect("static parenthetical pattern is valid"))
}

/// Splits `"Alice (the Bold)"` into `("Alice", ["the Bold"])`: the bare
/// name plus any aliases named parenthetically.
pub fn strip_parenthetical(name: &str) -> (String, Vec<String>) {
    let pattern = parenthetical_pattern();
    let mut aliases = Vec::new();
    for caps in pattern.captures_iter(name) {
        if let Some(inner) = caps.get(1) {
            let alias = inner.as_str().trim();
            if !alias.is_empty() {
                aliases.push(alias.to_string());
            }
        }
    }
    let bare = pattern.replace_all(name, "").trim().to_string();
    let bare = if bare.is_empty() { name.trim().to_string() } else { bare };
    (bare, aliases)
}

/// Builds the full alias set for a name plus its declared aliases:
/// the bare name, any parenthetical names folded out of it, and the
/// declared aliases themselves (each also parenthetical-split), deduped
/// and filtered to bindable names.
pub fn alias_set(name: &str, declared_aliases: &[String]) -> (String, Vec<String>) {
    let (bare, mut aliases) = strip_parenthetical(name);
    for declared in declared_aliases {
        let (declared_bare, declared_extra) = strip_parenthetical(declared);
        aliases.push(declared_bare);
        aliases.extend(declared_extra);
    }
    aliases.retain(|a| is_bindable_name(a) && a != &bare);
    let mut seen = std::collections::HashSet::new();
    aliases.retain(|a| seen.insert(a.clone()));
    (bare, aliases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_parenthetical_alias() {
        let (bare, aliases) = strip_parenthetical("Alice (the Bold)");
        assert_eq!(bare, "Alice");
        assert_eq!(aliases, vec!["the Bold"]);
    }

    #[test]
    fn name_without_parenthetical_is_unchanged() {
        let (bare, aliases) = strip_parenthetical("Bob");
        assert_eq!(bare, "Bob");
        assert!(aliases.is_empty());
    }

    #[test]
    fn generic_terms_are_rejected() {
        assert!(!is_bindable_name("it"));
        assert!(!is_bindable_name("世界"));
        assert!(is_bindable_name("Alice"));
    }

    #[test]
    fn single_char_names_are_rejected() {
        assert!(!is_bindable_name("A"));
    }

    #[test]
    fn alias_set_merges_declared_and_parenthetical() {
        let (bare, aliases) = alias_set("Alice (the Bold)", &["Al".to_string()]);
        assert_eq!(bare, "Alice");
        assert!(aliases.contains(&"the Bold".to_string()));
        assert!(aliases.contains(&"Al".to_string()));
    }

    #[test]
    fn short_lowercase_words_are_generic() {
        assert!(is_generic_name("of"));
        assert!(is_generic_name("the council"));
        assert!(!is_generic_name("Alice"));
    }
}
