//! Draft versions and version-string arithmetic (spec §3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;

/// `draft_<version>.md` version marker. `"current"` names the authoritative
/// `final.md`; otherwise `"v1"`, `"v2"`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftVersion(String);

impl DraftVersion {
    pub const CURRENT: &'static str = "current";

    pub fn v1() -> Self {
        Self("v1".to_string())
    }

    pub fn current() -> Self {
        Self(Self::CURRENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_current(&self) -> bool {
        self.0 == Self::CURRENT
    }

    /// `"v1" -> "v2" -> "v3" ...`. Non-numeric/"current" versions are left
    /// untouched (nothing to increment for the authoritative final).
    pub fn increment(&self) -> Self {
        if self.is_current() {
            return self.clone();
        }
        let n: u32 = self.0.strip_prefix('v').and_then(|s| s.parse().ok()).unwrap_or(1);
        Self(format!("v{}", n + 1))
    }
}

impl std::fmt::Display for DraftVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub chapter: ChapterId,
    pub version: DraftVersion,
    pub content: String,
    pub word_count: usize,
    #[serde(default)]
    pub pending_confirmations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(chapter: ChapterId, version: DraftVersion, content: String) -> Self {
        let word_count = content.split_whitespace().count();
        Self {
            chapter,
            version,
            content,
            word_count,
            pending_confirmations: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn increments_numeric_versions() {
        let v1 = DraftVersion::v1();
        let v2 = v1.increment();
        let v3 = v2.increment();
        assert_eq!(v2.as_str(), "v2");
        assert_eq!(v3.as_str(), "v3");
    }

    #[test]
    fn current_is_not_incremented() {
        let current = DraftVersion::current();
        assert_eq!(current.increment().as_str(), "current");
    }

    #[test]
    fn word_count_computed_on_construction() {
        let chapter = ChapterId::parse("V1C1").unwrap();
        let draft = Draft::new(chapter, DraftVersion::v1(), "one two three".to_string());
        assert_eq!(draft.word_count, 3);
    }
}
