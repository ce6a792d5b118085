//! Canonical chapter identifiers: `V<v>C<c>[E|I<seq>]`.
//!
//! A [`ChapterId`] is a type-safe wrapper, not a `String` — comparisons,
//! sorting, and distance all go through the typed fields so callers can't
//! accidentally compare two non-canonical spellings of the same chapter.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Whether a chapter id names a base chapter, an extra, or an interlude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChapterKind {
    Base,
    Extra,
    Interlude,
}

impl ChapterKind {
    fn suffix_letter(self) -> Option<char> {
        match self {
            ChapterKind::Base => None,
            ChapterKind::Extra => Some('E'),
            ChapterKind::Interlude => Some('I'),
        }
    }
}

/// A canonical chapter reference: `V<v>C<c>` optionally suffixed with
/// `E<seq>` (extra) or `I<seq>` (interlude).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChapterId {
    volume: u32,
    chapter: u32,
    kind: ChapterKind,
    seq: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChapterIdError {
    #[error("'{0}' is not a recognizable chapter id")]
    Unrecognized(String),
}

fn pattern() -> &'static Regex {
    // Matches, after lowercasing: optional "v"/"vol"/"volume"<n>, then
    // "c"/"ch"/"chapter"<n>, then optional "e"/"i"<n>.
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:v(?:ol(?:ume)?)?(\d+))?c(?:h(?:apter)?)?(\d+)(?:([ei])(\d+))?$")
            .expect("static chapter id pattern is valid")
    })
}

impl ChapterId {
    pub fn new(volume: u32, chapter: u32, kind: ChapterKind, seq: u32) -> Self {
        let (kind, seq) = if matches!(kind, ChapterKind::Base) {
            (ChapterKind::Base, 0)
        } else {
            (kind, seq)
        };
        Self {
            volume: volume.max(1),
            chapter,
            kind,
            seq,
        }
    }

    /// Tolerant parse: accepts `c5`, `ch5`, `C5`, `vol1c5`, `volume1c5`,
    /// `V1C5`, `V1C5E2`, case-insensitively. Volume defaults to 1 when the
    /// rest of the input parses successfully but no volume was given.
    pub fn parse(s: &str) -> Result<Self, ChapterIdError> {
        let lowered = s.trim().to_lowercase();
        let caps = pattern()
            .captures(&lowered)
            .ok_or_else(|| ChapterIdError::Unrecognized(s.to_string()))?;

        let volume: u32 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        let chapter: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| ChapterIdError::Unrecognized(s.to_string()))?;

        let (kind, seq) = match (caps.get(3), caps.get(4)) {
            (Some(letter), Some(n)) => {
                let seq: u32 = n.as_str().parse().unwrap_or(0);
                match letter.as_str() {
                    "e" => (ChapterKind::Extra, seq),
                    "i" => (ChapterKind::Interlude, seq),
                    // Unknown type code: treat as a base chapter (seq=0).
                    _ => (ChapterKind::Base, 0),
                }
            }
            _ => (ChapterKind::Base, 0),
        };

        Ok(Self::new(volume.max(1), chapter, kind, seq))
    }

    /// Canonical string form. `canonical(canonical(x)) == canonical(x)`.
    pub fn canonical(s: &str) -> Result<String, ChapterIdError> {
        Ok(Self::parse(s)?.to_string())
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    pub fn kind(&self) -> ChapterKind {
        self.kind
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// `v*1000 + c + 0.1*seq`.
    pub fn weight(&self) -> f64 {
        self.volume as f64 * 1000.0 + self.chapter as f64 + 0.1 * self.seq as f64
    }

    /// `"V<n>"` volume token for a parseable chapter id, or `None`.
    pub fn extract_volume(s: &str) -> Option<String> {
        Self::parse(s).ok().map(|id| format!("V{}", id.volume))
    }

    pub fn volume_token(&self) -> String {
        format!("V{}", self.volume)
    }

    /// Distance between two chapters. Same volume: `|ca-cb|`. Cross
    /// volume: `|va-vb|*avg_per_volume + min(ca,cb)`.
    pub fn distance(&self, other: &ChapterId, avg_per_volume: u32) -> u32 {
        if self.volume == other.volume {
            self.chapter.abs_diff(other.chapter)
        } else {
            self.volume.abs_diff(other.volume) * avg_per_volume + self.chapter.min(other.chapter)
        }
    }

    /// Sort a slice of ids by weight, tie-breaking on canonical string.
    pub fn sort(ids: &mut [ChapterId]) {
        ids.sort_by(|a, b| a.cmp(b));
    }
}

impl PartialOrd for ChapterId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight()
            .partial_cmp(&other.weight())
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}C{}", self.volume, self.chapter)?;
        if let Some(letter) = self.kind.suffix_letter() {
            write!(f, "{letter}{}", self.seq)?;
        }
        Ok(())
    }
}

impl FromStr for ChapterId {
    type Err = ChapterIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChapterId {
    type Error = ChapterIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChapterId> for String {
    fn from(value: ChapterId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_known_spellings() {
        for s in ["c5", "ch5", "C5", "vol1c5", "volume1c5", "V1C5", "V1C5E2"] {
            assert!(ChapterId::parse(s).is_ok(), "failed to parse {s}");
        }
    }

    #[test]
    fn rejects_garbage() {
        for s in ["", "hello", "V1", "xyz123", "V-1C5"] {
            assert!(ChapterId::parse(s).is_err(), "should reject {s}");
        }
    }

    #[test]
    fn implicit_volume_defaults_to_one() {
        let id = ChapterId::parse("c5").unwrap();
        assert_eq!(id.volume(), 1);
        assert_eq!(id.to_string(), "V1C5");
    }

    #[test]
    fn canonical_form_round_trips() {
        let id = ChapterId::parse("volume2ch7e3").unwrap();
        assert_eq!(id.to_string(), "V2C7E3");
        let again = ChapterId::parse(&id.to_string()).unwrap();
        assert_eq!(id, again);
    }

    #[test]
    fn unknown_type_code_is_base() {
        // 'x' is not 'e' or 'i'; the regex itself won't match a suffix
        // starting with 'x', so this degrades to a base chapter via the
        // plain "V1C5" prefix match.
        let id = ChapterId::parse("V1C5").unwrap();
        assert_eq!(id.kind(), ChapterKind::Base);
        assert_eq!(id.seq(), 0);
    }

    #[test]
    fn weight_ordering() {
        let a = ChapterId::parse("V1C5").unwrap();
        let b = ChapterId::parse("V1C10").unwrap();
        let c = ChapterId::parse("V2C1").unwrap();
        assert!(a.weight() < b.weight());
        assert!(b.weight() < c.weight());
    }

    #[test]
    fn sort_is_total_order_with_tiebreak() {
        let mut ids = vec![
            ChapterId::parse("V1C5").unwrap(),
            ChapterId::parse("V1C1").unwrap(),
            ChapterId::parse("V2C1").unwrap(),
            ChapterId::parse("V1C5E1").unwrap(),
        ];
        ChapterId::sort(&mut ids);
        let rendered: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(rendered, vec!["V1C1", "V1C5", "V1C5E1", "V2C1"]);
    }

    #[test]
    fn distance_same_volume() {
        let a = ChapterId::parse("V1C10").unwrap();
        let b = ChapterId::parse("V1C3").unwrap();
        assert_eq!(a.distance(&b, 15), 7);
    }

    #[test]
    fn distance_cross_volume() {
        let a = ChapterId::parse("V1C10").unwrap();
        let b = ChapterId::parse("V3C2").unwrap();
        // |3-1|*15 + min(10,2) = 30 + 2 = 32
        assert_eq!(a.distance(&b, 15), 32);
    }

    #[test]
    fn extract_volume_token() {
        assert_eq!(
            ChapterId::extract_volume("V2C7").as_deref(),
            Some("V2")
        );
        assert_eq!(ChapterId::extract_volume("not a chapter"), None);
    }

    proptest! {
        #[test]
        fn canonical_is_idempotent(v in 1u32..50, c in 0u32..500) {
            let raw = format!("V{v}C{c}");
            let once = ChapterId::canonical(&raw).unwrap();
            let twice = ChapterId::canonical(&once).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn parse_of_canonical_preserves_fields(v in 1u32..50, c in 0u32..500, seq in 0u32..20) {
            let raw = format!("V{v}C{c}E{seq}");
            let parsed = ChapterId::parse(&raw).unwrap();
            let reparsed = ChapterId::parse(&parsed.to_string()).unwrap();
            prop_assert_eq!(parsed, reparsed);
        }
    }
}
