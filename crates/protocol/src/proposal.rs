//! Card proposals: heuristic "you might want a card for this" hints
//! surfaced by the archivist after generation or analysis (spec §4.9,
//! §4.11, §6.2 fanfiction importer).

use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Character,
    World,
    Style,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProposal {
    pub kind: ProposalKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub confidence: f32,
    pub source: ChapterId,
}

impl CardProposal {
    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }
}

/// Product policy (spec §4.9): character proposals are suppressed after
/// live generation — only world/style proposals reach the client there.
/// Batch analysis (§4.11) keeps all kinds.
pub fn filter_character_proposals(proposals: Vec<CardProposal>) -> Vec<CardProposal> {
    proposals.into_iter().filter(|p| p.kind != ProposalKind::Character).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter_id::ChapterKind;

    #[test]
    fn filter_drops_character_kind_only() {
        let source = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let proposals = vec![
            CardProposal { kind: ProposalKind::Character, name: "Bob".into(), description: String::new(), confidence: 0.5, source },
            CardProposal { kind: ProposalKind::World, name: "Capital".into(), description: String::new(), confidence: 0.5, source },
        ];
        let kept = filter_character_proposals(proposals);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind, ProposalKind::World);
    }
}
