//! Card proposal detection (spec §4.11 step 5, §4.9 "detect proposals").
//!
//! Archivist heuristic-only extraction: reuses the same mention-scoring
//! pipeline chapter binding uses, then keeps only mentions with no
//! matching card yet.

use wenshape_protocol::proposal::{CardProposal, ProposalKind};
use wenshape_protocol::{ChapterId, StorageError};
use wenshape_storage::Store;

const PROPOSAL_SCORE_FLOOR: f64 = 0.2;

pub async fn detect_proposals(store: &Store, chapter: ChapterId, text: &str) -> Result<Vec<CardProposal>, StorageError> {
    let (characters, world_entities, _rules) = wenshape_binding::extract_entities_from_text(store, text).await?;
    let mut proposals = Vec::new();

    for mention in characters {
        if mention.score < PROPOSAL_SCORE_FLOOR {
            continue;
        }
        if store.read_character_card(&mention.name).await?.is_none() {
            proposals.push(CardProposal {
                kind: ProposalKind::Character,
                name: mention.name,
                description: mention.examples.first().cloned().unwrap_or_default(),
                confidence: mention.score.clamp(0.0, 1.0) as f32,
                source: chapter,
            });
        }
    }

    for mention in world_entities {
        if mention.score < PROPOSAL_SCORE_FLOOR {
            continue;
        }
        if store.read_world_card(&mention.name).await?.is_none() {
            proposals.push(CardProposal {
                kind: ProposalKind::World,
                name: mention.name,
                description: mention.examples.first().cloned().unwrap_or_default(),
                confidence: mention.score.clamp(0.0, 1.0) as f32,
                source: chapter,
            });
        }
    }

    Ok(proposals)
}

/// Batch-sync creates cards for every surviving proposal, overwriting an
/// existing card of the same name (spec §4.11 step 5: `overwrite=true`).
pub async fn create_cards_from_proposals(store: &Store, proposals: &[CardProposal]) -> Result<usize, StorageError> {
    let mut created = 0;
    for proposal in proposals {
        match proposal.kind {
            ProposalKind::Character => {
                let card = wenshape_protocol::card::CharacterCard {
                    name: proposal.name.clone(),
                    aliases: Vec::new(),
                    description: proposal.description.clone(),
                    stars: 1,
                };
                store.write_character_card(&card).await?;
                created += 1;
            }
            ProposalKind::World => {
                let card = wenshape_protocol::card::WorldCard {
                    name: proposal.name.clone(),
                    description: proposal.description.clone(),
                    aliases: Vec::new(),
                    category: None,
                    rules: Vec::new(),
                    immutable: false,
                    stars: 1,
                };
                store.write_world_card(&card).await?;
                created += 1;
            }
            ProposalKind::Style => {}
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::{ChapterKind, ProjectId};

    fn test_store(root: &std::path::Path) -> Store {
        Store::new(root, ProjectId::new("proj").unwrap())
    }

    #[tokio::test]
    async fn no_proposals_from_empty_draft() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let proposals = detect_proposals(&store, chapter, "").await.unwrap();
        assert!(proposals.is_empty());
    }
}
