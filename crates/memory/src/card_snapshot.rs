//! Card snapshot construction (spec §4.7): a lightweight, point-in-time
//! summary of which character/world/style cards a memory pack's payload
//! actually touched, so downstream agents don't need to re-read storage.

use std::collections::HashSet;

use wenshape_protocol::evidence::EvidenceItem;
use wenshape_protocol::memory_pack::CardSnapshot;
use wenshape_storage::Store;

const NAME_LIMIT: usize = 12;
const PER_KIND_LIMIT: usize = 8;

/// Collects up to [`NAME_LIMIT`] unique candidate names from evidence
/// items whose `source.card` is set plus `seed_entities`, then probes
/// character storage before world storage for each, capping each kind at
/// [`PER_KIND_LIMIT`]. Also snapshots the style card when present.
pub async fn build_card_snapshot(
    store: &Store,
    evidence_pack: &[EvidenceItem],
    seed_entities: &[String],
) -> Result<CardSnapshot, wenshape_protocol::error::StorageError> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for item in evidence_pack {
        if let Some(card_name) = &item.source.card {
            if seen.insert(card_name.clone()) {
                candidates.push(card_name.clone());
            }
        }
    }
    for name in seed_entities {
        if seen.insert(name.clone()) {
            candidates.push(name.clone());
        }
    }
    candidates.truncate(NAME_LIMIT);

    let mut characters = Vec::new();
    let mut world = Vec::new();
    for name in &candidates {
        if characters.len() < PER_KIND_LIMIT && store.read_character_card(name).await?.is_some() {
            characters.push(name.clone());
            continue;
        }
        if world.len() < PER_KIND_LIMIT && store.read_world_card(name).await?.is_some() {
            world.push(name.clone());
        }
    }

    let style = store.read_style_card().await?.map(|card| card.style);

    Ok(CardSnapshot { characters, world, style })
}

/// Fills in a missing snapshot on a cached pack without re-running
/// retrieval (spec §4.7 step 3: "enrich card_snapshot if missing").
pub fn is_snapshot_empty(snapshot: &CardSnapshot) -> bool {
    snapshot.characters.is_empty() && snapshot.world.is_empty() && snapshot.style.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::card::CharacterCard;
    use wenshape_protocol::evidence::{EvidenceItem, EvidenceMeta, EvidenceScope, EvidenceSource, EvidenceType};
    use wenshape_protocol::ProjectId;

    fn test_store(root: &std::path::Path) -> Store {
        Store::new(root, ProjectId::new("proj").unwrap())
    }

    #[tokio::test]
    async fn snapshot_splits_characters_and_world_by_storage_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        store
            .write_character_card(&CharacterCard { name: "Alice".into(), aliases: vec![], description: String::new(), stars: 1 })
            .await
            .unwrap();

        let item = EvidenceItem {
            id: "e1".into(),
            kind: EvidenceType::Character,
            text: "Alice walks in".into(),
            source: EvidenceSource { card: Some("Alice".into()), ..Default::default() },
            scope: EvidenceScope::Chapter,
            entities: vec![],
            meta: EvidenceMeta::default(),
        };

        let snapshot = build_card_snapshot(&store, &[item], &["Bob".to_string()]).await.unwrap();
        assert_eq!(snapshot.characters, vec!["Alice".to_string()]);
        assert!(snapshot.world.is_empty());
    }

    #[test]
    fn empty_snapshot_detected() {
        let snapshot = CardSnapshot::default();
        assert!(is_snapshot_empty(&snapshot));
    }
}
