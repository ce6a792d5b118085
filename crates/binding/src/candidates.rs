//! Candidate extraction for the three mention kinds (spec §4.5 step 3).

use wenshape_protocol::{Card, EvidenceItem, EvidenceType};
use wenshape_storage::Store;

use crate::stopwords::{alias_set, is_bindable_name};

#[derive(Debug, Clone)]
pub struct EntityCandidate {
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RuleCandidate {
    pub rule_id: String,
    pub text: String,
}

/// Character candidates: one per character card, aliases drawn from the
/// name's own parenthetical forms plus the card's declared `aliases`.
pub fn character_candidates(cards: &[Card]) -> Vec<EntityCandidate> {
    cards
        .iter()
        .filter_map(|card| match card {
            Card::Character(c) => {
                let (name, aliases) = alias_set(&c.name, &c.aliases);
                is_bindable_name(&name).then_some(EntityCandidate { name, aliases })
            }
            _ => None,
        })
        .collect()
}

/// World-entity candidates: derived from the `cards` evidence index's
/// `world_entity` items, one candidate per distinct entity name (the
/// segment of the item id before its first `:`).
pub fn world_entity_candidates(cards_index: &[EvidenceItem]) -> Vec<EntityCandidate> {
    entity_names_from_index(cards_index, EvidenceType::WorldEntity)
        .into_iter()
        .filter_map(|name| {
            let (name, aliases) = alias_set(&name, &[]);
            is_bindable_name(&name).then_some(EntityCandidate { name, aliases })
        })
        .collect()
}

/// World-rule candidates: one per `world_rule` evidence item, keyed by
/// that item's own id (so a rule's id is stable across rebuilds).
pub fn world_rule_candidates(cards_index: &[EvidenceItem]) -> Vec<RuleCandidate> {
    cards_index
        .iter()
        .filter(|item| item.kind == EvidenceType::WorldRule)
        .map(|item| RuleCandidate { rule_id: item.id.clone(), text: item.text.clone() })
        .collect()
}

/// Entity names named in card item ids of the form `<prefix>:<name>:<field>`,
/// deduped and in first-seen order.
fn entity_names_from_index(cards_index: &[EvidenceItem], kind: EvidenceType) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut names = Vec::new();
    for item in cards_index.iter().filter(|item| item.kind == kind) {
        let name = item.source.card.clone().unwrap_or_else(|| {
            item.id.split(':').nth(1).unwrap_or(&item.id).to_string()
        });
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    names
}

/// Reads the `cards` evidence index's raw items (used for world-entity and
/// world-rule candidates). Returns an empty list if the index hasn't been
/// built yet rather than erroring, since binding can still run on
/// characters alone.
pub async fn read_cards_index(store: &Store) -> Vec<EvidenceItem> {
    store.read_index_jsonl::<EvidenceItem>("cards").await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::evidence::{EvidenceMeta, EvidenceScope, EvidenceSource};
    use wenshape_protocol::CharacterCard;

    fn item(id: &str, kind: EvidenceType, card: &str) -> EvidenceItem {
        EvidenceItem {
            id: id.to_string(),
            kind,
            text: "some text".to_string(),
            source: EvidenceSource { card: Some(card.to_string()), ..Default::default() },
            scope: EvidenceScope::Global,
            entities: vec![card.to_string()],
            meta: EvidenceMeta::default(),
        }
    }

    #[test]
    fn character_candidates_pull_name_and_declared_aliases() {
        let cards = vec![Card::Character(CharacterCard {
            name: "Alice (the Bold)".into(),
            aliases: vec!["Al".into()],
            description: String::new(),
            stars: 1,
        })];
        let candidates = character_candidates(&cards);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Alice");
        assert!(candidates[0].aliases.contains(&"the Bold".to_string()));
        assert!(candidates[0].aliases.contains(&"Al".to_string()));
    }

    #[test]
    fn world_entity_candidates_dedup_by_card_name() {
        let items = vec![
            item("world_entity:Arcane Tower:description:0", EvidenceType::WorldEntity, "Arcane Tower"),
            item("world_entity:Arcane Tower:category", EvidenceType::WorldEntity, "Arcane Tower"),
        ];
        let candidates = world_entity_candidates(&items);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Arcane Tower");
    }

    #[test]
    fn world_rule_candidates_keep_each_items_own_id() {
        let items = vec![item("world_rule:Arcane Law:0", EvidenceType::WorldRule, "Arcane Law")];
        let candidates = world_rule_candidates(&items);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].rule_id, "world_rule:Arcane Law:0");
    }
}
