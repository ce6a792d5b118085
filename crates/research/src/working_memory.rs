//! Working-memory preparation (spec §4.8 steps 3–5): resolves retrieval
//! seeds from mentioned entities, runs the evidence search, and packages
//! the result for a research round.

use wenshape_evidence::{SearchQuery, SearchStats};
use wenshape_protocol::error::StorageError;
use wenshape_protocol::evidence::{EvidenceItem, EvidenceType};
use wenshape_protocol::{ChapterId, SceneBrief};
use wenshape_storage::Store;

const MENTION_CANDIDATE_LIMIT: usize = 12;
const TOP_SOURCES_LIMIT: usize = 3;
const SEARCH_LIMIT: usize = 24;

#[derive(Debug, Clone)]
pub struct PreparedRetrieval {
    pub items: Vec<EvidenceItem>,
    pub stats: SearchStats,
    pub seed_entities: Vec<String>,
    pub missing_cards: Vec<String>,
    pub top_sources: Vec<String>,
}

pub struct WorkingMemoryService<'a> {
    store: &'a Store,
}

impl<'a> WorkingMemoryService<'a> {
    pub fn new(store: &'a Store) -> Self {
        WorkingMemoryService { store }
    }

    /// Builds the mention candidate set (extracted entities in `goal` +
    /// scene brief leads + loose mentions), splits it into `card_hits`/
    /// `missing_cards` by probing storage, then runs the evidence search
    /// seeded with both sets — mention candidates bias retrieval but are
    /// never themselves asserted as bound entities (spec §4.8 step 3).
    pub async fn prepare(
        &self,
        chapter: &ChapterId,
        scene_brief: Option<&SceneBrief>,
        goal: &str,
        user_answers: &[String],
        extra_queries: &[String],
        semantic_rerank: bool,
    ) -> Result<PreparedRetrieval, StorageError> {
        let (character_mentions, _world_mentions, _rule_mentions) = wenshape_binding::extract_entities_from_text(self.store, goal).await?;
        let mut mention_candidates: Vec<String> = character_mentions.into_iter().map(|m| m.name).collect();
        if let Some(brief) = scene_brief {
            mention_candidates.extend(brief.lead_character_names(3));
        }
        mention_candidates.extend(wenshape_binding::extract_loose_mentions(goal, MENTION_CANDIDATE_LIMIT));
        dedup_preserve_order(&mut mention_candidates);
        mention_candidates.truncate(MENTION_CANDIDATE_LIMIT);

        let mut card_hits = Vec::new();
        let mut missing_cards = Vec::new();
        for name in &mention_candidates {
            let has_character = self.store.read_character_card(name).await?.is_some();
            let has_world = !has_character && self.store.read_world_card(name).await?.is_some();
            if has_character || has_world {
                card_hits.push(name.clone());
            } else {
                missing_cards.push(name.clone());
            }
        }

        let mut seeds: Vec<String> = card_hits;
        seeds.extend(missing_cards.iter().cloned());
        dedup_preserve_order(&mut seeds);

        let mut queries = vec![goal.to_string()];
        queries.extend(user_answers.iter().cloned());
        queries.extend(extra_queries.iter().cloned());
        queries.retain(|q| !q.trim().is_empty());

        let search_query = SearchQuery {
            queries,
            limit: SEARCH_LIMIT,
            seed_entities: seeds.clone(),
            chapters: Some(vec![*chapter]),
            include_text_chunks: true,
            semantic_rerank,
        };

        let result = wenshape_evidence::search(self.store, &search_query, None).await?;
        let top_sources = top_sources_excluding_memory(&result.items, TOP_SOURCES_LIMIT);

        Ok(PreparedRetrieval { items: result.items, stats: result.stats, seed_entities: seeds, missing_cards, top_sources })
    }
}

fn top_sources_excluding_memory(items: &[EvidenceItem], limit: usize) -> Vec<String> {
    items.iter().filter(|i| i.kind != EvidenceType::Memory).take(limit).map(|i| i.id.clone()).collect()
}

fn dedup_preserve_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::{ChapterKind, ProjectId};

    fn test_store(root: &std::path::Path) -> Store {
        Store::new(root, ProjectId::new("proj").unwrap())
    }

    #[tokio::test]
    async fn prepare_on_empty_project_returns_no_items_and_all_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let service = WorkingMemoryService::new(&store);
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let prepared = service.prepare(&chapter, None, "Alice confronts the tavern keeper", &[], &[], false).await.unwrap();
        assert!(prepared.items.is_empty());
    }

    #[test]
    fn dedup_preserve_order_keeps_first_occurrence() {
        let mut v = vec!["a".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        dedup_preserve_order(&mut v);
        assert_eq!(v, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}
