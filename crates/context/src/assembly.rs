//! Context assembly (spec §4.6.5): combines deterministic and
//! retrieval-selected items into a budgeted, degradation-checked
//! prompt payload.

use wenshape_protocol::error::StorageError;
use wenshape_protocol::evidence::EvidenceType;
use wenshape_protocol::{AgentKind, ChapterId};
use wenshape_storage::Store;

use crate::budget::BudgetManager;
use crate::compress::{smart_compress, CompressionStats};
use crate::degradation::{health_check, HealthCheck};
use crate::types::{BudgetCategory, ContextItem, ContextItemKind, Priority};

/// A single assembled item tagged with the section it was placed in,
/// so `render_debug` can show the structure that shaped a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Guiding,
    Actionable,
    Informational,
}

#[derive(Debug, Clone)]
pub struct SectionedItem {
    pub section: Section,
    pub item: ContextItem,
}

/// The output of a context assembly pass: sectioned items, the budget
/// that was applied, a degradation health check, and whatever
/// compression ran automatically to fit the budget.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub agent: AgentKind,
    pub chapter: ChapterId,
    pub items: Vec<SectionedItem>,
    pub total_tokens: usize,
    pub budget: std::collections::HashMap<BudgetCategory, usize>,
    pub health: HealthCheck,
    pub compactions: Vec<CompressionStats>,
}

impl AssembledContext {
    pub fn guiding(&self) -> impl Iterator<Item = &ContextItem> {
        self.items.iter().filter(|i| i.section == Section::Guiding).map(|i| &i.item)
    }

    pub fn actionable(&self) -> impl Iterator<Item = &ContextItem> {
        self.items.iter().filter(|i| i.section == Section::Actionable).map(|i| &i.item)
    }

    pub fn informational(&self) -> impl Iterator<Item = &ContextItem> {
        self.items.iter().filter(|i| i.section == Section::Informational).map(|i| &i.item)
    }

    /// Human-readable dump of the assembled sections, token usage per
    /// category, and any health findings — for debugging a run, never
    /// fed back to an agent as a prompt.
    pub fn render_debug(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# context for {} / {}\n", self.agent, self.chapter));
        out.push_str(&format!("total_tokens={}\n\n", self.total_tokens));

        for (label, section) in [("GUIDING", Section::Guiding), ("ACTIONABLE", Section::Actionable), ("INFORMATIONAL", Section::Informational)] {
            let items: Vec<&ContextItem> = self.items.iter().filter(|i| i.section == section).map(|i| &i.item).collect();
            out.push_str(&format!("## {label} ({} items)\n", items.len()));
            for item in items {
                out.push_str(&format!("- [{:?}] {} ({} tok, rel={:.2})\n", item.kind, item.id, item.token_count, item.relevance_score));
            }
            out.push('\n');
        }

        out.push_str("## budget\n");
        for category in BudgetCategory::ALL {
            out.push_str(&format!("- {category:?}: {}\n", self.budget.get(&category).copied().unwrap_or(0)));
        }

        if !self.compactions.is_empty() {
            out.push_str("\n## auto_compact\n");
            for stats in &self.compactions {
                out.push_str(&format!(
                    "- {} -> {} sentences, {} -> {} chars\n",
                    stats.original_sentences, stats.kept_sentences, stats.original_chars, stats.compressed_chars
                ));
            }
        }

        if !self.health.is_healthy() {
            out.push_str("\n## degradation findings\n");
            for finding in &self.health.findings {
                out.push_str(&format!("- {:?} ({:?}): {}\n", finding.kind, finding.severity, finding.detail));
            }
        }

        out
    }
}

/// Orchestrates a full context assembly pass for one agent call: loads
/// deterministic must-have items, retrieves query-scored informational
/// items within budget, auto-compacts overflow, and runs the
/// degradation guard.
pub struct ContextOrchestrator<'a> {
    store: &'a Store,
    budget: BudgetManager,
}

impl<'a> ContextOrchestrator<'a> {
    pub fn new(store: &'a Store, budget: BudgetManager) -> Self {
        ContextOrchestrator { store, budget }
    }

    /// `query` seeds the informational retrieval pass (e.g. the chapter
    /// goal or a research question); `types` narrows which evidence
    /// kinds are eligible. `current_draft` is injected directly into the
    /// actionable section — the orchestrator doesn't re-derive it.
    pub async fn assemble_context(
        &self,
        agent: AgentKind,
        chapter: &ChapterId,
        query: &str,
        types: &[EvidenceType],
        current_draft: Option<&str>,
    ) -> Result<AssembledContext, StorageError> {
        let allocations = self.budget.allocations_for(agent);
        let mut sectioned = Vec::new();

        for item in crate::select::deterministic_select(self.store, agent, chapter).await? {
            let section = if item.kind == ContextItemKind::SceneBrief { Section::Actionable } else { Section::Guiding };
            sectioned.push(SectionedItem { section, item });
        }

        if let Some(draft) = current_draft {
            if !draft.trim().is_empty() {
                sectioned.push(SectionedItem {
                    section: Section::Actionable,
                    item: ContextItem::new(format!("current_draft:{chapter}"), ContextItemKind::CurrentDraft, draft, Priority::High)
                        .with_relevance(1.0),
                });
            }
        }

        const RETRIEVAL_TOP_K: usize = 30;
        let retrieval_types: Vec<EvidenceType> = if types.is_empty() {
            vec![EvidenceType::Fact, EvidenceType::Summary, EvidenceType::Character, EvidenceType::WorldEntity, EvidenceType::TextChunk]
        } else {
            types.to_vec()
        };
        let informational = crate::select::retrieval_select(self.store, query, &retrieval_types, RETRIEVAL_TOP_K).await?;
        for item in informational {
            sectioned.push(SectionedItem { section: Section::Informational, item });
        }

        let total_available = self.budget.total_available();
        let mut compactions = Vec::new();
        let total_tokens: usize = sectioned.iter().map(|s| s.item.token_count).sum();
        if total_tokens > total_available {
            self.auto_compact(&mut sectioned, total_available, query, &mut compactions);
        }

        let facts = self.store.read_facts().await?;
        let established: Vec<&str> = facts.iter().map(|f| f.statement.as_str()).collect();

        let total_tokens: usize = sectioned.iter().map(|s| s.item.token_count).sum();
        let items_only: Vec<ContextItem> = sectioned.iter().map(|s| s.item.clone()).collect();
        let health = health_check(&items_only, total_available, &established);
        if !health.is_healthy() {
            tracing::warn!(agent = %agent, chapter = %chapter, findings = health.findings.len(), "context degradation findings");
        }

        Ok(AssembledContext { agent, chapter: *chapter, items: sectioned, total_tokens, budget: allocations, health, compactions })
    }

    /// Per spec §4.6.3's auto-compact policy: CRITICAL items are never
    /// touched; LOW items are dropped outright once overflow exceeds
    /// 1.5x, otherwise compressed to 30%; MEDIUM compresses to
    /// `max(0.40, 1/overflow_ratio)`; HIGH compresses to
    /// `max(0.70, 1/overflow_ratio)`. `overflow_ratio` is computed once
    /// against the pre-compaction total.
    fn auto_compact(&self, sectioned: &mut Vec<SectionedItem>, budget: usize, query: &str, compactions: &mut Vec<CompressionStats>) {
        let total: usize = sectioned.iter().map(|s| s.item.token_count).sum();
        if total <= budget || budget == 0 {
            return;
        }
        let overflow_ratio = total as f64 / budget as f64;

        sectioned.retain_mut(|s| {
            let item = &mut s.item;
            match item.priority {
                Priority::Critical => true,
                Priority::Low if overflow_ratio > 1.5 => {
                    tracing::debug!(id = %item.id, "auto_compact dropped low-priority item under heavy overflow");
                    false
                }
                Priority::Low => {
                    let (compressed, stats) = smart_compress(&item.content, 0.30, Some(query));
                    item.set_content(compressed);
                    compactions.push(stats);
                    true
                }
                Priority::Medium => {
                    let ratio = (1.0 / overflow_ratio).max(0.40);
                    let (compressed, stats) = smart_compress(&item.content, ratio, Some(query));
                    item.set_content(compressed);
                    compactions.push(stats);
                    true
                }
                Priority::High => {
                    let ratio = (1.0 / overflow_ratio).max(0.70);
                    let (compressed, stats) = smart_compress(&item.content, ratio, Some(query));
                    item.set_content(compressed);
                    compactions.push(stats);
                    true
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_protocol::{ChapterId, ChapterKind, ProjectId};

    fn test_store(root: &std::path::Path) -> Store {
        Store::new(root, ProjectId::new("proj").unwrap())
    }

    #[tokio::test]
    async fn assemble_context_on_empty_project_is_healthy_and_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let orchestrator = ContextOrchestrator::new(&store, BudgetManager::default());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let assembled = orchestrator.assemble_context(AgentKind::Writer, &chapter, "dragon", &[], None).await.unwrap();
        assert!(assembled.items.is_empty());
        assert!(assembled.health.is_healthy());
    }

    #[tokio::test]
    async fn assemble_context_includes_current_draft_in_actionable_section() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let orchestrator = ContextOrchestrator::new(&store, BudgetManager::default());
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let assembled = orchestrator
            .assemble_context(AgentKind::Writer, &chapter, "dragon", &[], Some("Once upon a time..."))
            .await
            .unwrap();
        assert_eq!(assembled.actionable().count(), 1);
        assert!(assembled.render_debug().contains("ACTIONABLE"));
    }

    #[test]
    fn auto_compact_never_touches_critical_items() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let orchestrator = ContextOrchestrator::new(&store, BudgetManager::default());
        let critical_content = "z".repeat(2000);
        let mut sectioned = vec![SectionedItem {
            section: Section::Guiding,
            item: ContextItem::new("a", ContextItemKind::StyleCard, critical_content.clone(), Priority::Critical).with_relevance(1.0),
        }];
        let mut compactions = Vec::new();
        orchestrator.auto_compact(&mut sectioned, 10, "q", &mut compactions);
        assert_eq!(sectioned[0].item.content, critical_content);
        assert!(compactions.is_empty());
    }

    #[test]
    fn auto_compact_drops_low_priority_under_heavy_overflow() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let orchestrator = ContextOrchestrator::new(&store, BudgetManager::default());
        let mut sectioned = vec![SectionedItem {
            section: Section::Informational,
            item: ContextItem::new("a", ContextItemKind::TextChunk, "x".repeat(4000), Priority::Low).with_relevance(0.1),
        }];
        let mut compactions = Vec::new();
        orchestrator.auto_compact(&mut sectioned, 10, "q", &mut compactions);
        assert!(sectioned.is_empty());
    }

    #[test]
    fn auto_compact_shrinks_medium_priority_items() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        let orchestrator = ContextOrchestrator::new(&store, BudgetManager::default());
        let original = "Sentence one here. Sentence two here. Sentence three here. Sentence four here.".repeat(5);
        let mut sectioned = vec![SectionedItem {
            section: Section::Informational,
            item: ContextItem::new("a", ContextItemKind::Fact, original.clone(), Priority::Medium).with_relevance(0.5),
        }];
        let mut compactions = Vec::new();
        orchestrator.auto_compact(&mut sectioned, 50, "q", &mut compactions);
        assert!(sectioned[0].item.content.len() < original.len());
        assert_eq!(compactions.len(), 1);
    }
}
