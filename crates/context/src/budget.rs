//! Token budget allocation across the five informational categories
//! (spec §4.6.1), scaled per agent.

use std::collections::HashMap;

use wenshape_protocol::AgentKind;

use crate::types::BudgetCategory;

const DEFAULT_CONTEXT_WINDOW: usize = 128_000;
const DEFAULT_MAX_OUTPUT_TOKENS: usize = 8_000;
const DEFAULT_OUTPUT_RATIO: f64 = 0.20;

/// Per-agent scaling multipliers (spec §4.6.1). Categories not listed for
/// an agent keep a multiplier of `1.0`.
fn agent_multiplier(agent: AgentKind, category: BudgetCategory) -> f64 {
    use BudgetCategory::*;
    match (agent, category) {
        (AgentKind::Archivist, Cards) => 1.2,
        (AgentKind::Archivist, Canon) => 1.3,
        (AgentKind::Archivist, Summaries) => 0.8,
        (AgentKind::Archivist, CurrentDraft) => 0.7,
        (AgentKind::Writer, Summaries) => 1.2,
        (AgentKind::Writer, CurrentDraft) => 1.1,
        (AgentKind::Editor, Cards) => 0.8,
        (AgentKind::Editor, Canon) => 0.8,
        (AgentKind::Editor, Summaries) => 0.9,
        (AgentKind::Editor, CurrentDraft) => 1.3,
        _ => 1.0,
    }
}

/// Computes token allocations for the five informational categories out
/// of a model's context window, after reserving space for output and the
/// system-rules slice, then scaled by an agent's multiplier table.
#[derive(Debug, Clone)]
pub struct BudgetManager {
    pub context_window: usize,
    pub max_output_tokens: usize,
    pub output_ratio: f64,
    pub ratios: HashMap<BudgetCategory, f64>,
}

impl Default for BudgetManager {
    fn default() -> Self {
        let mut ratios = HashMap::new();
        for category in BudgetCategory::ALL {
            ratios.insert(category, category.default_ratio());
        }
        BudgetManager {
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            output_ratio: DEFAULT_OUTPUT_RATIO,
            ratios,
        }
    }
}

impl BudgetManager {
    pub fn for_model(model_context_window: usize) -> Self {
        BudgetManager {
            context_window: model_context_window,
            ..Default::default()
        }
    }

    pub fn output_reserve(&self) -> usize {
        let ratio_reserve = (self.context_window as f64 * self.output_ratio) as usize;
        ratio_reserve.max(self.max_output_tokens)
    }

    pub fn total_available(&self) -> usize {
        self.context_window.saturating_sub(self.output_reserve())
    }

    /// Category allocations with the remaining (non-output) ratios
    /// re-normalized to sum to `1.0`, then scaled by `agent`'s multiplier
    /// and floored to an integer token count.
    pub fn allocations_for(&self, agent: AgentKind) -> HashMap<BudgetCategory, usize> {
        let ratio_sum: f64 = BudgetCategory::ALL.iter().map(|c| self.ratios.get(c).copied().unwrap_or(0.0)).sum();
        let total_available = self.total_available() as f64;

        let mut out = HashMap::new();
        for category in BudgetCategory::ALL {
            let raw_ratio = self.ratios.get(&category).copied().unwrap_or(0.0);
            let normalized = if ratio_sum > 0.0 { raw_ratio / ratio_sum } else { 0.0 };
            let base = (total_available * normalized).floor().max(0.0);
            let scaled = base * agent_multiplier(agent, category);
            out.insert(category, scaled.floor().max(0.0) as usize);
        }
        out
    }

    pub fn info_budget_for(&self, agent: AgentKind) -> usize {
        self.allocations_for(agent).values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_reserve_uses_the_larger_of_ratio_and_floor() {
        let budget = BudgetManager::for_model(10_000);
        assert_eq!(budget.output_reserve(), DEFAULT_MAX_OUTPUT_TOKENS.max(2_000));
    }

    #[test]
    fn allocations_sum_close_to_total_available_for_a_neutral_agent() {
        let budget = BudgetManager::default();
        let allocations = budget.allocations_for(AgentKind::Extractor);
        let sum: usize = allocations.values().sum();
        assert!(sum <= budget.total_available());
        assert!(sum as f64 >= budget.total_available() as f64 * 0.95);
    }

    #[test]
    fn archivist_multiplier_boosts_cards_and_canon() {
        let budget = BudgetManager::default();
        let neutral = budget.allocations_for(AgentKind::Extractor);
        let archivist = budget.allocations_for(AgentKind::Archivist);
        assert!(archivist[&BudgetCategory::Cards] > neutral[&BudgetCategory::Cards]);
        assert!(archivist[&BudgetCategory::CurrentDraft] < neutral[&BudgetCategory::CurrentDraft]);
    }

    #[test]
    fn editor_multiplier_boosts_current_draft() {
        let budget = BudgetManager::default();
        let neutral = budget.allocations_for(AgentKind::Extractor);
        let editor = budget.allocations_for(AgentKind::Editor);
        assert!(editor[&BudgetCategory::CurrentDraft] > neutral[&BudgetCategory::CurrentDraft]);
    }
}
