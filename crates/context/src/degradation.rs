//! Context degradation guard (spec §4.6.4): detects poisoning,
//! distraction, confusion, and clash in an assembled set of context
//! items before they reach an agent prompt.

use std::collections::HashMap;

use crate::types::{ContextItem, ContextItemKind};

/// Negation markers used by the cheap poisoning heuristic fallback
/// (spec §4.6.4); a real deployment would route this through an LLM.
const NEGATION_MARKERS: &[&str] = &["不是", "不", "没有", "无"];
const LOW_RELEVANCE_CUTOFF: f64 = 0.3;
const CONFUSION_RATIO: f64 = 0.3;
const DISTRACTION_WARN_RATIO: f64 = 0.7;
const DISTRACTION_CRITICAL_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationKind {
    /// New draft/scene-brief content contradicts an established fact.
    Poisoning,
    /// Total tokens relative to the budget are uncomfortably high.
    Distraction,
    /// Too many items have a low relevance score.
    Confusion,
    /// Two items of the same kind appear to assert contradictory things.
    Clash,
}

#[derive(Debug, Clone)]
pub struct DegradationFinding {
    pub kind: DegradationKind,
    pub severity: Severity,
    pub detail: String,
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HealthCheck {
    pub findings: Vec<DegradationFinding>,
    pub token_usage: usize,
}

impl HealthCheck {
    pub fn is_healthy(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_kind(&self, kind: DegradationKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }

    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Critical)
    }
}

/// `total_tokens/max_tokens >= 0.9` is critical, `>= 0.7` is a warning.
fn detect_distraction(items: &[ContextItem], max_tokens: usize) -> Option<DegradationFinding> {
    if max_tokens == 0 {
        return None;
    }
    let total: usize = items.iter().map(|i| i.token_count).sum();
    let ratio = total as f64 / max_tokens as f64;
    let severity = if ratio >= DISTRACTION_CRITICAL_RATIO {
        Severity::Critical
    } else if ratio >= DISTRACTION_WARN_RATIO {
        Severity::Warning
    } else {
        return None;
    };
    Some(DegradationFinding {
        kind: DegradationKind::Distraction,
        severity,
        detail: format!("token usage at {:.0}% of budget ({total}/{max_tokens})", ratio * 100.0),
        item_ids: Vec::new(),
    })
}

/// More than 30% of items scoring below `0.3` relevance.
fn detect_confusion(items: &[ContextItem]) -> Option<DegradationFinding> {
    if items.is_empty() {
        return None;
    }
    let low: Vec<&ContextItem> = items.iter().filter(|i| i.relevance_score < LOW_RELEVANCE_CUTOFF).collect();
    let ratio = low.len() as f64 / items.len() as f64;
    if ratio <= CONFUSION_RATIO {
        return None;
    }
    Some(DegradationFinding {
        kind: DegradationKind::Confusion,
        severity: Severity::Warning,
        detail: format!("{} of {} items ({:.0}%) have relevance below {LOW_RELEVANCE_CUTOFF}", low.len(), items.len(), ratio * 100.0),
        item_ids: low.into_iter().map(|i| i.id.clone()).collect(),
    })
}

/// Groups items by kind and flags identical-content pairs — the rule
/// fallback named in spec §4.6.4 when no LLM contradiction check is
/// available.
fn detect_clash(items: &[ContextItem]) -> Option<DegradationFinding> {
    let mut by_kind: HashMap<ContextItemKind, Vec<&ContextItem>> = HashMap::new();
    for item in items {
        by_kind.entry(item.kind).or_default().push(item);
    }
    for group in by_kind.values() {
        let mut seen: HashMap<String, &ContextItem> = HashMap::new();
        for item in group {
            let normalized = item.content.trim().to_lowercase();
            if let Some(prior) = seen.get(&normalized) {
                if prior.id != item.id {
                    return Some(DegradationFinding {
                        kind: DegradationKind::Clash,
                        severity: Severity::Warning,
                        detail: format!("items '{}' and '{}' carry identical content of kind {:?}", prior.id, item.id, item.kind),
                        item_ids: vec![prior.id.clone(), item.id.clone()],
                    });
                }
            }
            seen.insert(normalized, item);
        }
    }
    None
}

/// Flags `draft`/`scene_brief` items whose text negates an established
/// fact (shared non-trivial word with an adjacent negation marker).
/// A real deployment routes this through an LLM instead.
fn detect_poisoning(items: &[ContextItem], established_facts: &[&str]) -> Option<DegradationFinding> {
    if established_facts.is_empty() {
        return None;
    }
    for item in items {
        if !matches!(item.kind, ContextItemKind::CurrentDraft | ContextItemKind::SceneBrief) {
            continue;
        }
        let lower = item.content.to_lowercase();
        let has_negation = NEGATION_MARKERS.iter().any(|m| lower.contains(m));
        if !has_negation {
            continue;
        }
        for fact in established_facts {
            let fact_lower = fact.to_lowercase();
            let shared = fact_lower.split_whitespace().any(|w| w.len() > 2 && lower.contains(w));
            if shared {
                return Some(DegradationFinding {
                    kind: DegradationKind::Poisoning,
                    severity: Severity::Critical,
                    detail: format!("item '{}' appears to negate established fact: {fact:.80}", item.id),
                    item_ids: vec![item.id.clone()],
                });
            }
        }
    }
    None
}

/// Runs all four detectors over an assembled item set against
/// `max_tokens` (the budget the bundle was assembled for) and
/// `established_facts` (plain statement text, used by the poisoning
/// heuristic).
pub fn health_check(items: &[ContextItem], max_tokens: usize, established_facts: &[&str]) -> HealthCheck {
    let token_usage: usize = items.iter().map(|i| i.token_count).sum();
    let findings = [
        detect_poisoning(items, established_facts),
        detect_distraction(items, max_tokens),
        detect_confusion(items),
        detect_clash(items),
    ]
    .into_iter()
    .flatten()
    .collect();
    HealthCheck { findings, token_usage }
}
