//! Budget Orchestrator (§4.8): fixed-priority-fill packing of a prompt
//! context into a token budget — query reservation, then summary, then
//! evidence, then memories, then recent history walked newest-to-oldest.

use crate::token::count_tokens;

#[derive(Debug, Clone, Copy)]
pub struct BudgetLimits {
    pub model_context_window: usize,
    pub summary_token_limit: usize,
    pub memory_token_limit: usize,
    pub evidence_token_limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    pub summary: Option<String>,
    pub recent_messages: Vec<String>,
    pub memories: Vec<String>,
    pub evidence: Vec<String>,
    pub total_tokens: usize,
}

/// Greedily takes items from `items` in order, each guarded by `count_tokens`,
/// stopping at the first item that would push the running total past
/// `limit`. Returns the accepted items and the tokens they consumed.
fn fill_in_order(items: &[String], limit: usize) -> (Vec<String>, usize) {
    let mut taken = Vec::new();
    let mut used = 0usize;
    for item in items {
        let cost = count_tokens(item);
        if used + cost > limit {
            break;
        }
        used += cost;
        taken.push(item.clone());
    }
    (taken, used)
}

/// `recent_messages` is chronological (oldest first); the fill walks it
/// newest-to-oldest and prepends accepted messages, so the result stays
/// chronological while respecting recency priority.
fn fill_recent(recent_messages: &[String], limit: usize) -> (Vec<String>, usize) {
    let mut taken = Vec::new();
    let mut used = 0usize;
    for item in recent_messages.iter().rev() {
        let cost = count_tokens(item);
        if used + cost > limit {
            break;
        }
        used += cost;
        taken.insert(0, item.clone());
    }
    (taken, used)
}

/// Inputs: `summary` (at most one per chat), `evidence`/`memories` in their
/// caller-supplied ranking order, and `recent_messages` in chronological
/// order. `memories` is carried for interface completeness — the Chat
/// Orchestrator passes an empty slice, since memory retrieval is out of
/// scope for this engine.
#[allow(clippy::too_many_arguments)]
pub fn fill_budget(
    query: &str,
    summary: Option<&str>,
    evidence: &[String],
    memories: &[String],
    recent_messages: &[String],
    limits: &BudgetLimits,
) -> Budget {
    let query_tokens = count_tokens(query);
    let mut remaining = limits.model_context_window.saturating_sub(query_tokens);
    let mut total = query_tokens;

    let mut summary_out = None;
    if let Some(s) = summary {
        let cost = count_tokens(s);
        if cost <= limits.summary_token_limit && cost <= remaining {
            summary_out = Some(s.to_string());
            remaining -= cost;
            total += cost;
        }
    }

    let (evidence_out, evidence_used) = fill_in_order(evidence, remaining.min(limits.evidence_token_limit));
    remaining -= evidence_used;
    total += evidence_used;

    let (memories_out, memories_used) = fill_in_order(memories, remaining.min(limits.memory_token_limit));
    remaining -= memories_used;
    total += memories_used;

    let (recent_out, recent_used) = fill_recent(recent_messages, remaining);
    total += recent_used;

    Budget {
        summary: summary_out,
        recent_messages: recent_out,
        memories: memories_out,
        evidence: evidence_out,
        total_tokens: total,
    }
}
