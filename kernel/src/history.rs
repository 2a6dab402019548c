//! Conversation pruning (spec.md §4.10). Pure scoring and partitioning over
//! a caller-supplied message list; no knowledge of the wire message type
//! lives here so this can be unit tested without a real LLM client.

use serde::{Deserialize, Serialize};

/// The kind of tool result a history item represents, driving the fixed
/// `tool_value` lookup in spec.md §4.10 point 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolValueClass {
    IncidentsOrFinalAssessment,
    OwnershipOrCochangeWithContext,
    BlastRadius,
    SimpleOwnershipOrDepList,
    /// Anything that isn't a tool result (plain conversation turns) is
    /// scored with the lowest tool_value so it is compressed/dropped first
    /// when space is needed, but is not itself one of the named classes.
    NotATool,
}

impl ToolValueClass {
    pub fn tool_value(self) -> f64 {
        match self {
            ToolValueClass::IncidentsOrFinalAssessment => 1.0,
            ToolValueClass::OwnershipOrCochangeWithContext => 0.8,
            ToolValueClass::BlastRadius => 0.7,
            ToolValueClass::SimpleOwnershipOrDepList => 0.4,
            ToolValueClass::NotATool => 0.0,
        }
    }
}

/// A single message in the conversation, abstracted just enough for
/// pruning: its raw text (for token estimation and compression), how many
/// hops old it is, and what kind of tool result it carries, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub text: String,
    /// 0 = most recent hop's messages, increasing with age.
    pub age_in_hops: u32,
    pub tool_value_class: ToolValueClass,
    /// Number of distinct identifiers (commit SHAs, issue numbers, file
    /// paths) the item mentions; used as the density signal.
    pub identifier_density: f64,
}

pub const CHARS_PER_TOKEN: f64 = 4.0;
pub const PER_MESSAGE_OVERHEAD_TOKENS: f64 = 3.0;

/// Estimates token count with the 4-chars-per-token heuristic plus a fixed
/// per-message overhead (spec.md §4.10 point 1).
pub fn estimate_tokens(item: &HistoryItem) -> f64 {
    (item.text.len() as f64 / CHARS_PER_TOKEN) + PER_MESSAGE_OVERHEAD_TOKENS
}

fn total_tokens(items: &[HistoryItem]) -> f64 {
    items.iter().map(estimate_tokens).sum()
}

/// Score an older item per spec.md §4.10 point 4: `0.5*tool_value +
/// 0.3*recency + 0.2*density`. `recency` decays linearly to 0 over
/// `max_age_in_hops` hops past the recent window, floored at 0.
fn recency_score(age_in_hops: u32, max_age_in_hops: u32) -> f64 {
    if max_age_in_hops == 0 {
        return 0.0;
    }
    let fraction = age_in_hops as f64 / max_age_in_hops as f64;
    (1.0 - fraction).clamp(0.0, 1.0)
}

fn score_item(item: &HistoryItem, max_age_in_hops: u32) -> f64 {
    0.5 * item.tool_value_class.tool_value()
        + 0.3 * recency_score(item.age_in_hops, max_age_in_hops)
        + 0.2 * item.identifier_density.clamp(0.0, 1.0)
}

pub const KEEP_VERBATIM_THRESHOLD: f64 = 0.7;
pub const COMPRESS_THRESHOLD: f64 = 0.4;

/// Produces a compressed placeholder for a medium-scored item, preserving
/// counts and key identifiers as spec.md §4.10 point 5 requires. The
/// placeholder is deliberately short; callers needing the original text
/// should keep it out-of-band (e.g. in a checkpoint) rather than relying on
/// this string.
fn compress(item: &HistoryItem) -> String {
    let preview: String = item.text.chars().take(80).collect();
    format!(
        "[compressed tool result, {} chars, density {:.2}] {preview}...",
        item.text.len(),
        item.identifier_density
    )
}

/// Prunes `items` (oldest-first) to fit `budget_tokens`, always preserving
/// the last `2 * recent_window` messages verbatim (spec.md §4.10's
/// invariant and testable property 6). Returns the pruned list in original
/// order.
pub fn prune_history(
    items: &[HistoryItem],
    budget_tokens: f64,
    recent_window: usize,
) -> Vec<HistoryItem> {
    if total_tokens(items) <= budget_tokens {
        return items.to_vec();
    }

    let recent_count = (2 * recent_window).min(items.len());
    let split_at = items.len() - recent_count;
    let (older, recent) = items.split_at(split_at);

    let max_age = older.iter().map(|i| i.age_in_hops).max().unwrap_or(0).max(1);

    let mut scored: Vec<(f64, &HistoryItem)> =
        older.iter().map(|i| (score_item(i, max_age), i)).collect();
    // Stable by original order; score only decides keep/compress/drop, not
    // reordering.
    scored.sort_by(|a, b| a.1.age_in_hops.cmp(&b.1.age_in_hops));

    let mut kept: Vec<HistoryItem> = Vec::with_capacity(items.len());
    for (score, item) in scored {
        if score >= KEEP_VERBATIM_THRESHOLD {
            kept.push(item.clone());
        } else if score >= COMPRESS_THRESHOLD {
            kept.push(HistoryItem {
                text: compress(item),
                age_in_hops: item.age_in_hops,
                tool_value_class: item.tool_value_class,
                identifier_density: item.identifier_density,
            });
        }
        // else: dropped entirely.
    }

    kept.extend(recent.iter().cloned());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str, age: u32, class: ToolValueClass, density: f64) -> HistoryItem {
        HistoryItem {
            text: text.to_string(),
            age_in_hops: age,
            tool_value_class: class,
            identifier_density: density,
        }
    }

    #[test]
    fn under_budget_is_unchanged() {
        let items = vec![item("short", 0, ToolValueClass::NotATool, 0.0)];
        let pruned = prune_history(&items, 10_000.0, 2);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].text, "short");
    }

    #[test]
    fn recent_window_is_always_verbatim() {
        let big_text = "x".repeat(10_000);
        let mut items = Vec::new();
        for age in (0..10).rev() {
            items.push(item(&big_text, age, ToolValueClass::SimpleOwnershipOrDepList, 0.0));
        }
        let pruned = prune_history(&items, 50.0, 2);
        let recent_window_items = &items[items.len() - 4..];
        let pruned_tail = &pruned[pruned.len() - 4..];
        for (original, kept) in recent_window_items.iter().zip(pruned_tail.iter()) {
            assert_eq!(original.text, kept.text);
        }
    }

    #[test]
    fn high_value_older_items_are_kept_verbatim() {
        let big_text = "x".repeat(10_000);
        let items = vec![
            item(&big_text, 5, ToolValueClass::IncidentsOrFinalAssessment, 1.0),
            item(&big_text, 4, ToolValueClass::NotATool, 0.0),
            item("a", 1, ToolValueClass::NotATool, 0.0),
            item("b", 0, ToolValueClass::NotATool, 0.0),
        ];
        let pruned = prune_history(&items, 50.0, 1);
        assert!(pruned.iter().any(|i| i.text == big_text));
    }

    #[test]
    fn low_value_older_items_are_dropped() {
        let big_text = "x".repeat(10_000);
        let items = vec![
            item(&big_text, 9, ToolValueClass::NotATool, 0.0),
            item("a", 1, ToolValueClass::NotATool, 0.0),
            item("b", 0, ToolValueClass::NotATool, 0.0),
        ];
        let pruned = prune_history(&items, 50.0, 1);
        assert!(!pruned.iter().any(|i| i.text == big_text));
    }
}
