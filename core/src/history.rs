//! C10 History Manager, core-level half: adapts the real `Investigation`
//! hop transcript into the kernel's pure `HistoryItem` list, then hands it
//! to `riskgraph_kernel::history::prune_history` (spec.md §4.10). The
//! scoring and pruning algorithm itself is pure and lives entirely in
//! `riskgraph-kernel`; this module only knows how to read a real
//! `HopRecord`.

use regex::Regex;
use std::sync::LazyLock;

use riskgraph_kernel::history::{HistoryItem, ToolValueClass};
use riskgraph_kernel::investigation::{HopRecord, Investigation};

/// Tool-value classes are a fixed lookup keyed by tool name (spec.md §4.10
/// point 4). Unrecognized names (the investigator's own confidence reports,
/// or a future tool) fall back to the lowest class rather than erroring.
fn classify_tool_value(tool_name: &str) -> ToolValueClass {
    match tool_name {
        "incidents_with_context" => ToolValueClass::IncidentsOrFinalAssessment,
        "ownership_timeline" | "cochange_with_context" => {
            ToolValueClass::OwnershipOrCochangeWithContext
        }
        "blast_radius" => ToolValueClass::BlastRadius,
        "recent_commits" | "commit_patch" => ToolValueClass::SimpleOwnershipOrDepList,
        _ => ToolValueClass::NotATool,
    }
}

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)
        \b[0-9a-f]{7,40}\b      # commit sha
        | \#\d+                  # issue/PR reference
        | \b[\w./-]+\.[a-zA-Z]{1,5}\b  # file path with extension
    ")
    .expect("identifier pattern is a fixed, known-valid regex")
});

/// Density signal for a history item's scoring (spec.md §4.10 point 4's
/// `density` term): the fraction of identifier-shaped tokens among roughly
/// 20-character spans, capped at 1.0. Not specified precisely by spec.md
/// beyond "density of identifiers"; this is the deterministic heuristic
/// C9's pruning relies on.
fn identifier_density(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let matches = IDENTIFIER_PATTERN.find_iter(text).count() as f64;
    let spans = (text.len() as f64 / 20.0).max(1.0);
    (matches / spans).clamp(0.0, 1.0)
}

/// Flattens every hop's tool-call results (and, for the final hop, its
/// reasoning text if present) into one `HistoryItem` per tool result, ready
/// for `prune_history`. `age_in_hops` counts backward from the most recent
/// hop, matching the kernel module's "0 = most recent" convention.
pub fn to_history_items(investigation: &Investigation) -> Vec<HistoryItem> {
    let current_hop = investigation.current_hop();
    let mut items = Vec::new();
    for hop_record in &investigation.hops {
        let age = current_hop.saturating_sub(hop_record.hop);
        for call in &hop_record.tool_calls {
            items.push(HistoryItem {
                text: format!("{}({}) -> {}", call.tool_name, call.arguments_json, call.result_json),
                age_in_hops: age,
                tool_value_class: classify_tool_value(&call.tool_name),
                identifier_density: identifier_density(&call.result_json),
            });
        }
        if let Some(point) = &hop_record.confidence {
            items.push(HistoryItem {
                text: format!("confidence={:.2} reasoning={}", point.confidence, point.reasoning),
                age_in_hops: age,
                tool_value_class: ToolValueClass::NotATool,
                identifier_density: 0.0,
            });
        }
    }
    items
}

/// One hop's worth of serialized history, in the shape `LlmProviderPort`
/// expects (spec.md §6 `complete(system_prompt, history, tools)`).
pub fn pruned_history_json(investigation: &Investigation, token_budget: f64, recent_window: usize) -> Vec<String> {
    let items = to_history_items(investigation);
    let pruned = riskgraph_kernel::history::prune_history(&items, token_budget, recent_window);
    pruned.into_iter().map(|item| item.text).collect()
}

/// Cumulative token estimate over the *full*, unpruned transcript (spec.md
/// §9 "Budget as first-class" token budget), using the same 4-chars-per-
/// token heuristic C10's pruning uses. This is independent of
/// `pruned_history_json`'s pruned size, since the hard budget tracks real
/// accumulated usage rather than what C10 trims a single hop's prompt down
/// to.
pub fn total_estimated_tokens(investigation: &Investigation) -> f64 {
    to_history_items(investigation)
        .iter()
        .map(riskgraph_kernel::history::estimate_tokens)
        .sum()
}

#[allow(dead_code)]
fn _hop_record_shape_anchor(_h: HopRecord) {}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgraph_kernel::investigation::{
        ModificationType, Phase0Classification, ToolCallRecord,
    };
    use riskgraph_kernel::investigation::InvestigationBudgets;

    fn sample_investigation() -> Investigation {
        let mut inv = Investigation::new(
            "inv-1",
            "repo-1",
            Vec::new(),
            Phase0Classification {
                modification_type: ModificationType::General,
                reason: "unclassified".into(),
            },
            InvestigationBudgets::default(),
        );
        inv.hops.push(HopRecord {
            hop: 1,
            tool_calls: vec![ToolCallRecord {
                tool_name: "incidents_with_context".into(),
                arguments_json: "{}".into(),
                result_json: "[{\"issue_number\": 87}]".into(),
            }],
            confidence: None,
        });
        inv.hops.push(HopRecord {
            hop: 2,
            tool_calls: vec![ToolCallRecord {
                tool_name: "recent_commits".into(),
                arguments_json: "{}".into(),
                result_json: "[]".into(),
            }],
            confidence: None,
        });
        inv
    }

    #[test]
    fn tool_value_lookup_matches_spec_table() {
        assert_eq!(
            classify_tool_value("incidents_with_context").tool_value(),
            1.0
        );
        assert_eq!(
            classify_tool_value("ownership_timeline").tool_value(),
            0.8
        );
        assert_eq!(classify_tool_value("blast_radius").tool_value(), 0.7);
        assert_eq!(classify_tool_value("recent_commits").tool_value(), 0.4);
        assert_eq!(classify_tool_value("confidence_report").tool_value(), 0.0);
    }

    #[test]
    fn density_is_bounded() {
        assert_eq!(identifier_density(""), 0.0);
        let dense = "abc123def 456789a #87 src/main.rs #12 deadbeefcafe";
        assert!(identifier_density(dense) > 0.0);
        assert!(identifier_density(dense) <= 1.0);
    }

    #[test]
    fn ages_count_backward_from_current_hop() {
        let inv = sample_investigation();
        let items = to_history_items(&inv);
        // hop 1 is older than hop 2 -- current_hop() is 2, so hop 1 has age 1.
        assert_eq!(items[0].age_in_hops, 1);
        assert_eq!(items[1].age_in_hops, 0);
    }

    #[test]
    fn pruned_history_respects_recent_window_invariant() {
        let mut inv = sample_investigation();
        for hop in 3..20 {
            inv.hops.push(HopRecord {
                hop,
                tool_calls: vec![ToolCallRecord {
                    tool_name: "recent_commits".into(),
                    arguments_json: "{}".into(),
                    result_json: "x".repeat(5_000),
                }],
                confidence: None,
            });
        }
        let pruned = pruned_history_json(&inv, 200.0, 2);
        let last_item_text = &inv.hops.last().unwrap().tool_calls[0].result_json;
        assert!(pruned.iter().any(|text| text.contains(last_item_text)));
    }
}
