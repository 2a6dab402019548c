//! Confidence tracking, breakthrough detection, and the stopping-rule
//! state machine from spec.md §4.9. Pure functions over typed facts, in the
//! "facts in, decision out" style the kernel uses throughout.

use serde::{Deserialize, Serialize};

use crate::risk::{risk_level_for_score, RiskLevel};

/// What the model recommends after a hop, beyond its bare confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    Finalize,
    GatherMoreEvidence,
    ExpandGraph,
}

/// One hop's structured self-assessment (spec.md §4.9 "Confidence
/// tracking").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidencePoint {
    pub hop: u32,
    pub confidence: f64,
    pub reasoning: String,
    pub next_action: NextAction,
    pub risk_score: f64,
}

/// A risk-score swing of >= 0.2 between consecutive hops (spec.md
/// glossary: "Breakthrough").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakthrough {
    pub at_hop: u32,
    pub before_risk: RiskLevel,
    pub after_risk: RiskLevel,
    pub before_score: f64,
    pub after_score: f64,
    pub escalation: bool,
    pub triggering_evidence: String,
}

pub const BREAKTHROUGH_THRESHOLD: f64 = 0.2;

/// Compares two consecutive risk scores and returns a `Breakthrough` if the
/// swing meets or exceeds the threshold. `triggering_evidence` should be the
/// latest tool result per spec.md §4.9.
pub fn detect_breakthrough(
    at_hop: u32,
    before_score: f64,
    after_score: f64,
    triggering_evidence: impl Into<String>,
) -> Option<Breakthrough> {
    let delta = after_score - before_score;
    if delta.abs() < BREAKTHROUGH_THRESHOLD {
        return None;
    }
    Some(Breakthrough {
        at_hop,
        before_risk: risk_level_for_score(before_score),
        after_risk: risk_level_for_score(after_score),
        before_score,
        after_score,
        escalation: delta > 0.0,
        triggering_evidence: triggering_evidence.into(),
    })
}

/// Facts relevant to the stopping-rule decision for the current hop (spec.md
/// §4.9 "Stopping rules").
#[derive(Debug, Clone, Copy)]
pub struct HopFacts {
    pub hop: u32,
    pub max_hops: u32,
    pub last_confidence: Option<f64>,
    pub last_next_action: Option<NextAction>,
    pub had_tool_calls: bool,
    pub text_was_parsable: bool,
    pub token_budget_exceeded: bool,
    pub finalize_confidence_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingDecision {
    Continue,
    RequestFinish,
    EmergencyAssessment(EmergencyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyReason {
    MaxHopsReached,
    UnparsableWithoutToolCalls,
    TokenBudgetExceeded,
}

/// Evaluates the stopping rules in the fixed order spec.md §4.9 specifies
/// ("first match wins").
pub fn evaluate_stopping_rule(facts: HopFacts) -> StoppingDecision {
    if let (Some(confidence), Some(NextAction::Finalize)) =
        (facts.last_confidence, facts.last_next_action)
    {
        if confidence >= facts.finalize_confidence_threshold {
            return StoppingDecision::RequestFinish;
        }
    }

    if facts.hop >= facts.max_hops {
        return StoppingDecision::EmergencyAssessment(EmergencyReason::MaxHopsReached);
    }

    if !facts.had_tool_calls && !facts.text_was_parsable {
        return StoppingDecision::EmergencyAssessment(
            EmergencyReason::UnparsableWithoutToolCalls,
        );
    }

    if facts.token_budget_exceeded {
        return StoppingDecision::EmergencyAssessment(EmergencyReason::TokenBudgetExceeded);
    }

    StoppingDecision::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_facts() -> HopFacts {
        HopFacts {
            hop: 3,
            max_hops: 30,
            last_confidence: None,
            last_next_action: None,
            had_tool_calls: true,
            text_was_parsable: true,
            token_budget_exceeded: false,
            finalize_confidence_threshold: 0.85,
        }
    }

    #[test]
    fn breakthrough_requires_threshold() {
        assert!(detect_breakthrough(1, 0.3, 0.45, "evidence").is_none());
        let b = detect_breakthrough(1, 0.3, 0.5, "evidence").unwrap();
        assert!(b.escalation);
        assert_eq!(b.before_risk, RiskLevel::Low);
        assert_eq!(b.after_risk, RiskLevel::Medium);
    }

    #[test]
    fn breakthrough_detects_de_escalation() {
        let b = detect_breakthrough(4, 0.9, 0.5, "evidence").unwrap();
        assert!(!b.escalation);
    }

    #[test]
    fn finalize_requires_confidence_threshold() {
        let mut facts = base_facts();
        facts.last_confidence = Some(0.5);
        facts.last_next_action = Some(NextAction::Finalize);
        assert_eq!(evaluate_stopping_rule(facts), StoppingDecision::Continue);

        facts.last_confidence = Some(0.9);
        assert_eq!(
            evaluate_stopping_rule(facts),
            StoppingDecision::RequestFinish
        );
    }

    #[test]
    fn max_hops_wins_over_continue() {
        let mut facts = base_facts();
        facts.hop = 30;
        facts.max_hops = 30;
        assert_eq!(
            evaluate_stopping_rule(facts),
            StoppingDecision::EmergencyAssessment(EmergencyReason::MaxHopsReached)
        );
    }

    #[test]
    fn unparsable_without_tool_calls_is_emergency() {
        let mut facts = base_facts();
        facts.had_tool_calls = false;
        facts.text_was_parsable = false;
        assert_eq!(
            evaluate_stopping_rule(facts),
            StoppingDecision::EmergencyAssessment(EmergencyReason::UnparsableWithoutToolCalls)
        );
    }

    #[test]
    fn token_budget_exceeded_is_emergency_when_nothing_else_matches() {
        let mut facts = base_facts();
        facts.token_budget_exceeded = true;
        assert_eq!(
            evaluate_stopping_rule(facts),
            StoppingDecision::EmergencyAssessment(EmergencyReason::TokenBudgetExceeded)
        );
    }

    #[test]
    fn order_prefers_finish_over_max_hops() {
        let mut facts = base_facts();
        facts.hop = 30;
        facts.max_hops = 30;
        facts.last_confidence = Some(0.9);
        facts.last_next_action = Some(NextAction::Finalize);
        assert_eq!(
            evaluate_stopping_rule(facts),
            StoppingDecision::RequestFinish
        );
    }
}
