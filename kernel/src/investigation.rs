//! The `Investigation` state object (spec.md §4.9, §9 "Agent control
//! flow"): a plain struct carrying everything the loop needs, rather than a
//! hidden-state coroutine, so it can be checkpointed mid-investigation.

use serde::{Deserialize, Serialize};

use crate::confidence::{Breakthrough, ConfidencePoint};
use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestigationState {
    Initialized,
    Phase1Running,
    Phase2Investigating,
    AwaitingHuman,
    Complete,
}

/// One changed file as presented to the investigator (spec.md §4.7 point
/// 4, §6 `Investigate(request)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub current_path: String,
    pub change_status: ChangeStatus,
    pub additions: u32,
    pub deletions: u32,
    pub truncated_diff: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// The Phase-0 classifier's verdict, consumed as a typed field (spec.md
/// §1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModificationType {
    Security,
    Documentation,
    Tests,
    Config,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase0Classification {
    pub modification_type: ModificationType,
    pub reason: String,
}

/// A single tool invocation and its result, recorded for audit (spec.md
/// §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments_json: String,
    pub result_json: String,
}

/// One iteration of the investigation loop (spec.md glossary: "Hop").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopRecord {
    pub hop: u32,
    pub tool_calls: Vec<ToolCallRecord>,
    pub confidence: Option<ConfidencePoint>,
}

/// The final structured answer (spec.md §4.8, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub summary: String,
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub evidence: Vec<String>,
    pub emergency: bool,
}

impl RiskAssessment {
    /// The conservative fallback returned when budgets are exceeded or
    /// model output is unusable (spec.md §7, §8 property 7).
    pub fn emergency(reason: &str, evidence: Vec<String>) -> Self {
        RiskAssessment {
            risk_level: RiskLevel::Medium,
            confidence: 0.3,
            summary: format!("Investigation incomplete: {reason}"),
            reasoning: reason.to_string(),
            recommendations: Vec::new(),
            evidence,
            emergency: true,
        }
    }
}

/// A pause point requesting a user decision (spec.md §4.9.4, glossary:
/// "Directive").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveMessage {
    pub proposed_action: String,
    pub contingencies: Vec<ContingencyBranch>,
    pub options: Vec<DirectiveOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencyBranch {
    pub if_user_says: String,
    pub then_do: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveOption {
    pub shortcut_key: char,
    pub label: String,
}

/// Budgets are configuration inputs that affect correctness (spec.md §9
/// "Budget as first-class"), so they are carried on the record itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvestigationBudgets {
    pub max_hops: u32,
    pub hop_timeout_secs: u64,
    pub total_timeout_secs: u64,
    pub history_token_budget: f64,
    /// Hard ceiling on cumulative conversation tokens (spec.md §9 "Budget
    /// as first-class", distinct from `history_token_budget`, which only
    /// governs C10's per-hop pruning target). Exceeding this stops the
    /// loop with an emergency assessment rather than pruning further.
    pub hard_token_budget: f64,
}

impl Default for InvestigationBudgets {
    fn default() -> Self {
        InvestigationBudgets {
            max_hops: 30,
            hop_timeout_secs: 60,
            total_timeout_secs: 600,
            history_token_budget: 2_000.0,
            hard_token_budget: 50_000.0,
        }
    }
}

/// The full state object the loop in C9 threads through every hop and
/// that C11 checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub repo_id: String,
    pub changed_files: Vec<ChangedFile>,
    pub phase0: Phase0Classification,
    pub state: InvestigationState,
    pub budgets: InvestigationBudgets,
    pub hops: Vec<HopRecord>,
    pub confidence_points: Vec<ConfidencePoint>,
    pub breakthroughs: Vec<Breakthrough>,
    pub pending_directive: Option<DirectiveMessage>,
    pub final_assessment: Option<RiskAssessment>,
}

impl Investigation {
    pub fn new(
        id: impl Into<String>,
        repo_id: impl Into<String>,
        changed_files: Vec<ChangedFile>,
        phase0: Phase0Classification,
        budgets: InvestigationBudgets,
    ) -> Self {
        Investigation {
            id: id.into(),
            repo_id: repo_id.into(),
            changed_files,
            phase0,
            state: InvestigationState::Initialized,
            budgets,
            hops: Vec::new(),
            confidence_points: Vec::new(),
            breakthroughs: Vec::new(),
            pending_directive: None,
            final_assessment: None,
        }
    }

    pub fn is_resumable(&self) -> bool {
        !matches!(self.state, InvestigationState::Complete)
    }

    pub fn current_hop(&self) -> u32 {
        self.hops.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_investigation_is_resumable() {
        let inv = Investigation::new(
            "inv-1",
            "repo-1",
            Vec::new(),
            Phase0Classification {
                modification_type: ModificationType::General,
                reason: "unclassified".into(),
            },
            InvestigationBudgets::default(),
        );
        assert!(inv.is_resumable());
        assert_eq!(inv.current_hop(), 0);
    }

    #[test]
    fn complete_investigation_is_not_resumable() {
        let mut inv = Investigation::new(
            "inv-2",
            "repo-1",
            Vec::new(),
            Phase0Classification {
                modification_type: ModificationType::General,
                reason: "unclassified".into(),
            },
            InvestigationBudgets::default(),
        );
        inv.state = InvestigationState::Complete;
        assert!(!inv.is_resumable());
    }

    #[test]
    fn emergency_assessment_is_marked() {
        let assessment = RiskAssessment::emergency("max hops reached", vec!["ev1".into()]);
        assert!(assessment.emergency);
        assert!(assessment.summary.starts_with("Investigation incomplete"));
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert!((assessment.confidence - 0.3).abs() < 1e-9);
    }
}
