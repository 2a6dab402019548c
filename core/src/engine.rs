//! C9 Investigation Engine: the bounded hop loop that drives an
//! `Investigation` to a `RiskAssessment` (spec.md §4.9). Generic over
//! `LlmProviderPort` rather than bound to any concrete model client --
//! production callers supply their own binding the same way `link_resolver`
//! and `kickoff` do.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::timeout;

use riskgraph_kernel::confidence::{
    detect_breakthrough, evaluate_stopping_rule, ConfidencePoint, EmergencyReason, HopFacts,
    NextAction, StoppingDecision,
};
use riskgraph_kernel::investigation::{HopRecord, Investigation, InvestigationState, RiskAssessment, ToolCallRecord};
use riskgraph_kernel::ports::{LlmProviderPort, LlmToolCall, LlmTurn};
use riskgraph_kernel::risk::{derive_risk_score, risk_level_for_score, RiskLevel, RiskSignals};

use crate::history::{pruned_history_json, total_estimated_tokens};
use crate::query::{BlastRadiusEntry, CochangePartner, IncidentEvidence, OwnershipEntry, QueryPort};
use crate::tools::{self, CONFIDENCE_REPORT, FINISH_INVESTIGATION};

/// Reminder folded into every system prompt (spec.md §4.9 "the model must
/// reason from evidence to a conclusion, not select a conclusion and search
/// for supporting evidence"). The engine doesn't enforce this by parsing
/// the model's prose; it enforces the *consequence* by deriving
/// `risk_score`/`risk_level` itself from `RiskSignals` rather than trusting
/// whatever the model names in `finish_investigation`.
pub const BACKWARDS_LOGIC_GUARD: &str = "Base your risk_level and summary on the evidence you gathered, not the reverse: do not pick a conclusion and select supporting evidence for it. The engine independently derives its own risk score from the evidence in this conversation and will flag a mismatch with your stated risk_level.";

/// Typed progress emitted as the loop runs, mirroring the corpus's
/// `ProgressHook`/`mpsc::Sender<ProgressEvent>` pattern rather than a
/// rendering directive -- callers decide how (or whether) to display it.
#[derive(Debug, Clone, serde::Serialize)]
pub enum ProgressEvent {
    HopStarted { hop: u32 },
    ToolCallCompleted { hop: u32, tool_name: String },
    ConfidenceReported { hop: u32, confidence: f64, next_action: String },
    Breakthrough { hop: u32, before_score: f64, after_score: f64 },
    Finished { risk_level: String },
    EmergencyAssessment { reason: String },
}

pub struct InvestigationEngine<'a, L: LlmProviderPort, Q: QueryPort> {
    query: &'a Q,
    llm: &'a L,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl<'a, L: LlmProviderPort, Q: QueryPort> InvestigationEngine<'a, L, Q> {
    pub fn new(query: &'a Q, llm: &'a L) -> Self {
        InvestigationEngine {
            query,
            llm,
            progress: None,
        }
    }

    pub fn with_progress(query: &'a Q, llm: &'a L, progress: mpsc::Sender<ProgressEvent>) -> Self {
        InvestigationEngine {
            query,
            llm,
            progress: Some(progress),
        }
    }

    async fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event).await;
        }
    }

    /// Runs the hop loop to completion. Per spec.md §8 property 7
    /// ("Investigate never returns an error to its caller"), every path out
    /// of this function is a plain `Investigation` with either a
    /// `final_assessment` set or an `emergency` one synthesized locally --
    /// `InvestigationError` is only used internally to short-circuit a
    /// single hop's `?`-chain, never surfaced.
    pub async fn run(&self, mut investigation: Investigation, system_prompt: &str) -> Investigation {
        investigation.state = InvestigationState::Phase2Investigating;
        let started = Instant::now();
        let total_budget = Duration::from_secs(investigation.budgets.total_timeout_secs);
        let full_system_prompt = format!("{system_prompt}\n\n{BACKWARDS_LOGIC_GUARD}");

        loop {
            if started.elapsed() > total_budget {
                return self.finish_emergency(investigation, EmergencyReason::TokenBudgetExceeded).await;
            }

            let hop = investigation.current_hop() + 1;
            self.emit(ProgressEvent::HopStarted { hop }).await;

            let history = pruned_history_json(
                &investigation,
                investigation.budgets.history_token_budget,
                2,
            );

            let hop_timeout = Duration::from_secs(investigation.budgets.hop_timeout_secs);
            let turn = match timeout(hop_timeout, self.llm.complete(&full_system_prompt, &history, &tools::schemas())).await {
                Ok(Ok(turn)) => turn,
                Ok(Err(e)) => return self.finish_llm_error(investigation, e.to_string()).await,
                Err(_) => return self.finish_emergency(investigation, EmergencyReason::TokenBudgetExceeded).await,
            };

            match turn {
                LlmTurn::ToolCalls(calls) => {
                    let (record, confidence, finish_call) = self.run_hop_tool_calls(hop, calls).await;
                    investigation.hops.push(record);

                    if let Some(point) = confidence {
                        if let Some(previous) = investigation.confidence_points.last() {
                            if let Some(breakthrough) = detect_breakthrough(
                                hop,
                                previous.risk_score,
                                point.risk_score,
                                evidence_so_far(&investigation),
                            ) {
                                self.emit(ProgressEvent::Breakthrough {
                                    hop,
                                    before_score: breakthrough.before_score,
                                    after_score: breakthrough.after_score,
                                })
                                .await;
                                investigation.breakthroughs.push(breakthrough);
                            }
                        }
                        self.emit(ProgressEvent::ConfidenceReported {
                            hop,
                            confidence: point.confidence,
                            next_action: format!("{:?}", point.next_action),
                        })
                        .await;
                        investigation.confidence_points.push(point);
                    }

                    if let Some(call) = finish_call {
                        return self.finish(investigation, call).await;
                    }

                    let facts = self.hop_facts(&investigation, hop, true, true);
                    match evaluate_stopping_rule(facts) {
                        StoppingDecision::RequestFinish => {
                            match self.request_finish_call(&investigation, &full_system_prompt).await {
                                Some(call) => return self.finish(investigation, call).await,
                                None => {
                                    return self
                                        .finish_emergency(investigation, EmergencyReason::UnparsableWithoutToolCalls)
                                        .await
                                }
                            }
                        }
                        StoppingDecision::EmergencyAssessment(reason) => {
                            return self.finish_emergency(investigation, reason).await
                        }
                        StoppingDecision::Continue => continue,
                    }
                }
                LlmTurn::Text(text) => {
                    // A bare text turn with no tool calls is only acceptable
                    // as a `finish_investigation`-equivalent if it round-trips
                    // through the same JSON shape the tool expects; anything
                    // else needs the one clarifying retry spec.md §7 allows
                    // for "Model-output" errors before an emergency
                    // assessment.
                    if let Some(assessment) = parse_finish_text(&text) {
                        investigation.state = InvestigationState::Complete;
                        investigation.final_assessment = Some(self.reconcile_risk(&investigation, assessment));
                        self.emit(ProgressEvent::Finished {
                            risk_level: investigation.final_assessment.as_ref().unwrap().risk_level.to_string(),
                        })
                        .await;
                        return investigation;
                    }

                    let facts = self.hop_facts(&investigation, hop, false, false);
                    match evaluate_stopping_rule(facts) {
                        StoppingDecision::EmergencyAssessment(reason) => {
                            return self.finish_emergency(investigation, reason).await
                        }
                        _ => {
                            if let Some(assessment) = self.retry_finish_via_clarifying_turn(&investigation, &full_system_prompt).await {
                                investigation.state = InvestigationState::Complete;
                                investigation.final_assessment = Some(self.reconcile_risk(&investigation, assessment));
                                return investigation;
                            }
                            return self
                                .finish_emergency(investigation, EmergencyReason::UnparsableWithoutToolCalls)
                                .await;
                        }
                    }
                }
            }
        }
    }

    fn hop_facts(&self, investigation: &Investigation, hop: u32, had_tool_calls: bool, text_was_parsable: bool) -> HopFacts {
        let last = investigation.confidence_points.last();
        HopFacts {
            hop,
            max_hops: investigation.budgets.max_hops,
            last_confidence: last.map(|p| p.confidence),
            last_next_action: last.map(|p| p.next_action),
            had_tool_calls,
            text_was_parsable,
            token_budget_exceeded: total_estimated_tokens(investigation) > investigation.budgets.hard_token_budget,
            finalize_confidence_threshold: 0.85,
        }
    }

    /// Dispatches every non-`confidence_report`/`finish_investigation` call
    /// to C6, extracts a `confidence_report` call's payload if present, and
    /// returns any `finish_investigation` call untouched for the caller to
    /// finalize with (spec.md §4.9 loop contract points 2-4).
    async fn run_hop_tool_calls(
        &self,
        hop: u32,
        calls: Vec<LlmToolCall>,
    ) -> (HopRecord, Option<ConfidencePoint>, Option<LlmToolCall>) {
        let mut tool_calls = Vec::new();
        let mut confidence = None;
        let mut finish_call = None;

        for call in calls {
            match call.tool_name.as_str() {
                CONFIDENCE_REPORT => {
                    if let Some(point) = parse_confidence_report(hop, &call.arguments_json, &self.evidence_signals_from_call(&call)) {
                        confidence = Some(point);
                    }
                }
                FINISH_INVESTIGATION => {
                    finish_call = Some(call);
                }
                _ => {
                    let result_json = tools::dispatch(self.query, &call).await;
                    self.emit(ProgressEvent::ToolCallCompleted {
                        hop,
                        tool_name: call.tool_name.clone(),
                    })
                    .await;
                    tool_calls.push(ToolCallRecord {
                        tool_name: call.tool_name,
                        arguments_json: call.arguments_json,
                        result_json,
                    });
                }
            }
        }

        // A confidence_report riding alongside data-query calls has no
        // evidence of its own to scan; its risk_score is derived from the
        // hop's own tool results instead.
        if let Some(point) = &mut confidence {
            let signals = risk_signals_from_tool_calls(&tool_calls);
            point.risk_score = derive_risk_score(signals);
        }

        (HopRecord { hop, tool_calls, confidence: confidence.clone() }, confidence, finish_call)
    }

    fn evidence_signals_from_call(&self, _call: &LlmToolCall) -> RiskSignals {
        RiskSignals::default()
    }

    /// Asks the model, in a fresh turn, to call `finish_investigation` now
    /// that confidence has crossed the finalize threshold (spec.md §4.9
    /// "Stopping rules" `RequestFinish`).
    async fn request_finish_call(&self, investigation: &Investigation, system_prompt: &str) -> Option<LlmToolCall> {
        let history = pruned_history_json(investigation, investigation.budgets.history_token_budget, 2);
        let prompt = format!("{system_prompt}\n\nYour confidence threshold has been met. Call finish_investigation now.");
        let turn = self.llm.complete(&prompt, &history, &tools::schemas()).await.ok()?;
        match turn {
            LlmTurn::ToolCalls(calls) => calls.into_iter().find(|c| c.tool_name == FINISH_INVESTIGATION),
            LlmTurn::Text(_) => None,
        }
    }

    /// One retry via a clarifying turn for unparsable model output (spec.md
    /// §7 "Model-output" error kind: "one retry via a clarifying turn; on
    /// second failure, emergency assessment").
    async fn retry_finish_via_clarifying_turn(&self, investigation: &Investigation, system_prompt: &str) -> Option<RiskAssessment> {
        let history = pruned_history_json(investigation, investigation.budgets.history_token_budget, 2);
        let prompt = format!("{system_prompt}\n\nYour previous response could not be parsed. Respond only with a finish_investigation tool call.");
        let turn = self.llm.complete(&prompt, &history, &tools::schemas()).await.ok()?;
        match turn {
            LlmTurn::ToolCalls(calls) => {
                let call = calls.into_iter().find(|c| c.tool_name == FINISH_INVESTIGATION)?;
                parse_finish_call(&call.arguments_json)
            }
            LlmTurn::Text(text) => parse_finish_text(&text),
        }
    }

    async fn finish(&self, mut investigation: Investigation, call: LlmToolCall) -> Investigation {
        let Some(assessment) = parse_finish_call(&call.arguments_json) else {
            // Malformed finish call gets the same one-retry-then-emergency
            // treatment as unparsable text (spec.md §7).
            let hop = investigation.current_hop();
            let history = pruned_history_json(&investigation, investigation.budgets.history_token_budget, 2);
            let retry_prompt = "Your finish_investigation call was malformed. Call it again with all required fields.";
            let retried = self.llm.complete(retry_prompt, &history, &tools::schemas()).await;
            if let Ok(LlmTurn::ToolCalls(calls)) = retried {
                if let Some(retry_call) = calls.into_iter().find(|c| c.tool_name == FINISH_INVESTIGATION) {
                    if let Some(assessment) = parse_finish_call(&retry_call.arguments_json) {
                        investigation.state = InvestigationState::Complete;
                        investigation.final_assessment = Some(self.reconcile_risk(&investigation, assessment));
                        return investigation;
                    }
                }
            }
            let _ = hop;
            return self.finish_emergency(investigation, EmergencyReason::UnparsableWithoutToolCalls).await;
        };

        investigation.state = InvestigationState::Complete;
        let reconciled = self.reconcile_risk(&investigation, assessment);
        self.emit(ProgressEvent::Finished {
            risk_level: reconciled.risk_level.to_string(),
        })
        .await;
        investigation.final_assessment = Some(reconciled);
        investigation
    }

    /// Overrides the model-supplied `risk_level` with the engine's own
    /// evidence-derived score when they disagree by more than one level,
    /// per `BACKWARDS_LOGIC_GUARD` -- the model's narrative is kept, but the
    /// headline verdict is not solely the model's to set.
    fn reconcile_risk(&self, investigation: &Investigation, mut assessment: RiskAssessment) -> RiskAssessment {
        let signals = risk_signals_from_tool_calls(&investigation.hops.iter().flat_map(|h| h.tool_calls.clone()).collect::<Vec<_>>());
        let derived_score = derive_risk_score(signals);
        let derived_level = risk_level_for_score(derived_score);
        if level_distance(derived_level, assessment.risk_level) > 1 {
            tracing::warn!(
                model_level = %assessment.risk_level,
                derived_level = %derived_level,
                derived_score,
                "model risk_level disagreed sharply with evidence-derived score; overriding"
            );
            assessment.risk_level = derived_level;
        }
        assessment
    }

    async fn finish_emergency(&self, mut investigation: Investigation, reason: EmergencyReason) -> Investigation {
        investigation.state = InvestigationState::Complete;
        let text = emergency_reason_text(reason);
        self.emit(ProgressEvent::EmergencyAssessment { reason: text.to_string() }).await;
        investigation.final_assessment = Some(RiskAssessment::emergency(text, evidence_so_far_list(&investigation)));
        investigation
    }

    async fn finish_llm_error(&self, investigation: Investigation, message: String) -> Investigation {
        tracing::warn!(error = %message, "llm provider error; falling back to emergency assessment");
        self.finish_emergency(investigation, EmergencyReason::UnparsableWithoutToolCalls).await
    }
}

fn level_distance(a: RiskLevel, b: RiskLevel) -> i32 {
    fn rank(level: RiskLevel) -> i32 {
        match level {
            RiskLevel::Minimal => 0,
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
            RiskLevel::Critical => 4,
        }
    }
    (rank(a) - rank(b)).abs()
}

fn emergency_reason_text(reason: EmergencyReason) -> &'static str {
    match reason {
        EmergencyReason::MaxHopsReached => "maximum hop count reached before the model finalized",
        EmergencyReason::UnparsableWithoutToolCalls => "model response could not be parsed and made no tool calls",
        EmergencyReason::TokenBudgetExceeded => "token or wall-clock budget exceeded before the model finalized",
    }
}

fn evidence_so_far(investigation: &Investigation) -> String {
    investigation
        .hops
        .last()
        .and_then(|hop| hop.tool_calls.last())
        .map(|call| call.result_json.clone())
        .unwrap_or_default()
}

fn evidence_so_far_list(investigation: &Investigation) -> Vec<String> {
    investigation
        .hops
        .iter()
        .flat_map(|hop| hop.tool_calls.iter().map(|c| format!("{}: {}", c.tool_name, c.result_json)))
        .collect()
}

fn parse_confidence_report(hop: u32, arguments_json: &str, _signals: &RiskSignals) -> Option<ConfidencePoint> {
    let value: serde_json::Value = serde_json::from_str(arguments_json).ok()?;
    let confidence = value.get("confidence")?.as_f64()?;
    let reasoning = value.get("reasoning")?.as_str()?.to_string();
    let next_action = match value.get("next_action")?.as_str()? {
        "FINALIZE" => NextAction::Finalize,
        "GATHER_MORE_EVIDENCE" => NextAction::GatherMoreEvidence,
        "EXPAND_GRAPH" => NextAction::ExpandGraph,
        _ => return None,
    };
    Some(ConfidencePoint {
        hop,
        confidence,
        reasoning,
        next_action,
        risk_score: 0.0,
    })
}

fn parse_finish_call(arguments_json: &str) -> Option<RiskAssessment> {
    let value: serde_json::Value = serde_json::from_str(arguments_json).ok()?;
    parse_finish_value(&value)
}

fn parse_finish_text(text: &str) -> Option<RiskAssessment> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    parse_finish_value(&value)
}

fn parse_finish_value(value: &serde_json::Value) -> Option<RiskAssessment> {
    let risk_level = value.get("risk_level")?.as_str()?.parse().ok()?;
    let confidence = value.get("confidence")?.as_f64()?;
    let summary = value.get("summary")?.as_str()?.to_string();
    let reasoning = value.get("reasoning")?.as_str()?.to_string();
    let recommendations = value
        .get("recommendations")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let evidence = value
        .get("evidence")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    Some(RiskAssessment {
        risk_level,
        confidence,
        summary,
        reasoning,
        recommendations,
        evidence,
        emergency: false,
    })
}

/// Scans a batch of tool results for the three evidence signals
/// `derive_risk_score` weighs (spec.md §4.9 "Risk score derivation"). Each
/// signal is the maximum seen across every relevant result in the batch,
/// not an average -- one severe incident should move the score even if
/// every other result this hop was quiet.
fn risk_signals_from_tool_calls(calls: &[ToolCallRecord]) -> RiskSignals {
    let mut signals = RiskSignals::default();
    for call in calls {
        match call.tool_name.as_str() {
            "incidents_with_context" => {
                if let Ok(incidents) = serde_json::from_str::<Vec<IncidentEvidence>>(&call.result_json) {
                    let severity = (incidents.len() as f64 / 3.0).min(1.0);
                    signals.incident_severity = signals.incident_severity.max(severity);
                }
            }
            "cochange_with_context" => {
                if let Ok(partners) = serde_json::from_str::<Vec<CochangePartner>>(&call.result_json) {
                    let severity = partners.iter().map(|p| p.frequency).fold(0.0_f64, f64::max);
                    signals.cochange_severity = signals.cochange_severity.max(severity);
                }
            }
            "blast_radius" => {
                if let Ok(entries) = serde_json::from_str::<Vec<BlastRadiusEntry>>(&call.result_json) {
                    let severity = entries.iter().map(|e| e.cochange_frequency).fold(0.0_f64, f64::max);
                    signals.cochange_severity = signals.cochange_severity.max(severity);
                }
            }
            "ownership_timeline" => {
                if let Ok(entries) = serde_json::from_str::<Vec<OwnershipEntry>>(&call.result_json) {
                    if !entries.is_empty() {
                        let inactive = entries.iter().filter(|e| !e.active).count() as f64;
                        signals.ownership_staleness = signals.ownership_staleness.max(inactive / entries.len() as f64);
                    }
                }
            }
            _ => {}
        }
    }
    signals
}
