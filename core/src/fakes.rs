//! In-process fakes for the four collaborator ports (spec.md §6) plus the
//! six `QueryPort` operations, used by unit and integration tests that want
//! to drive C9's hop loop or C4's phase ordering without a live LLM, GitHub
//! fetcher, or Neo4j instance. Mirrors the corpus's own pattern of keeping
//! fakes behind a feature flag (`mock_llm` in the teacher's own config,
//! generalized here to `integration_testing` so `riskgraph-tests` can reach
//! them from outside the crate).

use std::sync::Mutex;

use riskgraph_kernel::investigation::Phase0Classification;
use riskgraph_kernel::ports::{
    IssueRecord, LlmProviderPort, LlmToolCall, LlmToolSchema, LlmTurn, Phase0ClassifierPort,
    Phase1MetricsPort, PortFuture, RepositoryFetcherPort, RepositoryPage,
};
use riskgraph_kernel::prompt::Phase1Metrics;

use crate::error::QueryError;
use crate::query::{
    BlastRadiusEntry, CochangePartner, IncidentEvidence, OwnershipEntry, QueryPort, RecentCommit,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum FakeError {
    #[error("fake script exhausted: no more scripted turns")]
    ScriptExhausted,
    #[error("fake error: {0}")]
    Other(String),
}

/// Replays a fixed sequence of `LlmTurn`s, one per call to `complete`, so a
/// scripted hop-by-hop conversation is reproducible byte-for-byte (spec.md
/// §8 property 4, "Investigation determinism up to LLM").
pub struct ScriptedLlm {
    turns: Mutex<Vec<LlmTurn>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    /// `turns` is consumed front-to-back; pass them in call order.
    pub fn new(turns: Vec<LlmTurn>) -> Self {
        let mut turns = turns;
        turns.reverse();
        ScriptedLlm {
            turns: Mutex::new(turns),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The system prompts the engine sent, in call order -- lets a test
    /// assert the backwards-logic guard text actually reached the model.
    pub fn system_prompts_seen(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl LlmProviderPort for ScriptedLlm {
    type Error = FakeError;

    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        _history_json: &'a [String],
        _tools: &'a [LlmToolSchema],
    ) -> PortFuture<'a, LlmTurn, Self::Error> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(system_prompt.to_string());
            self.turns
                .lock()
                .unwrap()
                .pop()
                .ok_or(FakeError::ScriptExhausted)
        })
    }
}

/// A `ScriptedLlm` that always returns the same turn, for tests that only
/// care about one hop's shape (e.g. an immediate `finish_investigation`).
pub fn single_turn_llm(turn: LlmTurn) -> ScriptedLlm {
    ScriptedLlm::new(vec![turn])
}

/// Builds a `finish_investigation` tool call with the given fields, the
/// shape the engine expects to parse off the wire.
pub fn finish_call(risk_level: &str, confidence: f64, summary: &str, reasoning: &str) -> LlmToolCall {
    LlmToolCall {
        id: "call-finish".to_string(),
        tool_name: "finish_investigation".to_string(),
        arguments_json: serde_json::json!({
            "risk_level": risk_level,
            "confidence": confidence,
            "summary": summary,
            "reasoning": reasoning,
            "recommendations": [],
            "evidence": [],
        })
        .to_string(),
    }
}

pub fn confidence_report_call(confidence: f64, reasoning: &str, next_action: &str) -> LlmToolCall {
    LlmToolCall {
        id: "call-confidence".to_string(),
        tool_name: "confidence_report".to_string(),
        arguments_json: serde_json::json!({
            "confidence": confidence,
            "reasoning": reasoning,
            "next_action": next_action,
        })
        .to_string(),
    }
}

pub fn tool_call(id: &str, tool_name: &str, arguments: serde_json::Value) -> LlmToolCall {
    LlmToolCall {
        id: id.to_string(),
        tool_name: tool_name.to_string(),
        arguments_json: arguments.to_string(),
    }
}

/// Canned answers for every `QueryPort` operation; defaults to empty
/// results, a valid return per spec.md §4.6 ("Empty results are a valid
/// return, not an error").
#[derive(Debug, Clone, Default)]
pub struct FakeQueryResults {
    pub ownership: Vec<OwnershipEntry>,
    pub cochange: Vec<CochangePartner>,
    pub incidents: Vec<IncidentEvidence>,
    pub blast_radius: Vec<BlastRadiusEntry>,
    pub recent_commits: Vec<RecentCommit>,
    pub commit_patch: Option<String>,
}

pub struct FakeQueryPort(pub FakeQueryResults);

impl FakeQueryPort {
    pub fn new(results: FakeQueryResults) -> Self {
        FakeQueryPort(results)
    }

    pub fn empty() -> Self {
        FakeQueryPort(FakeQueryResults::default())
    }
}

impl QueryPort for FakeQueryPort {
    fn ownership_timeline<'a>(
        &'a self,
        _paths: &'a [String],
    ) -> PortFuture<'a, Vec<OwnershipEntry>, QueryError> {
        Box::pin(async move { Ok(self.0.ownership.clone()) })
    }

    fn cochange_with_context<'a>(
        &'a self,
        _paths: &'a [String],
        _min_freq: f64,
    ) -> PortFuture<'a, Vec<CochangePartner>, QueryError> {
        Box::pin(async move { Ok(self.0.cochange.clone()) })
    }

    fn incidents_with_context<'a>(
        &'a self,
        _paths: &'a [String],
        _days_back: i64,
    ) -> PortFuture<'a, Vec<IncidentEvidence>, QueryError> {
        Box::pin(async move { Ok(self.0.incidents.clone()) })
    }

    fn blast_radius<'a>(
        &'a self,
        _path: &'a str,
        _max_depth: u32,
        _min_freq: f64,
    ) -> PortFuture<'a, Vec<BlastRadiusEntry>, QueryError> {
        Box::pin(async move { Ok(self.0.blast_radius.clone()) })
    }

    fn recent_commits<'a>(
        &'a self,
        _paths: &'a [String],
        _limit: u32,
    ) -> PortFuture<'a, Vec<RecentCommit>, QueryError> {
        Box::pin(async move { Ok(self.0.recent_commits.clone()) })
    }

    fn commit_patch(&self, _sha: &str) -> Result<Option<String>, QueryError> {
        Ok(self.0.commit_patch.clone())
    }
}

/// Replays a fixed sequence of `RepositoryPage`s for `FetchPage`, one per
/// call, so C4 builder tests can exercise phase ordering without a live
/// GitHub fetcher (spec.md §6 "the core does no HTTP").
pub struct ScriptedFetcher {
    pages: Mutex<Vec<RepositoryPage>>,
}

impl ScriptedFetcher {
    pub fn new(pages: Vec<RepositoryPage>) -> Self {
        let mut pages = pages;
        pages.reverse();
        ScriptedFetcher {
            pages: Mutex::new(pages),
        }
    }

    pub fn single_page(page: RepositoryPage) -> Self {
        ScriptedFetcher::new(vec![page])
    }
}

impl RepositoryFetcherPort for ScriptedFetcher {
    type Error = FakeError;

    fn fetch_page<'a>(
        &'a self,
        _repo_id: &'a str,
        _cursor: Option<&'a str>,
    ) -> PortFuture<'a, RepositoryPage, Self::Error> {
        Box::pin(async move {
            self.pages
                .lock()
                .unwrap()
                .pop()
                .ok_or(FakeError::ScriptExhausted)
        })
    }
}

/// Fixed Phase 1 metrics for every path asked about, for kickoff-prompt
/// tests that don't need a live metrics service.
pub struct FixedPhase1Metrics(pub Phase1Metrics);

impl Phase1MetricsPort for FixedPhase1Metrics {
    type Error = FakeError;

    fn metrics_for_path<'a>(
        &'a self,
        _repo_id: &'a str,
        _path: &'a str,
    ) -> PortFuture<'a, Phase1Metrics, Self::Error> {
        Box::pin(async move { Ok(self.0) })
    }
}

/// Fixed Phase 0 classification for every diff, for kickoff/engine tests
/// that don't need a live classifier.
pub struct FixedPhase0Classifier(pub Phase0Classification);

impl Phase0ClassifierPort for FixedPhase0Classifier {
    type Error = FakeError;

    fn classify<'a>(&'a self, _diff_text: &'a str) -> PortFuture<'a, Phase0Classification, Self::Error> {
        let classification = self.0.clone();
        Box::pin(async move { Ok(classification) })
    }
}

/// Builds a minimal orphaned-issue record for link-resolver tests (spec.md
/// §4.3 input: "closed, no REFERENCES/CLOSED_BY edge").
pub fn orphaned_issue(number: i64, body: &str) -> IssueRecord {
    IssueRecord {
        number,
        title: format!("issue #{number}"),
        body: body.to_string(),
        state: "closed".to_string(),
        labels: Vec::new(),
        created_at: chrono::Utc::now() - chrono::Duration::days(14),
        closed_at: Some(chrono::Utc::now()),
        closure_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgraph_kernel::ports::LlmProviderPort as _;

    #[tokio::test]
    async fn scripted_llm_replays_turns_in_order() {
        let llm = ScriptedLlm::new(vec![
            LlmTurn::Text("first".to_string()),
            LlmTurn::Text("second".to_string()),
        ]);
        let first = llm.complete("sys", &[], &[]).await.unwrap();
        let second = llm.complete("sys", &[], &[]).await.unwrap();
        match (first, second) {
            (LlmTurn::Text(a), LlmTurn::Text(b)) => {
                assert_eq!(a, "first");
                assert_eq!(b, "second");
            }
            _ => panic!("expected text turns"),
        }
    }

    #[tokio::test]
    async fn scripted_llm_errors_once_exhausted() {
        let llm = ScriptedLlm::new(vec![]);
        assert!(llm.complete("sys", &[], &[]).await.is_err());
    }

    #[tokio::test]
    async fn fake_query_port_defaults_are_empty_not_error() {
        let query = FakeQueryPort::empty();
        let paths = vec!["a.rs".to_string()];
        let result = query.ownership_timeline(&paths).await.unwrap();
        assert!(result.is_empty());
    }
}
