//! C3 Link Resolver: recovers issue-to-fix links that GitHub's own timeline
//! never recorded, by asking the model for candidate references and
//! accepting only those two of three independent validators agree on
//! (spec.md §4.3).

use std::collections::HashSet;

use riskgraph_kernel::config::LinkResolverConfig;
use riskgraph_kernel::graph::{DetectedVia, InferredEdgeKind, NodeKey, ValidationFlags};
use riskgraph_kernel::ports::{IssueRecord, LlmProviderPort, LlmToolSchema, LlmTurn};

use crate::error::LinkResolverError;
use crate::graph_store::{GraphStore, InferredEdgeWrite};
use crate::staging::StagingStore;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Pr,
    Commit,
    Release,
}

/// One reference the model proposed for an orphaned issue (spec.md §4.3
/// step 2). The model is told not to invent references; an empty list is a
/// valid, expected response.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CandidateReference {
    pub issue_number: i64,
    pub target_type: TargetType,
    pub target_id: String,
    pub evidence_span: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct ResolverReport {
    pub issues_examined: usize,
    pub edges_written: usize,
    pub hallucinations_discarded: usize,
    pub collisions_skipped: usize,
    pub quarantined_batches: Vec<String>,
}

pub struct LinkResolver<'a, L: LlmProviderPort> {
    graph: &'a GraphStore,
    staging: &'a StagingStore,
    llm: &'a L,
    config: LinkResolverConfig,
    repo_id: String,
}

fn candidate_reference_tool_schema() -> LlmToolSchema {
    LlmToolSchema {
        name: "emit_candidate_references".to_string(),
        description: "Report candidate PR/commit/release references found in an issue's text. \
            Do not invent references that aren't actually present; an empty list is expected for \
            most issues.".to_string(),
        parameters_json_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "candidates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "issue_number": {"type": "integer"},
                            "target_type": {"type": "string", "enum": ["pr", "commit", "release"]},
                            "target_id": {"type": "string"},
                            "evidence_span": {"type": "string"},
                            "action": {"type": "string"}
                        },
                        "required": ["issue_number", "target_type", "target_id", "evidence_span"]
                    }
                }
            },
            "required": ["candidates"]
        })
        .to_string(),
    }
}

fn batch_prompt(issues: &[IssueRecord]) -> String {
    let mut prompt = String::from(
        "For each issue below, find references to pull requests, commits, or releases that \
         fixed it, using only the issue's own text. Call emit_candidate_references with your \
         findings. If an issue names nothing concrete, omit it from the list.\n\n",
    );
    for issue in issues {
        prompt.push_str(&format!(
            "### Issue #{}: {}\n{}\n\n",
            issue.number, issue.title, issue.body
        ));
    }
    prompt
}

impl<'a, L: LlmProviderPort> LinkResolver<'a, L> {
    pub fn new(
        graph: &'a GraphStore,
        staging: &'a StagingStore,
        llm: &'a L,
        config: LinkResolverConfig,
        repo_id: impl Into<String>,
    ) -> Self {
        LinkResolver {
            graph,
            staging,
            llm,
            config,
            repo_id: repo_id.into(),
        }
    }

    /// Runs the full resolution pass over every orphaned closed issue in
    /// the repository, batched per `config.batch_size` (spec.md §4.3).
    pub async fn run(&self) -> Result<ResolverReport, LinkResolverError> {
        let orphaned = self.staging.orphaned_closed_issues(&self.repo_id)?;
        let mut report = ResolverReport {
            issues_examined: orphaned.len(),
            ..Default::default()
        };

        for batch in orphaned.chunks(self.config.batch_size) {
            self.process_batch(batch, &mut report).await?;
        }
        Ok(report)
    }

    async fn process_batch(
        &self,
        batch: &[IssueRecord],
        report: &mut ResolverReport,
    ) -> Result<(), LinkResolverError> {
        let prompt = batch_prompt(batch);
        let schema = candidate_reference_tool_schema();
        let batch_id = format!(
            "{}:{}",
            batch.first().map(|i| i.number).unwrap_or_default(),
            batch.last().map(|i| i.number).unwrap_or_default()
        );

        let mut attempts = 0u8;
        let candidates = loop {
            attempts += 1;
            match self
                .llm
                .complete(&prompt, &[], std::slice::from_ref(&schema))
                .await
            {
                Ok(LlmTurn::ToolCalls(calls)) => {
                    break Self::parse_candidates(&calls);
                }
                Ok(LlmTurn::Text(_)) => break Vec::new(),
                Err(err) if attempts < self.config.max_retries => {
                    tracing::warn!(batch_id = %batch_id, attempt = attempts, error = %err, "link resolver retrying after model error");
                    continue;
                }
                Err(err) => {
                    tracing::error!(batch_id = %batch_id, "link resolver batch quarantined");
                    report.quarantined_batches.push(batch_id.clone());
                    return Err(LinkResolverError::Quarantined {
                        batch_id,
                        attempts,
                        reason: err.to_string(),
                    });
                }
            }
        };

        for candidate in candidates {
            self.resolve_candidate(batch, candidate, report).await?;
        }
        Ok(())
    }

    fn parse_candidates(calls: &[riskgraph_kernel::ports::LlmToolCall]) -> Vec<CandidateReference> {
        let mut out = Vec::new();
        for call in calls {
            if call.tool_name != "emit_candidate_references" {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&call.arguments_json) {
                if let Some(array) = value.get("candidates").and_then(|v| v.as_array()) {
                    for item in array {
                        if let Ok(candidate) =
                            serde_json::from_value::<CandidateReference>(item.clone())
                        {
                            out.push(candidate);
                        }
                    }
                }
            }
        }
        out
    }

    /// Applies the three independent validators, then writes an
    /// `ASSOCIATED_WITH`/`FIXED_BY` edge if the candidate is accepted
    /// (spec.md §4.3 steps 3-6).
    async fn resolve_candidate(
        &self,
        batch: &[IssueRecord],
        candidate: CandidateReference,
        report: &mut ResolverReport,
    ) -> Result<(), LinkResolverError> {
        let Some(issue) = batch.iter().find(|i| i.number == candidate.issue_number) else {
            return Ok(());
        };

        let (target_sha, target_created, target_text, target_files): (
            Option<String>,
            Option<chrono::DateTime<chrono::Utc>>,
            String,
            HashSet<String>,
        ) = match candidate.target_type {
            TargetType::Commit => match self.staging.find_commit(&self.repo_id, &candidate.target_id)? {
                Some(commit) => (
                    Some(commit.sha.clone()),
                    Some(commit.author_date),
                    commit.message.clone(),
                    commit.files.iter().map(|f| f.path.clone()).collect(),
                ),
                None => {
                    report.hallucinations_discarded += 1;
                    return Ok(());
                }
            },
            TargetType::Pr => {
                let number: i64 = match candidate.target_id.trim_start_matches('#').parse() {
                    Ok(n) => n,
                    Err(_) => {
                        report.hallucinations_discarded += 1;
                        return Ok(());
                    }
                };
                match self.staging.find_pr(&self.repo_id, number)? {
                    Some(pr) => (
                        pr.merge_commit_sha.clone(),
                        pr.merged_at,
                        format!("{} {}", pr.title, pr.body),
                        HashSet::new(),
                    ),
                    None => {
                        report.hallucinations_discarded += 1;
                        return Ok(());
                    }
                }
            }
            TargetType::Release => {
                // No release staging table exists yet -- there's nothing to
                // validate a release reference against, so treat it as
                // unverifiable rather than guessing.
                report.hallucinations_discarded += 1;
                return Ok(());
            }
        };

        let issue_files = extract_mentioned_paths(&issue.body);

        let mut flags = ValidationFlags::default();

        if let (Some(closed_at), Some(target_created)) = (issue.closed_at, target_created) {
            let delta = (closed_at - target_created).num_days().abs();
            flags.temporal_validated = delta <= self.config.temporal_window_days;
        }

        flags.semantic_validated = target_text.contains(&format!("#{}", issue.number));

        if !issue_files.is_empty() && !target_files.is_empty() {
            let overlap = issue_files.intersection(&target_files).count();
            let ratio = overlap as f64 / issue_files.len() as f64;
            flags.file_overlap_validated = ratio >= self.config.file_overlap_threshold;
        }

        if flags.passed_count() < self.config.min_validators_passed {
            report.hallucinations_discarded += 1;
            return Ok(());
        }

        let mut confidence = self.config.base_confidence_prior;
        if flags.temporal_validated {
            confidence *= self.config.temporal_multiplier;
        }
        if flags.semantic_validated {
            confidence *= self.config.semantic_multiplier;
        }
        if flags.file_overlap_validated {
            confidence *= self.config.file_overlap_multiplier;
        }
        confidence = confidence.min(self.config.confidence_ceiling);

        if confidence < self.config.acceptance_floor {
            report.hallucinations_discarded += 1;
            return Ok(());
        }

        let Some(target_sha) = target_sha else {
            report.hallucinations_discarded += 1;
            return Ok(());
        };

        let kind = match candidate.action.as_deref() {
            Some(a) if a.eq_ignore_ascii_case("fixes") || a.eq_ignore_ascii_case("fixed") => {
                InferredEdgeKind::FixedBy
            }
            _ => InferredEdgeKind::AssociatedWith,
        };

        let from = NodeKey::Issue {
            repo_id: self.repo_id.clone(),
            number: issue.number,
        };
        let to = NodeKey::Commit { sha: target_sha };

        let written = self
            .graph
            .write_inferred_edge_checked(InferredEdgeWrite {
                kind,
                from_label: from.label(),
                from_match: node_match(&from),
                to_label: to.label(),
                to_match: node_match(&to),
                confidence,
                detected_via: DetectedVia::LlmLinkResolution,
                evidence: candidate.evidence_span,
                flags,
            })
            .await?;

        if written {
            report.edges_written += 1;
        } else {
            report.collisions_skipped += 1;
        }
        Ok(())
    }
}

fn node_match(key: &NodeKey) -> serde_json::Value {
    match key {
        NodeKey::Repository { repo_id } => serde_json::json!({"repo_id": repo_id}),
        NodeKey::Developer { email } => serde_json::json!({"email": email}),
        NodeKey::Commit { sha } => serde_json::json!({"sha": sha}),
        NodeKey::Pr { repo_id, number } => serde_json::json!({"repo_id": repo_id, "number": number}),
        NodeKey::Issue { repo_id, number } => serde_json::json!({"repo_id": repo_id, "number": number}),
        NodeKey::File { repo_id, path } => serde_json::json!({"repo_id": repo_id, "path": path}),
    }
}

/// Pulls plausible file paths out of free text: tokens containing a `/` or
/// a recognized source extension. A coarse heuristic, sufficient for the
/// file-overlap validator's intersection check.
fn extract_mentioned_paths(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-'))
        .filter(|tok| {
            tok.contains('/')
                || tok.ends_with(".rs")
                || tok.ends_with(".py")
                || tok.ends_with(".js")
                || tok.ends_with(".ts")
                || tok.ends_with(".go")
        })
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_paths_from_free_text() {
        let found = extract_mentioned_paths("crash happens in src/auth/login.py during startup");
        assert!(found.contains("src/auth/login.py"));
    }

    #[test]
    fn batch_prompt_includes_every_issue() {
        let issues = vec![
            IssueRecord {
                number: 1,
                title: "a".into(),
                body: "body a".into(),
                state: "closed".into(),
                created_at: chrono::Utc::now(),
                closed_at: None,
                labels: vec![],
                closure_reason: None,
            },
            IssueRecord {
                number: 2,
                title: "b".into(),
                body: "body b".into(),
                state: "closed".into(),
                created_at: chrono::Utc::now(),
                closed_at: None,
                labels: vec![],
                closure_reason: None,
            },
        ];
        let prompt = batch_prompt(&issues);
        assert!(prompt.contains("Issue #1"));
        assert!(prompt.contains("Issue #2"));
    }
}
