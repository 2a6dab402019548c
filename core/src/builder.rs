//! C4 Graph Builder: executes ingestion in the fixed phase order spec.md
//! §4.4 requires. Phase inversion can create duplicate semantic edges
//! between the same pair, so this module is the only place allowed to
//! drive phase 5 (Tier-A) and phases 6-7 (Tier-B) against the same
//! repository.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::json;

use riskgraph_kernel::config::{BuilderConfig, LinkResolverConfig};
use riskgraph_kernel::graph::{DefinitiveEdgeKind, DetectedVia, InferredEdgeKind, ValidationFlags};
use riskgraph_kernel::ports::{
    CommitRecord, IssueRecord, PrRecord, RepositoryFetcherPort, RepositoryPage, TimelineEventType,
};

use crate::error::BuildError;
use crate::graph_store::{DefinitiveEdgeWrite, GraphStore, InferredEdgeWrite};
use crate::link_resolver::LinkResolver;
use crate::staging::StagingStore;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PhaseReport {
    pub phase: u8,
    pub name: &'static str,
    pub items_processed: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct BuildCounts {
    pub commits: usize,
    pub developers: usize,
    pub files: usize,
    pub pull_requests: usize,
    pub issues: usize,
    pub definitive_edges: usize,
    pub inferred_edges: usize,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct BuildReport {
    pub phases: Vec<PhaseReport>,
    pub counts: BuildCounts,
    pub errors: Vec<String>,
}

pub struct GraphBuilder<'a, F: RepositoryFetcherPort> {
    staging: &'a StagingStore,
    graph: &'a GraphStore,
    fetcher: &'a F,
    config: BuilderConfig,
    link_resolver_config: LinkResolverConfig,
}

struct PhaseGuard {
    phase: u8,
    name: &'static str,
    started: Instant,
    budget: Duration,
}

impl PhaseGuard {
    fn start(phase: u8, name: &'static str, budget: Duration) -> Self {
        tracing::info!(phase, name, "build phase started");
        PhaseGuard {
            phase,
            name,
            started: Instant::now(),
            budget,
        }
    }

    fn check(&self) -> Result<(), BuildError> {
        if self.started.elapsed() > self.budget {
            return Err(BuildError::PhaseBudgetExceeded {
                phase: self.phase,
                budget_secs: self.budget.as_secs(),
            });
        }
        Ok(())
    }

    fn finish(self, items_processed: usize) -> PhaseReport {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        tracing::info!(phase = self.phase, name = self.name, items_processed, elapsed_ms, "build phase finished");
        PhaseReport {
            phase: self.phase,
            name: self.name,
            items_processed,
            elapsed_ms,
        }
    }
}

impl<'a, F: RepositoryFetcherPort> GraphBuilder<'a, F> {
    pub fn new(
        staging: &'a StagingStore,
        graph: &'a GraphStore,
        fetcher: &'a F,
        config: BuilderConfig,
        link_resolver_config: LinkResolverConfig,
    ) -> Self {
        GraphBuilder {
            staging,
            graph,
            fetcher,
            config,
            link_resolver_config,
        }
    }

    fn budget(&self) -> Duration {
        Duration::from_secs(self.config.phase_wall_clock_budget_secs)
    }

    /// Fetches every page for the repository, accumulating into a single
    /// in-memory `RepositoryPage`. The fetcher owns pagination; the builder
    /// only drives the cursor loop. Exposed so a caller can fetch once and
    /// reuse the page across `build`, `run_link_resolution`, and `finish`.
    pub async fn fetch_all(&self, repo_id: &str) -> Result<RepositoryPage, BuildError> {
        let mut combined = RepositoryPage::default();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .fetcher
                .fetch_page(repo_id, cursor.as_deref())
                .await
                .map_err(|e| BuildError::Fetcher(e.to_string()))?;
            combined.commits.extend(page.commits);
            combined.pull_requests.extend(page.pull_requests);
            combined.issues.extend(page.issues);
            combined.timeline_events.extend(page.timeline_events);
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(combined)
    }

    /// Runs phases 1-5 of the fixed phase order (spec.md §4.4) against an
    /// already-fetched page. Phase 6 (model-assisted link resolution) is
    /// deliberately not driven here -- it needs an `LlmProviderPort` type
    /// parameter this struct doesn't carry -- callers invoke
    /// [`Self::run_link_resolution`] against the same `repo_id` immediately
    /// after `build` returns, then [`Self::finish`] with the same `page`,
    /// since phase 7's collision precheck depends on phase 6 having already
    /// written its edges.
    pub async fn build(&self, repo_id: &str, page: &RepositoryPage) -> Result<BuildReport, BuildError> {
        self.graph.ensure_schema().await?;
        let mut report = BuildReport::default();

        self.phase1(repo_id, &page.commits, &mut report)?;
        self.phase1_graph(repo_id, &page.commits).await?;
        self.phase2(repo_id, &page.pull_requests, &mut report).await?;
        self.phase3(repo_id, &page.pull_requests, &mut report).await?;
        self.phase4(repo_id, &page.issues, &mut report)?;
        self.phase4_graph(repo_id, &page.issues).await?;
        self.phase5(repo_id, page, &mut report).await?;

        Ok(report)
    }

    /// Runs phase 7 (text-extracted Tier-B links) and, if configured,
    /// phase 8 (scenario derivation), against the same `page` passed to
    /// `build`. Must be called after [`Self::run_link_resolution`] so phase
    /// 7's collision precheck sees every Tier-B edge phase 6 already wrote.
    pub async fn finish(
        &self,
        repo_id: &str,
        page: &RepositoryPage,
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        self.phase7(repo_id, page, report).await?;
        if self.config.derive_scenarios {
            self.phase8(repo_id, &page.pull_requests, report).await?;
        }
        Ok(())
    }

    /// Phase 1: Repository, Developers, Files, Commits; `AUTHORED`/`MODIFIED`.
    fn phase1(
        &self,
        repo_id: &str,
        commits: &[CommitRecord],
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(1, "commits_developers_files", self.budget());

        self.staging.upsert_commits(repo_id, commits)?;

        let mut developers: HashMap<String, ()> = HashMap::new();
        let mut files: HashSet<String> = HashSet::new();
        for commit in commits {
            developers.insert(commit.author_email.clone(), ());
            for file in &commit.files {
                files.insert(file.path.clone());
            }
            guard.check()?;
        }

        report.counts.developers += developers.len();
        report.counts.files += files.len();
        report.counts.commits += commits.len();

        report.phases.push(guard.finish(commits.len()));
        Ok(())
    }

    /// Runs phase 1's graph-side node/edge writes. Split from `phase1` so
    /// staging (sync) and graph (async) work stay clearly separated; called
    /// from `build` immediately after `phase1`.
    async fn phase1_graph(&self, repo_id: &str, commits: &[CommitRecord]) -> Result<(), BuildError> {
        self.graph
            .upsert_nodes("Repository", vec![json!({"key": repo_id, "repo_id": repo_id})])
            .await?;

        let mut developers = HashSet::new();
        let mut files = HashSet::new();
        let mut commit_rows = Vec::new();

        for commit in commits {
            developers.insert(commit.author_email.clone());
            commit_rows.push(json!({
                "sha": commit.sha,
                "message": commit.message,
                "author_date": commit.author_date.to_rfc3339(),
                "additions": commit.additions,
                "deletions": commit.deletions,
            }));
            for file in &commit.files {
                files.insert(file.path.clone());
            }
        }

        let developer_rows: Vec<_> = developers
            .iter()
            .map(|email| json!({"email": email}))
            .collect();
        self.graph.upsert_nodes("Developer", developer_rows).await?;

        let file_rows: Vec<_> = files
            .iter()
            .map(|path| json!({"key": format!("{repo_id}:{path}"), "repo_id": repo_id, "path": path}))
            .collect();
        self.graph.upsert_nodes("File", file_rows).await?;

        self.graph.upsert_nodes("Commit", commit_rows).await?;

        let mut authored = Vec::new();
        let mut modified = Vec::new();
        for commit in commits {
            authored.push(DefinitiveEdgeWrite {
                kind: DefinitiveEdgeKind::Authored,
                from_label: "Developer",
                from_match: json!({"email": commit.author_email}),
                to_label: "Commit",
                to_match: json!({"sha": commit.sha}),
                properties: json!({}),
            });
            for file in &commit.files {
                modified.push(DefinitiveEdgeWrite {
                    kind: DefinitiveEdgeKind::Modified,
                    from_label: "Commit",
                    from_match: json!({"sha": commit.sha}),
                    to_label: "File",
                    to_match: json!({"key": format!("{repo_id}:{}", file.path)}),
                    properties: json!({"status": file.status, "additions": file.additions, "deletions": file.deletions}),
                });
            }
        }
        let edge_count = authored.len() + modified.len();
        self.graph.write_definitive_edges(authored).await?;
        self.graph.write_definitive_edges(modified).await?;
        let _ = edge_count;
        Ok(())
    }

    /// Phase 2: upsert PRs, emit `CREATED`.
    async fn phase2(
        &self,
        repo_id: &str,
        prs: &[PrRecord],
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(2, "pull_requests", self.budget());
        self.staging.upsert_pull_requests(repo_id, prs)?;

        let rows: Vec<_> = prs
            .iter()
            .map(|pr| {
                json!({
                    "key": format!("{repo_id}:{}", pr.number),
                    "repo_id": repo_id,
                    "number": pr.number,
                    "title": pr.title,
                    "state": pr.state,
                })
            })
            .collect();
        self.graph.upsert_nodes("PR", rows).await?;

        // The PR payload carries only the author's login, never an email,
        // so a PR-only author has no commit to key a Developer node on yet.
        // Upsert one keyed by login (stored in the `email` merge-key
        // property, same as a commit author's real address) so `CREATED`
        // below always has an endpoint to attach to; it merges with the
        // real email-keyed node once that developer's first commit lands.
        let mut pr_authors: HashSet<String> = HashSet::new();
        for pr in prs {
            pr_authors.insert(pr.author_login.clone());
        }
        let author_rows: Vec<_> = pr_authors
            .iter()
            .map(|login| json!({"email": login, "login": login}))
            .collect();
        self.graph.upsert_nodes("Developer", author_rows).await?;

        let created: Vec<_> = prs
            .iter()
            .map(|pr| DefinitiveEdgeWrite {
                kind: DefinitiveEdgeKind::Created,
                from_label: "Developer",
                from_match: json!({"email": pr.author_login}),
                to_label: "PR",
                to_match: json!({"key": format!("{repo_id}:{}", pr.number)}),
                properties: json!({}),
            })
            .collect();
        self.graph.write_definitive_edges(created).await?;

        report.counts.pull_requests += prs.len();
        report.phases.push(guard.finish(prs.len()));
        Ok(())
    }

    /// Phase 3: link PRs to their merge commits (`MERGED_AS`). Must run
    /// after phase 1 (commits exist) and phase 2 (PR nodes exist).
    async fn phase3(
        &self,
        repo_id: &str,
        prs: &[PrRecord],
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(3, "merged_as", self.budget());
        let mut edges = Vec::new();
        for pr in prs {
            if let Some(sha) = &pr.merge_commit_sha {
                edges.push(DefinitiveEdgeWrite {
                    kind: DefinitiveEdgeKind::MergedAs,
                    from_label: "PR",
                    from_match: json!({"key": format!("{repo_id}:{}", pr.number)}),
                    to_label: "Commit",
                    to_match: json!({"sha": sha}),
                    properties: json!({}),
                });
            }
        }
        let count = edges.len();
        report.counts.definitive_edges += count;
        self.graph.write_definitive_edges(edges).await?;
        report.phases.push(guard.finish(count));
        Ok(())
    }

    /// Phase 4: upsert Issues and their timelines.
    fn phase4(
        &self,
        repo_id: &str,
        issues: &[IssueRecord],
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(4, "issues", self.budget());
        self.staging.upsert_issues(repo_id, issues)?;
        report.counts.issues += issues.len();
        report.phases.push(guard.finish(issues.len()));
        Ok(())
    }

    async fn phase4_graph(&self, repo_id: &str, issues: &[IssueRecord]) -> Result<(), BuildError> {
        let rows: Vec<_> = issues
            .iter()
            .map(|issue| {
                json!({
                    "key": format!("{repo_id}:{}", issue.number),
                    "repo_id": repo_id,
                    "number": issue.number,
                    "title": issue.title,
                    "state": issue.state,
                    "labels_json": serde_json::to_string(&issue.labels).unwrap_or_default(),
                })
            })
            .collect();
        self.graph.upsert_nodes("Issue", rows).await?;
        Ok(())
    }

    /// Phase 5: emit `REFERENCES`/`CLOSED_BY` from timeline events. This
    /// completes Tier-A and must run before phase 6/7 write any Tier-B
    /// edge, or the collision precheck would race an unwritten Tier-A edge.
    /// Requires `phase1_graph` and `phase4_graph` to have already run so the
    /// Issue/PR/Commit endpoints these edges connect already exist --
    /// `build` calls them in that order before reaching this phase.
    async fn phase5(
        &self,
        repo_id: &str,
        page: &RepositoryPage,
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(5, "tier_a_issue_links", self.budget());

        let mut by_issue: HashMap<i64, Vec<_>> = HashMap::new();
        for event in &page.timeline_events {
            by_issue.entry(event.issue_number).or_default().push(event.clone());
        }
        for (issue_number, events) in &by_issue {
            self.staging.replace_timeline(repo_id, *issue_number, events)?;
        }

        let mut edges = Vec::new();
        for event in &page.timeline_events {
            let kind = match event.event_type {
                TimelineEventType::Closed => DefinitiveEdgeKind::ClosedBy,
                TimelineEventType::CrossReferenced => DefinitiveEdgeKind::References,
            };
            // A timeline event's source is either the commit that closed the
            // issue (keyed by sha) or the PR that cross-referenced it (keyed
            // by the `{repo_id}:{number}` pair, same format Issue itself
            // uses) -- the two are never both present.
            let (to_label, to_match) = if let Some(sha) = &event.source_sha {
                ("Commit", json!({"sha": sha}))
            } else if let Some(id) = event.source_id {
                ("PR", json!({"key": format!("{repo_id}:{id}")}))
            } else {
                continue;
            };
            edges.push(DefinitiveEdgeWrite {
                kind,
                from_label: "Issue",
                from_match: json!({"key": format!("{repo_id}:{}", event.issue_number)}),
                to_label,
                to_match,
                properties: json!({"created_at": event.created_at.to_rfc3339()}),
            });
        }
        let count = edges.len();
        report.counts.definitive_edges += count;
        self.graph.write_definitive_edges(edges).await?;
        report.phases.push(guard.finish(count));
        Ok(())
    }

    /// Phase 7: extract Tier-B links from commit messages and PR bodies via
    /// explicit closing-keyword patterns ("fixes #87", "closes #87",
    /// "resolves #87"), applying the same collision precheck C3 uses.
    async fn phase7(
        &self,
        repo_id: &str,
        page: &RepositoryPage,
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(7, "text_extracted_links", self.budget());
        let pattern = Regex::new(r"(?i)\b(fixes|fixed|closes|closed|resolves|resolved)\s+#(\d+)").unwrap();

        let mut written = 0usize;
        for commit in &page.commits {
            if is_merge_commit_message(&commit.message) {
                // Linkage already exists via MERGED_AS (phase 3); never submit
                // these to extraction (spec.md §3 "Merge commits bypass extraction").
                continue;
            }
            for capture in pattern.captures_iter(&commit.message) {
                let issue_number: i64 = capture[2].parse().unwrap_or(0);
                if issue_number == 0 {
                    continue;
                }
                let action = capture[1].to_lowercase();
                let kind = if action.starts_with("fix") {
                    InferredEdgeKind::FixedBy
                } else {
                    InferredEdgeKind::AssociatedWith
                };
                let ok = self
                    .graph
                    .write_inferred_edge_checked(InferredEdgeWrite {
                        kind,
                        from_label: "Issue",
                        from_match: json!({"key": format!("{repo_id}:{issue_number}")}),
                        to_label: "Commit",
                        to_match: json!({"sha": commit.sha}),
                        confidence: self.link_resolver_config.confidence_ceiling.min(0.9),
                        detected_via: DetectedVia::CommitExtraction,
                        evidence: commit.message.clone(),
                        flags: ValidationFlags {
                            temporal_validated: true,
                            semantic_validated: true,
                            file_overlap_validated: false,
                        },
                    })
                    .await?;
                if ok {
                    written += 1;
                }
            }
        }

        for pr in &page.pull_requests {
            for capture in pattern.captures_iter(&pr.body) {
                let issue_number: i64 = capture[2].parse().unwrap_or(0);
                if issue_number == 0 {
                    continue;
                }
                let Some(sha) = &pr.merge_commit_sha else { continue };
                let action = capture[1].to_lowercase();
                let kind = if action.starts_with("fix") {
                    InferredEdgeKind::FixedBy
                } else {
                    InferredEdgeKind::AssociatedWith
                };
                let ok = self
                    .graph
                    .write_inferred_edge_checked(InferredEdgeWrite {
                        kind,
                        from_label: "Issue",
                        from_match: json!({"key": format!("{repo_id}:{issue_number}")}),
                        to_label: "Commit",
                        to_match: json!({"sha": sha}),
                        confidence: self.link_resolver_config.confidence_ceiling.min(0.9),
                        detected_via: DetectedVia::PrExtraction,
                        evidence: pr.body.clone(),
                        flags: ValidationFlags {
                            temporal_validated: true,
                            semantic_validated: true,
                            file_overlap_validated: false,
                        },
                    })
                    .await?;
                if ok {
                    written += 1;
                }
            }
        }

        report.counts.inferred_edges += written;
        report.phases.push(guard.finish(written));
        Ok(())
    }

    /// Phase 8: classify each PR into {FEATURE, HOTFIX, REVERT, CHORE} and
    /// derive a read-only `Scenario` node, gated behind
    /// `config.derive_scenarios`.
    async fn phase8(
        &self,
        repo_id: &str,
        prs: &[PrRecord],
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(8, "scenario_derivation", self.budget());
        let rows: Vec<_> = prs
            .iter()
            .map(|pr| {
                let kind = classify_pr(pr);
                json!({
                    "key": format!("{repo_id}:scenario:{}", pr.number),
                    "repo_id": repo_id,
                    "pr_number": pr.number,
                    "kind": kind,
                })
            })
            .collect();
        let count = rows.len();
        self.graph.upsert_nodes("Scenario", rows).await?;
        report.phases.push(guard.finish(count));
        Ok(())
    }

    /// Runs phase 6 (C3 model-assisted link resolution) with the caller's
    /// configured LLM provider. Split out of `build` because `build` is
    /// generic only over the fetcher; the LLM type is a separate generic
    /// parameter supplied at the call site.
    pub async fn run_link_resolution<L: riskgraph_kernel::ports::LlmProviderPort>(
        &self,
        repo_id: &str,
        llm: &L,
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let guard = PhaseGuard::start(6, "llm_link_resolution", self.budget());
        let resolver = LinkResolver::new(self.graph, self.staging, llm, self.link_resolver_config, repo_id);
        let resolver_report = resolver
            .run()
            .await
            .map_err(BuildError::LinkResolver)?;
        report.counts.inferred_edges += resolver_report.edges_written;
        if !resolver_report.quarantined_batches.is_empty() {
            report.errors.extend(
                resolver_report
                    .quarantined_batches
                    .iter()
                    .map(|b| format!("link resolver batch {b} quarantined")),
            );
        }
        report.phases.push(guard.finish(resolver_report.edges_written));
        Ok(())
    }
}

/// Commit messages beginning with GitHub's own merge-commit preamble (spec.md
/// §3 "Merge commits bypass extraction").
fn is_merge_commit_message(message: &str) -> bool {
    message.starts_with("Merge pull request #")
}

fn classify_pr(pr: &PrRecord) -> &'static str {
    let title = pr.title.to_lowercase();
    if title.starts_with("revert") {
        "REVERT"
    } else if title.contains("hotfix") || title.starts_with("fix:") || title.starts_with("fix(") {
        "HOTFIX"
    } else if title.starts_with("chore") || title.starts_with("docs") {
        "CHORE"
    } else {
        "FEATURE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr(title: &str) -> PrRecord {
        PrRecord {
            number: 1,
            title: title.to_string(),
            body: String::new(),
            author_login: "dev".to_string(),
            state: "merged".to_string(),
            created_at: chrono::Utc::now(),
            merged_at: Some(chrono::Utc::now()),
            merge_commit_sha: Some("abc".to_string()),
        }
    }

    #[test]
    fn classifies_revert() {
        assert_eq!(classify_pr(&pr("Revert \"add feature\"")), "REVERT");
    }

    #[test]
    fn classifies_hotfix() {
        assert_eq!(classify_pr(&pr("fix: null pointer crash")), "HOTFIX");
    }

    #[test]
    fn classifies_feature_by_default() {
        assert_eq!(classify_pr(&pr("Add dark mode toggle")), "FEATURE");
    }

    #[test]
    fn merge_commit_preamble_is_recognized() {
        assert!(is_merge_commit_message("Merge pull request #1 from foo/bar"));
        assert!(!is_merge_commit_message("fixes #1 by merging bar"));
    }
}
