//! Port traits naming the external collaborators spec.md §6 places outside
//! the core's scope: the repository-history fetcher, the LLM provider, the
//! Phase-1 metrics source, and the Phase-0 classifier. `riskgraph-core`
//! provides concrete adapters; this crate only names the boundary, in the
//! same spirit as the corpus's own `FsPort`/`VcsPort`/`AgentPort` traits.
//!
//! Methods return a boxed future rather than using `async fn` in trait so
//! the ports remain object-safe (`Box<dyn LlmProviderPort>`), the same
//! accommodation the corpus makes with its own `AgentFuture` type alias.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::investigation::Phase0Classification;
use crate::prompt::Phase1Metrics;

pub type PortFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub author_email: String,
    pub author_date: chrono::DateTime<chrono::Utc>,
    pub committer_date: chrono::DateTime<chrono::Utc>,
    pub additions: u32,
    pub deletions: u32,
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub status: String,
    pub additions: u32,
    pub deletions: u32,
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrRecord {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub author_login: String,
    pub state: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub merged_at: Option<chrono::DateTime<chrono::Utc>>,
    pub merge_commit_sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub labels: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub closure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineEventType {
    CrossReferenced,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineSourceType {
    Pr,
    Commit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub issue_number: i64,
    pub event_type: TimelineEventType,
    pub source_type: TimelineSourceType,
    pub source_id: Option<i64>,
    pub source_sha: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A page of raw records for one repository (spec.md §6 "delivers, per
/// repository, streams of commits, PRs, issues, and issue-timeline
/// events").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryPage {
    pub commits: Vec<CommitRecord>,
    pub pull_requests: Vec<PrRecord>,
    pub issues: Vec<IssueRecord>,
    pub timeline_events: Vec<TimelineEvent>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

pub trait RepositoryFetcherPort: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_page<'a>(
        &'a self,
        repo_id: &'a str,
        cursor: Option<&'a str>,
    ) -> PortFuture<'a, RepositoryPage, Self::Error>;
}

/// One candidate emitted by the LLM for a tool call, or the final text
/// response (spec.md §6 "either text or a list of tool calls").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LlmTurn {
    ToolCalls(Vec<LlmToolCall>),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolSchema {
    pub name: String,
    pub description: String,
    pub parameters_json_schema: String,
}

pub trait LlmProviderPort: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        history_json: &'a [String],
        tools: &'a [LlmToolSchema],
    ) -> PortFuture<'a, LlmTurn, Self::Error>;
}

pub trait Phase1MetricsPort: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn metrics_for_path<'a>(
        &'a self,
        repo_id: &'a str,
        path: &'a str,
    ) -> PortFuture<'a, Phase1Metrics, Self::Error>;
}

pub trait Phase0ClassifierPort: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn classify<'a>(
        &'a self,
        diff_text: &'a str,
    ) -> PortFuture<'a, Phase0Classification, Self::Error>;
}
