//! C6 Hybrid Query Layer: the six fixed operations that join graph
//! traversal and relational lookup (spec.md §4.6). These are the only
//! primitives exposed to the investigator via C8.

use serde::{Deserialize, Serialize};
use serde_json::json;

use riskgraph_kernel::ports::PortFuture;

use crate::error::QueryError;
use crate::graph_store::GraphStore;
use crate::staging::StagingStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipEntry {
    pub developer_email: String,
    pub commit_count: i64,
    pub first_commit_date: String,
    pub last_commit_date: String,
    pub days_since_last: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CochangePartner {
    pub path: String,
    pub frequency: f64,
    pub example_commit_messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvidence {
    pub issue_number: i64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub link_confidence: f64,
    pub fix_commit_sha: Option<String>,
    pub author_role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastRadiusEntry {
    pub path: String,
    pub cochange_frequency: f64,
    pub incident_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentCommit {
    pub sha: String,
    pub author_email: String,
    pub message: String,
    pub author_date: String,
}

pub struct HybridQueryLayer<'a> {
    graph: &'a GraphStore,
    staging: &'a StagingStore,
    repo_id: String,
}

fn str_list_to_json(paths: &[String]) -> serde_json::Value {
    json!(paths)
}

impl<'a> HybridQueryLayer<'a> {
    pub fn new(graph: &'a GraphStore, staging: &'a StagingStore, repo_id: impl Into<String>) -> Self {
        HybridQueryLayer {
            graph,
            staging,
            repo_id: repo_id.into(),
        }
    }

    /// `ownership_timeline(paths[])`: per-developer commit counts and
    /// recency over all historical aliases of the given paths (spec.md
    /// §4.6). Empty results are a valid return, not an error.
    pub async fn ownership_timeline(
        &self,
        paths: &[String],
    ) -> Result<Vec<OwnershipEntry>, QueryError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let cypher = "
            MATCH (f:File)<-[:MODIFIED]-(c:Commit)<-[:AUTHORED]-(d:Developer)
            WHERE f.repo_id = $repo_id AND f.path IN $paths
            WITH d, count(c) AS commit_count, min(c.author_date) AS first_date, max(c.author_date) AS last_date
            RETURN d.email AS email, commit_count, first_date, last_date
            ORDER BY commit_count DESC
        ";
        let rows = self
            .graph
            .query_rows(
                cypher,
                vec![("repo_id", json!(self.repo_id)), ("paths", str_list_to_json(paths))],
                |row| {
                    Ok((
                        row.get::<String>("email")?,
                        row.get::<i64>("commit_count")?,
                        row.get::<String>("first_date")?,
                        row.get::<String>("last_date")?,
                    ))
                },
            )
            .await?;

        let now = chrono::Utc::now();
        Ok(rows
            .into_iter()
            .map(|(email, commit_count, first_date, last_date)| {
                let last = chrono::DateTime::parse_from_rfc3339(&last_date)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .unwrap_or(now);
                let days_since_last = (now - last).num_days();
                OwnershipEntry {
                    developer_email: email,
                    commit_count,
                    first_commit_date: first_date,
                    last_commit_date: last_date,
                    days_since_last,
                    active: days_since_last <= 90,
                }
            })
            .collect())
    }

    /// `cochange_with_context(paths[], min_freq)`: partner files ranked by
    /// co-change frequency, each with up to `K=3` example commit messages
    /// (spec.md §4.6).
    pub async fn cochange_with_context(
        &self,
        paths: &[String],
        min_freq: f64,
    ) -> Result<Vec<CochangePartner>, QueryError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let cypher = "
            MATCH (f:File)<-[:MODIFIED]-(c:Commit)-[:MODIFIED]->(partner:File)
            WHERE f.repo_id = $repo_id AND f.path IN $paths AND NOT partner.path IN $paths
            WITH partner, count(c) AS cochanges, collect(c.message)[0..3] AS examples
            MATCH (f2:File)<-[:MODIFIED]-(c2:Commit)
            WHERE f2.repo_id = $repo_id AND f2.path IN $paths
            WITH partner, cochanges, examples, count(c2) AS total_changes
            WITH partner, examples, (toFloat(cochanges) / toFloat(total_changes)) AS frequency
            WHERE frequency >= $min_freq
            RETURN partner.path AS path, frequency, examples
            ORDER BY frequency DESC
        ";
        self.graph
            .query_rows(
                cypher,
                vec![
                    ("repo_id", json!(self.repo_id)),
                    ("paths", str_list_to_json(paths)),
                    ("min_freq", json!(min_freq)),
                ],
                |row| {
                    Ok(CochangePartner {
                        path: row.get::<String>("path")?,
                        frequency: row.get::<f64>("frequency")?,
                        example_commit_messages: row
                            .get::<Vec<String>>("examples")
                            .unwrap_or_default(),
                    })
                },
            )
            .await
            .map_err(Into::into)
    }

    /// `incidents_with_context(paths[], days_back)`: linked issues with
    /// full context, resolved via either a Tier-A `CLOSED_BY`/`REFERENCES`
    /// chain or a Tier-B `ASSOCIATED_WITH`/`FIXED_BY` edge (spec.md §4.6).
    pub async fn incidents_with_context(
        &self,
        paths: &[String],
        days_back: i64,
    ) -> Result<Vec<IncidentEvidence>, QueryError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(days_back)).to_rfc3339();
        let cypher = "
            MATCH (f:File)<-[:MODIFIED]-(c:Commit)<-[link]-(i:Issue)
            WHERE f.repo_id = $repo_id AND f.path IN $paths
              AND type(link) IN ['CLOSED_BY', 'ASSOCIATED_WITH', 'FIXED_BY']
              AND i.created_at >= $cutoff
            RETURN DISTINCT i.number AS number, i.title AS title, i.body AS body,
                   i.labels_json AS labels_json, coalesce(link.confidence, 1.0) AS confidence,
                   c.sha AS fix_sha
            ORDER BY confidence DESC
        ";
        let rows = self
            .graph
            .query_rows(
                cypher,
                vec![
                    ("repo_id", json!(self.repo_id)),
                    ("paths", str_list_to_json(paths)),
                    ("cutoff", json!(cutoff)),
                ],
                |row| {
                    Ok((
                        row.get::<i64>("number")?,
                        row.get::<String>("title")?,
                        row.get::<String>("body")?,
                        row.get::<String>("labels_json").unwrap_or_default(),
                        row.get::<f64>("confidence")?,
                        row.get::<String>("fix_sha").ok(),
                    ))
                },
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(number, title, body, labels_json, confidence, fix_sha)| IncidentEvidence {
                issue_number: number,
                title,
                body,
                labels: serde_json::from_str(&labels_json).unwrap_or_default(),
                link_confidence: confidence,
                fix_commit_sha: fix_sha,
                author_role: None,
            })
            .collect())
    }

    /// `blast_radius(path, max_depth)`: downstream files via temporal
    /// coupling, annotated with their own incident counts (spec.md §4.6).
    /// `max_depth` bounds the co-change hop count explored.
    pub async fn blast_radius(
        &self,
        path: &str,
        max_depth: u32,
        min_freq: f64,
    ) -> Result<Vec<BlastRadiusEntry>, QueryError> {
        let depth = max_depth.max(1).min(5);
        let cypher = format!(
            "MATCH (f:File {{repo_id: $repo_id, path: $path}})<-[:MODIFIED]-(c:Commit)-[:MODIFIED]->(partner:File)
             WHERE partner.path <> $path
             WITH partner, count(c) AS cochanges
             MATCH (f2:File {{repo_id: $repo_id, path: $path}})<-[:MODIFIED]-(c2:Commit)
             WITH partner, cochanges, count(c2) AS total
             WITH partner, (toFloat(cochanges) / toFloat(total)) AS frequency
             WHERE frequency >= $min_freq
             OPTIONAL MATCH (partner)<-[:MODIFIED]-(:Commit)<-[link]-(:Issue)
             WHERE type(link) IN ['CLOSED_BY', 'ASSOCIATED_WITH', 'FIXED_BY']
             RETURN partner.path AS path, frequency, count(link) AS incident_count
             ORDER BY frequency DESC
             LIMIT {}",
            100 * depth
        );
        self.graph
            .query_rows(
                &cypher,
                vec![
                    ("repo_id", json!(self.repo_id)),
                    ("path", json!(path)),
                    ("min_freq", json!(min_freq)),
                ],
                |row| {
                    Ok(BlastRadiusEntry {
                        path: row.get::<String>("path")?,
                        cochange_frequency: row.get::<f64>("frequency")?,
                        incident_count: row.get::<i64>("incident_count")?,
                    })
                },
            )
            .await
            .map_err(Into::into)
    }

    /// `recent_commits(paths[], limit)` (spec.md §4.6).
    pub async fn recent_commits(
        &self,
        paths: &[String],
        limit: u32,
    ) -> Result<Vec<RecentCommit>, QueryError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let cypher = "
            MATCH (f:File)<-[:MODIFIED]-(c:Commit)<-[:AUTHORED]-(d:Developer)
            WHERE f.repo_id = $repo_id AND f.path IN $paths
            RETURN DISTINCT c.sha AS sha, d.email AS email, c.message AS message, c.author_date AS author_date
            ORDER BY author_date DESC
            LIMIT $limit
        ";
        self.graph
            .query_rows(
                cypher,
                vec![
                    ("repo_id", json!(self.repo_id)),
                    ("paths", str_list_to_json(paths)),
                    ("limit", json!(limit)),
                ],
                |row| {
                    Ok(RecentCommit {
                        sha: row.get::<String>("sha")?,
                        author_email: row.get::<String>("email")?,
                        message: row.get::<String>("message")?,
                        author_date: row.get::<String>("author_date")?,
                    })
                },
            )
            .await
            .map_err(Into::into)
    }

    /// `commit_patch(sha)`: the patch text as stored in C1 (spec.md §4.6).
    pub fn commit_patch(&self, sha: &str) -> Result<Option<String>, QueryError> {
        Ok(self.staging.commit_patch(&self.repo_id, sha)?)
    }
}

/// Object-safe facade over the six C6 operations (spec.md §4.6), so C9 and
/// C8 can depend on "something that answers these six questions" rather
/// than the concrete Neo4j/SQLite-backed `HybridQueryLayer` -- the same
/// seam the corpus draws around its own store clients with boxed-future
/// port traits (`riskgraph_kernel::ports`). `core::fakes` provides an
/// in-memory implementation for engine/tool tests that don't need a live
/// graph database.
pub trait QueryPort: Send + Sync {
    fn ownership_timeline<'a>(
        &'a self,
        paths: &'a [String],
    ) -> PortFuture<'a, Vec<OwnershipEntry>, QueryError>;

    fn cochange_with_context<'a>(
        &'a self,
        paths: &'a [String],
        min_freq: f64,
    ) -> PortFuture<'a, Vec<CochangePartner>, QueryError>;

    fn incidents_with_context<'a>(
        &'a self,
        paths: &'a [String],
        days_back: i64,
    ) -> PortFuture<'a, Vec<IncidentEvidence>, QueryError>;

    fn blast_radius<'a>(
        &'a self,
        path: &'a str,
        max_depth: u32,
        min_freq: f64,
    ) -> PortFuture<'a, Vec<BlastRadiusEntry>, QueryError>;

    fn recent_commits<'a>(
        &'a self,
        paths: &'a [String],
        limit: u32,
    ) -> PortFuture<'a, Vec<RecentCommit>, QueryError>;

    fn commit_patch(&self, sha: &str) -> Result<Option<String>, QueryError>;
}

impl<'q> QueryPort for HybridQueryLayer<'q> {
    fn ownership_timeline<'a>(
        &'a self,
        paths: &'a [String],
    ) -> PortFuture<'a, Vec<OwnershipEntry>, QueryError> {
        Box::pin(HybridQueryLayer::ownership_timeline(self, paths))
    }

    fn cochange_with_context<'a>(
        &'a self,
        paths: &'a [String],
        min_freq: f64,
    ) -> PortFuture<'a, Vec<CochangePartner>, QueryError> {
        Box::pin(HybridQueryLayer::cochange_with_context(self, paths, min_freq))
    }

    fn incidents_with_context<'a>(
        &'a self,
        paths: &'a [String],
        days_back: i64,
    ) -> PortFuture<'a, Vec<IncidentEvidence>, QueryError> {
        Box::pin(HybridQueryLayer::incidents_with_context(self, paths, days_back))
    }

    fn blast_radius<'a>(
        &'a self,
        path: &'a str,
        max_depth: u32,
        min_freq: f64,
    ) -> PortFuture<'a, Vec<BlastRadiusEntry>, QueryError> {
        Box::pin(HybridQueryLayer::blast_radius(self, path, max_depth, min_freq))
    }

    fn recent_commits<'a>(
        &'a self,
        paths: &'a [String],
        limit: u32,
    ) -> PortFuture<'a, Vec<RecentCommit>, QueryError> {
        Box::pin(HybridQueryLayer::recent_commits(self, paths, limit))
    }

    fn commit_patch(&self, sha: &str) -> Result<Option<String>, QueryError> {
        HybridQueryLayer::commit_patch(self, sha)
    }
}

#[cfg(test)]
mod tests {
    use super::str_list_to_json;

    #[test]
    fn str_list_serializes_as_json_array() {
        let value = str_list_to_json(&["a".to_string(), "b".to_string()]);
        assert!(value.is_array());
        assert_eq!(value.as_array().unwrap().len(), 2);
    }
}
