//! C2 Graph Store: property-graph persistence over `neo4rs` with batched
//! `UNWIND` writes and a Tier-A/Tier-B collision precheck at the Cypher
//! level (spec.md §4.2).

use std::time::Duration;

use neo4rs::{query, Graph};
use serde_json::json;

use riskgraph_kernel::graph::{
    validate_inferred_confidence, DefinitiveEdgeKind, DetectedVia, InferredEdgeKind,
    ValidationFlags,
};

use crate::error::GraphError;

pub struct GraphStore {
    graph: Graph,
    read_timeout: Duration,
    write_timeout: Duration,
}

/// One node upsert, keyed by the natural key columns the label implies
/// (spec.md §3 identity column per node type).
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeUpsert {
    pub label: &'static str,
    pub properties: serde_json::Value,
}

/// Every `from_match`/`to_match` must be paired with the node label it's
/// meant to constrain against. `PR` and `Issue` both key on `(repo_id,
/// number)` (spec.md §3 models them as independent unique constraints, not
/// a shared counter), so an unlabeled `MATCH` on those properties alone can
/// attach an edge to the wrong node type when a repo's PR and issue numbers
/// collide. The label closes that hole.
#[derive(Debug, Clone)]
pub struct DefinitiveEdgeWrite {
    pub kind: DefinitiveEdgeKind,
    pub from_label: &'static str,
    pub from_match: serde_json::Value,
    pub to_label: &'static str,
    pub to_match: serde_json::Value,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct InferredEdgeWrite {
    pub kind: InferredEdgeKind,
    pub from_label: &'static str,
    pub from_match: serde_json::Value,
    pub to_label: &'static str,
    pub to_match: serde_json::Value,
    pub confidence: f64,
    pub detected_via: DetectedVia,
    pub evidence: String,
    pub flags: ValidationFlags,
}

impl GraphStore {
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, GraphError> {
        let graph = Graph::new(uri, user, password).await?;
        Ok(GraphStore {
            graph,
            read_timeout,
            write_timeout,
        })
    }

    /// Unique-constraint setup; idempotent, safe to call on every startup
    /// (spec.md §4.2 "Indexes").
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        let statements = [
            "CREATE CONSTRAINT commit_sha IF NOT EXISTS FOR (c:Commit) REQUIRE c.sha IS UNIQUE",
            "CREATE CONSTRAINT pr_natural_key IF NOT EXISTS FOR (p:PR) REQUIRE (p.repo_id, p.number) IS UNIQUE",
            "CREATE CONSTRAINT issue_natural_key IF NOT EXISTS FOR (i:Issue) REQUIRE (i.repo_id, i.number) IS UNIQUE",
            "CREATE CONSTRAINT developer_email IF NOT EXISTS FOR (d:Developer) REQUIRE d.email IS UNIQUE",
            "CREATE CONSTRAINT file_path IF NOT EXISTS FOR (f:File) REQUIRE (f.repo_id, f.path) IS UNIQUE",
            "CREATE INDEX commit_author_date IF NOT EXISTS FOR (c:Commit) ON (c.author_date)",
            "CREATE INDEX file_path_prefix IF NOT EXISTS FOR (f:File) ON (f.path)",
        ];
        for stmt in statements {
            self.graph.run(query(stmt)).await?;
        }
        Ok(())
    }

    /// Batched node upsert: one `UNWIND $rows AS row MERGE (...)` statement
    /// per batch rather than one statement per node (spec.md §4.2 "Write
    /// pattern"). `rows` should already be chunked to the configured batch
    /// size by the caller (C4).
    pub async fn upsert_nodes(&self, label: &str, rows: Vec<serde_json::Value>) -> Result<(), GraphError> {
        if rows.is_empty() {
            return Ok(());
        }
        let key_field = natural_key_field(label);
        let cypher = format!(
            "UNWIND $rows AS row MERGE (n:{label} {{{key_field}: row.{key_field}}}) SET n += row"
        );
        self.graph
            .run(query(&cypher).param("rows", rows))
            .await?;
        Ok(())
    }

    /// Writes a batch of Tier-A edges. Tier-A edges are always safe to
    /// MERGE directly -- they're created before any Tier-B edge exists for
    /// the same pair, by the phase ordering C4 enforces.
    pub async fn write_definitive_edges(&self, edges: Vec<DefinitiveEdgeWrite>) -> Result<(), GraphError> {
        for edge in edges {
            let label = edge.kind.label();
            // Build explicit WHERE clauses from the match maps: neo4rs has
            // no way to match an arbitrary property map via `=`.
            let (from_where, from_params) = match_clause("a", edge.from_label, &edge.from_match);
            let (to_where, to_params) = match_clause("b", edge.to_label, &edge.to_match);
            let final_cypher = format!(
                "MATCH (a:{}) WHERE {from_where} MATCH (b:{}) WHERE {to_where} MERGE (a)-[r:{label}]->(b) SET r += $props",
                edge.from_label, edge.to_label
            );
            let mut q = query(&final_cypher).param("props", edge.properties);
            for (k, v) in from_params.into_iter().chain(to_params.into_iter()) {
                q = q.param(&k, v);
            }
            self.graph.run(q).await?;
        }
        Ok(())
    }

    /// Writes one Tier-B edge after checking no Tier-A edge of the same
    /// semantic category already exists between the pair (spec.md §3
    /// "Collision rule", enforced here at write time; C4 also enforces it
    /// at build time by phase ordering).
    pub async fn write_inferred_edge_checked(
        &self,
        edge: InferredEdgeWrite,
    ) -> Result<bool, GraphError> {
        validate_inferred_confidence(edge.confidence)
            .map_err(GraphError::Collision)?;

        let (from_where, from_params) = match_clause("a", edge.from_label, &edge.from_match);
        let (to_where, to_params) = match_clause("b", edge.to_label, &edge.to_match);

        let collision_categories = definitive_labels_for_category(edge.kind.semantic_category());
        let collision_cypher = format!(
            "MATCH (a:{}) WHERE {from_where} MATCH (b:{}) WHERE {to_where} \
             MATCH (a)-[r]->(b) WHERE type(r) IN $categories RETURN count(r) AS n",
            edge.from_label, edge.to_label
        );
        let mut collision_query = query(&collision_cypher)
            .param("categories", collision_categories);
        for (k, v) in from_params.iter().chain(to_params.iter()) {
            collision_query = collision_query.param(k, v.clone());
        }
        let mut stream = self.graph.execute(collision_query).await?;
        let collides = if let Some(row) = stream.next().await? {
            let n: i64 = row.get("n").unwrap_or(0);
            n > 0
        } else {
            false
        };
        if collides {
            return Ok(false);
        }

        let label = edge.kind.label();
        let props = json!({
            "confidence": edge.confidence,
            "detected_via": format!("{:?}", edge.detected_via),
            "evidence": edge.evidence,
            "temporal_validated": edge.flags.temporal_validated,
            "semantic_validated": edge.flags.semantic_validated,
            "file_overlap_validated": edge.flags.file_overlap_validated,
        });
        let write_cypher = format!(
            "MATCH (a:{}) WHERE {from_where} MATCH (b:{}) WHERE {to_where} MERGE (a)-[r:{label}]->(b) SET r += $props",
            edge.from_label, edge.to_label
        );
        let mut write_query = query(&write_cypher).param("props", props);
        for (k, v) in from_params.into_iter().chain(to_params.into_iter()) {
            write_query = write_query.param(&k, v);
        }
        self.graph.run(write_query).await?;
        Ok(true)
    }

    /// Runs a parameterized read query, mapping each row with `extract`,
    /// bounded by the store's configured read deadline (spec.md §4.2
    /// "Timeouts"). C6's operations supply `extract` since only they know
    /// their own result shape.
    pub async fn query_rows<T, F>(
        &self,
        cypher: &str,
        params: Vec<(&str, serde_json::Value)>,
        extract: F,
    ) -> Result<Vec<T>, GraphError>
    where
        F: Fn(&neo4rs::Row) -> Result<T, neo4rs::Error>,
    {
        let mut q = query(cypher);
        for (k, v) in params {
            q = q.param(k, v);
        }
        let fut = async {
            let mut stream = self.graph.execute(q).await?;
            let mut out = Vec::new();
            while let Some(row) = stream.next().await? {
                out.push(extract(&row)?);
            }
            Ok::<_, neo4rs::Error>(out)
        };
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GraphError::DeadlineExceeded(self.read_timeout)),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

/// Names the property each node label is merged on. Compound natural keys
/// (File and PR/Issue/Scenario are keyed on `(repo_id, path|number)`,
/// Repository on `repo_id`) are pre-flattened by the caller into a single
/// synthetic `key` property, since `MERGE` needs one property to match on.
fn natural_key_field(label: &str) -> &'static str {
    match label {
        "Commit" => "sha",
        "Developer" => "email",
        _ => "key",
    }
}

fn definitive_labels_for_category(
    category: riskgraph_kernel::graph::SemanticCategory,
) -> Vec<String> {
    use riskgraph_kernel::graph::SemanticCategory;
    match category {
        SemanticCategory::IssueToFix => vec!["REFERENCES".to_string(), "CLOSED_BY".to_string()],
        SemanticCategory::PrToCommit => vec!["MERGED_AS".to_string()],
        SemanticCategory::Authorship => vec!["AUTHORED".to_string(), "CREATED".to_string()],
        SemanticCategory::FileTouch => vec!["MODIFIED".to_string()],
    }
}

/// Builds a `WHERE` fragment plus bound parameters matching every key in
/// `value` as `{alias}.{key} = ${alias}_{key}`. `label` is threaded through
/// only so every call site is forced to name the node label it expects --
/// the label constraint itself lives in the `MATCH (alias:Label)` pattern
/// the caller builds around this fragment, not in the `WHERE` clause.
fn match_clause(alias: &str, _label: &'static str, value: &serde_json::Value) -> (String, Vec<(String, serde_json::Value)>) {
    let object = value.as_object().cloned().unwrap_or_default();
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (k, v) in object {
        let param_name = format!("{alias}_{k}");
        clauses.push(format!("{alias}.{k} = ${param_name}"));
        params.push((param_name, v));
    }
    if clauses.is_empty() {
        clauses.push("true".to_string());
    }
    (clauses.join(" AND "), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_clause_builds_parameterized_fragment() {
        let (clause, params) = match_clause("a", "PR", &json!({"repo_id": "r1", "number": 87}));
        assert!(clause.contains("a.repo_id = $a_repo_id"));
        assert!(clause.contains("a.number = $a_number"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_match_degrades_to_true() {
        let (clause, params) = match_clause("a", "Repository", &json!({}));
        assert_eq!(clause, "true");
        assert!(params.is_empty());
    }

    #[test]
    fn pr_and_issue_match_same_properties_but_distinct_labels() {
        let props = json!({"repo_id": "r1", "number": 87});
        let (pr_clause, _) = match_clause("a", "PR", &props);
        let (issue_clause, _) = match_clause("a", "Issue", &props);
        assert_eq!(pr_clause, issue_clause);
    }

    #[test]
    fn category_labels_match_data_model() {
        use riskgraph_kernel::graph::SemanticCategory;
        assert_eq!(
            definitive_labels_for_category(SemanticCategory::IssueToFix),
            vec!["REFERENCES", "CLOSED_BY"]
        );
    }
}
