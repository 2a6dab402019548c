//! C7 adapter: gathers DB-backed inputs (resolved paths, Phase 1 metrics,
//! data-quality summary) and hands them to the kernel's pure
//! `build_kickoff_prompt` (spec.md §4.7). No prompt text is assembled here
//! -- only the typed inputs the deterministic builder needs.

use riskgraph_kernel::investigation::{ChangedFile, Phase0Classification};
use riskgraph_kernel::ports::Phase1MetricsPort;
use riskgraph_kernel::prompt::{build_kickoff_prompt, DataQualityContext, KickoffInputs};
use riskgraph_kernel::resolution::ResolvedPath;

use crate::error::{GraphError, QueryError};
use crate::file_resolver::FileResolver;
use crate::graph_store::GraphStore;

/// Aggregate link-quality summary over a repository, computed from counts
/// already in the graph rather than re-deriving them per investigation
/// (spec.md §4.7 point 2, glossary "CLQS").
pub async fn compute_data_quality(
    graph: &GraphStore,
    repo_id: &str,
) -> Result<DataQualityContext, GraphError> {
    let total_issues: i64 = first_count(
        graph,
        "MATCH (i:Issue {repo_id: $repo_id}) RETURN count(i) AS n",
        repo_id,
    )
    .await?;
    let linked_issues: i64 = first_count(
        graph,
        "MATCH (i:Issue {repo_id: $repo_id})-[r]->() \
         WHERE type(r) IN ['REFERENCES', 'CLOSED_BY', 'ASSOCIATED_WITH', 'FIXED_BY'] \
         RETURN count(DISTINCT i) AS n",
        repo_id,
    )
    .await?;
    let tier_a_links: i64 = first_count(
        graph,
        "MATCH (i:Issue {repo_id: $repo_id})-[r]->() \
         WHERE type(r) IN ['REFERENCES', 'CLOSED_BY'] RETURN count(DISTINCT i) AS n",
        repo_id,
    )
    .await?;
    let tier_b_avg_confidence: f64 = first_float(
        graph,
        "MATCH (i:Issue {repo_id: $repo_id})-[r]->() \
         WHERE type(r) IN ['ASSOCIATED_WITH', 'FIXED_BY'] \
         RETURN avg(r.confidence) AS n",
        repo_id,
    )
    .await?;

    let coverage = ratio(linked_issues, total_issues);
    let evidence_diversity = if total_issues == 0 {
        0.0
    } else {
        ratio(tier_a_links, total_issues) * 0.5 + coverage * 0.5
    };
    let temporal_precision = ratio(tier_a_links, total_issues.max(1));
    let semantic_strength = if tier_b_avg_confidence.is_nan() {
        coverage
    } else {
        tier_b_avg_confidence
    };

    Ok(DataQualityContext {
        issue_pr_link_coverage: coverage,
        evidence_diversity,
        temporal_precision,
        semantic_strength,
    })
}

fn ratio(num: i64, denom: i64) -> f64 {
    if denom == 0 {
        0.0
    } else {
        (num as f64 / denom as f64).clamp(0.0, 1.0)
    }
}

async fn first_count(graph: &GraphStore, cypher: &str, repo_id: &str) -> Result<i64, GraphError> {
    let rows = graph
        .query_rows(cypher, vec![("repo_id", serde_json::json!(repo_id))], |row| {
            row.get::<i64>("n")
        })
        .await?;
    Ok(rows.into_iter().next().unwrap_or(0))
}

async fn first_float(graph: &GraphStore, cypher: &str, repo_id: &str) -> Result<f64, GraphError> {
    let rows = graph
        .query_rows(cypher, vec![("repo_id", serde_json::json!(repo_id))], |row| {
            row.get::<f64>("n")
        })
        .await?;
    Ok(rows.into_iter().next().unwrap_or(f64::NAN))
}

/// Resolves every changed file's historical aliases via C5, fetches Phase 1
/// metrics via the `Phase1MetricsPort`, and assembles the kickoff prompt.
pub async fn build_kickoff<M: Phase1MetricsPort>(
    graph: &GraphStore,
    file_resolver: &FileResolver,
    metrics: &M,
    repo_id: &str,
    changed_files: &[ChangedFile],
    phase0: &Phase0Classification,
) -> Result<String, QueryError> {
    let data_quality = compute_data_quality(graph, repo_id).await?;

    let mut resolutions: Vec<(String, Vec<ResolvedPath>)> = Vec::new();
    for file in changed_files {
        let matches = file_resolver
            .resolve(&file.current_path)
            .map_err(|e| QueryError::FileResolution(e.to_string()))?;
        resolutions.push((file.current_path.clone(), matches));
    }

    let mut phase1_by_path = Vec::new();
    for file in changed_files {
        let m = metrics
            .metrics_for_path(repo_id, &file.current_path)
            .await
            .map_err(|e| QueryError::Phase1Metrics(e.to_string()))?;
        phase1_by_path.push((file.current_path.clone(), m));
    }

    let inputs = KickoffInputs {
        changed_files,
        resolutions: &resolutions,
        phase1_by_path: &phase1_by_path,
        phase0,
        data_quality,
    };
    Ok(build_kickoff_prompt(&inputs))
}
