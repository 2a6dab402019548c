//! C8 Tool Registry: a declarative list pairing tool names with JSON
//! argument schemas, each mapping to a single C6 operation (spec.md §4.8).
//! `finish_investigation` is advertised alongside them but terminates the
//! loop rather than dispatching to C6; C9 handles it directly.

use serde_json::json;

use riskgraph_kernel::ports::{LlmToolCall, LlmToolSchema};

use crate::error::QueryError;
use crate::query::QueryPort;

pub const FINISH_INVESTIGATION: &str = "finish_investigation";

/// Like `finish_investigation`, handled by C9 directly rather than
/// dispatched to C6: the model's per-hop structured self-assessment
/// (spec.md §4.9 "Confidence tracking"). Advertised alongside the C6
/// operations so it can ride in the same tool-call batch as the hop's data
/// queries.
pub const CONFIDENCE_REPORT: &str = "confidence_report";

/// Every tool name the investigator may call, in the order advertised to
/// the model. Kept as a plain static list rather than a proc-macro-collected
/// registry -- the catalog is small and fixed (spec.md §4.8).
pub fn schemas() -> Vec<LlmToolSchema> {
    vec![
        LlmToolSchema {
            name: "ownership_timeline".to_string(),
            description: "Per-developer commit counts and recency over the given historical paths.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {"paths": {"type": "array", "items": {"type": "string"}}},
                "required": ["paths"]
            })
            .to_string(),
        },
        LlmToolSchema {
            name: "cochange_with_context".to_string(),
            description: "Partner files ranked by co-change frequency, with example commit messages.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "paths": {"type": "array", "items": {"type": "string"}},
                    "min_freq": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                },
                "required": ["paths", "min_freq"]
            })
            .to_string(),
        },
        LlmToolSchema {
            name: "incidents_with_context".to_string(),
            description: "Linked issues with title/body/labels, link confidence, and fix commit SHA.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "paths": {"type": "array", "items": {"type": "string"}},
                    "days_back": {"type": "integer"}
                },
                "required": ["paths", "days_back"]
            })
            .to_string(),
        },
        LlmToolSchema {
            name: "blast_radius".to_string(),
            description: "Downstream files coupled to a path via co-change, with their own incident counts.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "max_depth": {"type": "integer"},
                    "min_freq": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                },
                "required": ["path", "max_depth", "min_freq"]
            })
            .to_string(),
        },
        LlmToolSchema {
            name: "recent_commits".to_string(),
            description: "Most recent commits touching any of the given paths.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "paths": {"type": "array", "items": {"type": "string"}},
                    "limit": {"type": "integer"}
                },
                "required": ["paths", "limit"]
            })
            .to_string(),
        },
        LlmToolSchema {
            name: "commit_patch".to_string(),
            description: "The stored patch text for a commit SHA.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {"sha": {"type": "string"}},
                "required": ["sha"]
            })
            .to_string(),
        },
        LlmToolSchema {
            name: CONFIDENCE_REPORT.to_string(),
            description: "Report structured self-assessment confidence for the current hop.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "reasoning": {"type": "string"},
                    "next_action": {"type": "string", "enum": ["FINALIZE", "GATHER_MORE_EVIDENCE", "EXPAND_GRAPH"]}
                },
                "required": ["confidence", "reasoning", "next_action"]
            })
            .to_string(),
        },
        LlmToolSchema {
            name: FINISH_INVESTIGATION.to_string(),
            description: "Terminate the investigation with a final structured risk assessment.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "risk_level": {"type": "string", "enum": ["CRITICAL", "HIGH", "MEDIUM", "LOW", "MINIMAL"]},
                    "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "summary": {"type": "string"},
                    "reasoning": {"type": "string"},
                    "recommendations": {"type": "array", "items": {"type": "string"}},
                    "evidence": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["risk_level", "confidence", "summary", "reasoning"]
            })
            .to_string(),
        },
    ]
}

fn arg_str(args: &serde_json::Value, key: &str) -> String {
    args.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn arg_str_list(args: &serde_json::Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn arg_f64(args: &serde_json::Value, key: &str, default: f64) -> f64 {
    args.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

fn arg_u32(args: &serde_json::Value, key: &str, default: u32) -> u32 {
    args.get(key).and_then(|v| v.as_u64()).map(|v| v as u32).unwrap_or(default)
}

fn arg_i64(args: &serde_json::Value, key: &str, default: i64) -> i64 {
    args.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

/// Dispatches one non-`finish_investigation` tool call to the matching C6
/// operation, returning the result serialized as JSON text (the shape C9
/// re-attaches to the conversation and C11 checkpoints). A failed
/// underlying query is embedded as a JSON error object rather than
/// propagated -- a single failed tool call must not abort the hop; the
/// model sees the failure and can adapt.
pub async fn dispatch<Q: QueryPort + ?Sized>(query: &Q, call: &LlmToolCall) -> String {
    let args: serde_json::Value =
        serde_json::from_str(&call.arguments_json).unwrap_or(serde_json::Value::Null);

    let result: Result<String, QueryError> = async {
        match call.tool_name.as_str() {
            "ownership_timeline" => {
                let paths = arg_str_list(&args, "paths");
                Ok(serde_json::to_string(&query.ownership_timeline(&paths).await?).unwrap_or_default())
            }
            "cochange_with_context" => {
                let paths = arg_str_list(&args, "paths");
                let min_freq = arg_f64(&args, "min_freq", 0.3);
                Ok(serde_json::to_string(&query.cochange_with_context(&paths, min_freq).await?).unwrap_or_default())
            }
            "incidents_with_context" => {
                let paths = arg_str_list(&args, "paths");
                let days_back = arg_i64(&args, "days_back", 365);
                Ok(serde_json::to_string(&query.incidents_with_context(&paths, days_back).await?).unwrap_or_default())
            }
            "blast_radius" => {
                let path = arg_str(&args, "path");
                let max_depth = arg_u32(&args, "max_depth", 2);
                let min_freq = arg_f64(&args, "min_freq", 0.3);
                Ok(serde_json::to_string(&query.blast_radius(&path, max_depth, min_freq).await?).unwrap_or_default())
            }
            "recent_commits" => {
                let paths = arg_str_list(&args, "paths");
                let limit = arg_u32(&args, "limit", 10);
                Ok(serde_json::to_string(&query.recent_commits(&paths, limit).await?).unwrap_or_default())
            }
            "commit_patch" => {
                let sha = arg_str(&args, "sha");
                Ok(serde_json::to_string(&query.commit_patch(&sha)?).unwrap_or_default())
            }
            other => Ok(json!({"error": format!("unknown tool: {other}")}).to_string()),
        }
    }
    .await;

    result.unwrap_or_else(|e| json!({"error": e.to_string()}).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_investigation_is_advertised() {
        assert!(schemas().iter().any(|s| s.name == FINISH_INVESTIGATION));
    }

    #[test]
    fn confidence_report_is_advertised() {
        assert!(schemas().iter().any(|s| s.name == CONFIDENCE_REPORT));
    }

    #[test]
    fn arg_helpers_parse_expected_shapes() {
        let args = json!({"paths": ["a.rs", "b.rs"], "min_freq": 0.5, "max_depth": 3});
        assert_eq!(arg_str_list(&args, "paths"), vec!["a.rs", "b.rs"]);
        assert_eq!(arg_f64(&args, "min_freq", 0.0), 0.5);
        assert_eq!(arg_u32(&args, "max_depth", 1), 3);
    }
}
