//! Loads `riskgraph_kernel::config::Config` from a TOML file layer and an
//! environment-variable layer, composed the way the corpus composes its
//! own config layers (defaults, then file, then environment, later layers
//! win).

use std::env;
use std::path::Path;

use riskgraph_kernel::config::{Config, ConfigLayer};
use riskgraph_kernel::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// The on-disk shape of a config file: every field optional, same layout as
/// `ConfigLayer` but with TOML-friendly naming.
#[derive(Debug, Default, serde::Deserialize)]
struct FileLayer {
    staging_pool_size: Option<u32>,
    staging_batch_size: Option<usize>,
    graph_batch_size: Option<usize>,
    graph_read_timeout_secs: Option<u64>,
    graph_write_timeout_secs: Option<u64>,
    link_resolver_batch_size: Option<usize>,
    link_resolver_confidence_floor: Option<f64>,
    builder_phase_budget_secs: Option<u64>,
    builder_derive_scenarios: Option<bool>,
    engine_max_hops: Option<u32>,
    engine_hop_timeout_secs: Option<u64>,
    engine_total_timeout_secs: Option<u64>,
    history_token_budget: Option<f64>,
    history_recent_window: Option<usize>,
}

impl From<FileLayer> for ConfigLayer {
    fn from(f: FileLayer) -> Self {
        ConfigLayer {
            staging_pool_size: f.staging_pool_size,
            staging_batch_size: f.staging_batch_size,
            graph_batch_size: f.graph_batch_size,
            graph_read_timeout_secs: f.graph_read_timeout_secs,
            graph_write_timeout_secs: f.graph_write_timeout_secs,
            link_resolver_batch_size: f.link_resolver_batch_size,
            link_resolver_confidence_floor: f.link_resolver_confidence_floor,
            builder_phase_budget_secs: f.builder_phase_budget_secs,
            builder_derive_scenarios: f.builder_derive_scenarios,
            engine_max_hops: f.engine_max_hops,
            engine_hop_timeout_secs: f.engine_hop_timeout_secs,
            engine_total_timeout_secs: f.engine_total_timeout_secs,
            history_token_budget: f.history_token_budget,
            history_recent_window: f.history_recent_window,
        }
    }
}

fn env_layer() -> ConfigLayer {
    fn parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        env::var(key).ok().and_then(|v| v.parse().ok())
    }

    ConfigLayer {
        staging_pool_size: parse("RISKGRAPH_STAGING_POOL_SIZE"),
        staging_batch_size: parse("RISKGRAPH_STAGING_BATCH_SIZE"),
        graph_batch_size: parse("RISKGRAPH_GRAPH_BATCH_SIZE"),
        graph_read_timeout_secs: parse("RISKGRAPH_GRAPH_READ_TIMEOUT_SECS"),
        graph_write_timeout_secs: parse("RISKGRAPH_GRAPH_WRITE_TIMEOUT_SECS"),
        link_resolver_batch_size: parse("RISKGRAPH_LINK_RESOLVER_BATCH_SIZE"),
        link_resolver_confidence_floor: parse("RISKGRAPH_LINK_RESOLVER_CONFIDENCE_FLOOR"),
        builder_phase_budget_secs: parse("RISKGRAPH_BUILDER_PHASE_BUDGET_SECS"),
        builder_derive_scenarios: parse("RISKGRAPH_BUILDER_DERIVE_SCENARIOS"),
        engine_max_hops: parse("RISKGRAPH_ENGINE_MAX_HOPS"),
        engine_hop_timeout_secs: parse("RISKGRAPH_ENGINE_HOP_TIMEOUT_SECS"),
        engine_total_timeout_secs: parse("RISKGRAPH_ENGINE_TOTAL_TIMEOUT_SECS"),
        history_token_budget: parse("RISKGRAPH_HISTORY_TOKEN_BUDGET"),
        history_recent_window: parse("RISKGRAPH_HISTORY_RECENT_WINDOW"),
    }
}

/// Loads configuration from, in order: defaults, an optional TOML file (if
/// `path` exists), then environment variables. Missing file is not an
/// error -- only a malformed one is.
pub fn load(path: Option<&Path>) -> Result<Config, LoadError> {
    let mut layers = Vec::new();

    if let Some(path) = path {
        if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let file_layer: FileLayer = toml::from_str(&text).map_err(|source| LoadError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            layers.push(ConfigLayer::from(file_layer));
        }
    }

    layers.push(env_layer());

    Ok(Config::from_layers(&layers)?)
}

/// A GitHub personal access token, required for the default
/// `RepositoryFetcherPort`/`create_git_issue`-style adapters. Surfaced as a
/// `StagingError`-shaped configuration failure at construction per spec.md
/// §7 ("Configuration: missing credentials... fatal").
pub fn require_github_token() -> Result<String, ConfigError> {
    env::var("GITHUB_PAT").map_err(|_| ConfigError::Missing {
        field: "GITHUB_PAT",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load(Some(Path::new("/nonexistent/riskgraph.toml"))).unwrap();
        assert_eq!(config.engine.max_hops, 30);
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("riskgraph.toml");
        std::fs::write(&path, "engine_max_hops = 5\n").unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.engine.max_hops, 5);
    }
}
