//! Layered configuration in the corpus's own style: a typed `Config` with
//! defaults, and `ConfigLayer`s of all-`Option` fields merged in order via
//! `apply_layer`. Every budget and threshold spec.md treats as "a
//! configuration input, not a hardcoded constant" (§9) lives here.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StagingConfig {
    pub pool_size: u32,
    pub batch_size: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        StagingConfig {
            pool_size: 50,
            batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GraphStoreConfig {
    pub batch_size: usize,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        GraphStoreConfig {
            batch_size: 1000,
            read_timeout_secs: 30,
            write_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkResolverConfig {
    pub batch_size: usize,
    pub comments_per_issue: usize,
    pub base_confidence_prior: f64,
    pub temporal_multiplier: f64,
    pub semantic_multiplier: f64,
    pub file_overlap_multiplier: f64,
    pub confidence_ceiling: f64,
    pub acceptance_floor: f64,
    pub min_validators_passed: u8,
    pub temporal_window_days: i64,
    pub file_overlap_threshold: f64,
    pub max_retries: u8,
}

impl Default for LinkResolverConfig {
    fn default() -> Self {
        LinkResolverConfig {
            batch_size: 20,
            comments_per_issue: 10,
            base_confidence_prior: 0.6,
            temporal_multiplier: 1.2,
            semantic_multiplier: 1.3,
            file_overlap_multiplier: 1.2,
            confidence_ceiling: 0.95,
            acceptance_floor: 0.7,
            min_validators_passed: 2,
            temporal_window_days: 7,
            file_overlap_threshold: 0.3,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub phase_wall_clock_budget_secs: u64,
    pub derive_scenarios: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            phase_wall_clock_budget_secs: 3600,
            derive_scenarios: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_hops: u32,
    pub hop_timeout_secs: u64,
    pub total_timeout_secs: u64,
    pub finalize_confidence_threshold: f64,
    pub breakthrough_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_hops: 30,
            hop_timeout_secs: 60,
            total_timeout_secs: 600,
            finalize_confidence_threshold: 0.85,
            breakthrough_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub token_budget: f64,
    pub recent_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            token_budget: 2000.0,
            recent_window: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Config {
    pub staging: StagingConfig,
    pub graph_store: GraphStoreConfig,
    pub link_resolver: LinkResolverConfig,
    pub builder: BuilderConfig,
    pub engine: EngineConfig,
    pub history: HistoryConfig,
}

/// One configuration source. All fields optional; only present fields
/// override the accumulated config (teacher's `apply_layer` pattern).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigLayer {
    pub staging_pool_size: Option<u32>,
    pub staging_batch_size: Option<usize>,
    pub graph_batch_size: Option<usize>,
    pub graph_read_timeout_secs: Option<u64>,
    pub graph_write_timeout_secs: Option<u64>,
    pub link_resolver_batch_size: Option<usize>,
    pub link_resolver_confidence_floor: Option<f64>,
    pub builder_phase_budget_secs: Option<u64>,
    pub builder_derive_scenarios: Option<bool>,
    pub engine_max_hops: Option<u32>,
    pub engine_hop_timeout_secs: Option<u64>,
    pub engine_total_timeout_secs: Option<u64>,
    pub history_token_budget: Option<f64>,
    pub history_recent_window: Option<usize>,
}

impl Config {
    pub fn from_layers(layers: &[ConfigLayer]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for layer in layers {
            config.apply_layer(layer);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_layer(&mut self, layer: &ConfigLayer) {
        if let Some(v) = layer.staging_pool_size {
            self.staging.pool_size = v;
        }
        if let Some(v) = layer.staging_batch_size {
            self.staging.batch_size = v;
        }
        if let Some(v) = layer.graph_batch_size {
            self.graph_store.batch_size = v;
        }
        if let Some(v) = layer.graph_read_timeout_secs {
            self.graph_store.read_timeout_secs = v;
        }
        if let Some(v) = layer.graph_write_timeout_secs {
            self.graph_store.write_timeout_secs = v;
        }
        if let Some(v) = layer.link_resolver_batch_size {
            self.link_resolver.batch_size = v;
        }
        if let Some(v) = layer.link_resolver_confidence_floor {
            // This only ever lowers or raises the acceptance floor, never
            // the hard [0.4,0.95] range enforced in `graph::validate_inferred_confidence`.
            self.link_resolver.acceptance_floor = v;
        }
        if let Some(v) = layer.builder_phase_budget_secs {
            self.builder.phase_wall_clock_budget_secs = v;
        }
        if let Some(v) = layer.builder_derive_scenarios {
            self.builder.derive_scenarios = v;
        }
        if let Some(v) = layer.engine_max_hops {
            self.engine.max_hops = v;
        }
        if let Some(v) = layer.engine_hop_timeout_secs {
            self.engine.hop_timeout_secs = v;
        }
        if let Some(v) = layer.engine_total_timeout_secs {
            self.engine.total_timeout_secs = v;
        }
        if let Some(v) = layer.history_token_budget {
            self.history.token_budget = v;
        }
        if let Some(v) = layer.history_recent_window {
            self.history.recent_window = v;
        }
    }

    /// Rejects configuration that cannot possibly produce a correct build
    /// or investigation (spec.md §7 "Configuration" errors: "fatal;
    /// surfaced immediately at component construction").
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.link_resolver.acceptance_floor) {
            return Err(ConfigError::invalid(
                "link_resolver.acceptance_floor",
                "must be within [0,1]",
            ));
        }
        if self.link_resolver.base_confidence_prior < 0.4 {
            return Err(ConfigError::invalid(
                "link_resolver.base_confidence_prior",
                "must be at least the Tier-B confidence floor (0.4)",
            ));
        }
        if self.engine.max_hops == 0 {
            return Err(ConfigError::invalid("engine.max_hops", "must be >= 1"));
        }
        if self.staging.pool_size == 0 {
            return Err(ConfigError::invalid("staging.pool_size", "must be >= 1"));
        }
        if self.history.recent_window == 0 {
            return Err(ConfigError::invalid(
                "history.recent_window",
                "must be >= 1 or the most recent tool result could be pruned",
            ));
        }
        Ok(())
    }
}
