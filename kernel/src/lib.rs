pub mod config;
pub mod confidence;
pub mod error;
pub mod graph;
pub mod history;
pub mod investigation;
pub mod ports;
pub mod prompt;
pub mod resolution;
pub mod risk;

pub use config::Config;
pub use error::ConfigError;
pub use investigation::{Investigation, InvestigationState, RiskAssessment};
pub use risk::RiskLevel;
