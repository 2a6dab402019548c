use thiserror::Error;

/// Raised at component construction when a configured value is missing or
/// out of range. Always fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {field}")]
    Missing { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
