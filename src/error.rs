use thiserror::Error;

/// Configuration problems detected before any simulation state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unknown normalization method: {0} (expected zscore, rank or demean)")]
    UnknownNormalization(String),

    #[error("Unknown rebalance frequency: {0} (expected daily, weekly, monthly or quarterly)")]
    UnknownRebalanceFrequency(String),

    #[error("Unknown factor: {name}. Available: {}", available.join(", "))]
    UnknownFactor {
        name: String,
        available: Vec<String>,
    },

    #[error("Setting {key} is invalid (value: {value}): {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid<K, V, R>(key: K, value: V, reason: R) -> Self
    where
        K: Into<String>,
        V: ToString,
        R: Into<String>,
    {
        ConfigError::InvalidSetting {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
