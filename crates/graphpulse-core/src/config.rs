use serde::{Deserialize, Serialize};

use crate::{PulseError, Result};

/// Tuning surface for the adaptive engine. Every field has a default so a
/// bare `AdaptiveConfig::default()` (or an empty config file section) is a
/// working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Record consumer queries and feed them into correlation.
    #[serde(default = "default_true")]
    pub observe_queries: bool,

    /// Record graph changes and feed them into correlation.
    #[serde(default = "default_true")]
    pub observe_changes: bool,

    /// Run the query/change correlation pass at all.
    #[serde(default = "default_true")]
    pub enable_correlation: bool,

    /// Sliding window pairing a query with the changes that follow it.
    #[serde(default = "default_correlation_window_ms")]
    pub correlation_window_ms: u64,

    /// Correlations scoring below this are discarded.
    #[serde(default = "default_min_correlation_strength")]
    pub min_correlation_strength: f64,

    /// Cap on requests waiting in the reindex queue.
    #[serde(default = "default_max_pending_requests")]
    pub max_pending_requests: usize,

    /// Requests drawn per processing pass.
    #[serde(default = "default_reindex_batch_size")]
    pub reindex_batch_size: usize,

    /// Quiet window before a processing pass runs.
    #[serde(default = "default_reindex_debounce_ms")]
    pub reindex_debounce_ms: u64,

    /// Inactivity after which a session stops being the active one.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_correlation_window_ms() -> u64 {
    60_000
}

fn default_min_correlation_strength() -> f64 {
    0.5
}

fn default_max_pending_requests() -> usize {
    100
}

fn default_reindex_batch_size() -> usize {
    10
}

fn default_reindex_debounce_ms() -> u64 {
    2_000
}

fn default_session_timeout_ms() -> u64 {
    1_800_000
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            observe_queries: true,
            observe_changes: true,
            enable_correlation: true,
            correlation_window_ms: default_correlation_window_ms(),
            min_correlation_strength: default_min_correlation_strength(),
            max_pending_requests: default_max_pending_requests(),
            reindex_batch_size: default_reindex_batch_size(),
            reindex_debounce_ms: default_reindex_debounce_ms(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reindex_batch_size == 0 {
            return Err(PulseError::InvalidConfig(
                "reindex_batch_size must be at least 1".into(),
            ));
        }
        if self.max_pending_requests == 0 {
            return Err(PulseError::InvalidConfig(
                "max_pending_requests must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_correlation_strength) {
            return Err(PulseError::InvalidConfig(format!(
                "min_correlation_strength must be within [0, 1], got {}",
                self.min_correlation_strength
            )));
        }
        if self.correlation_window_ms == 0 {
            return Err(PulseError::InvalidConfig(
                "correlation_window_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AdaptiveConfig::default();
        config.validate().unwrap();
        assert_eq!(config.correlation_window_ms, 60_000);
        assert_eq!(config.min_correlation_strength, 0.5);
        assert_eq!(config.max_pending_requests, 100);
        assert_eq!(config.reindex_batch_size, 10);
        assert_eq!(config.reindex_debounce_ms, 2_000);
        assert_eq!(config.session_timeout_ms, 1_800_000);
    }

    #[test]
    fn empty_json_fills_defaults() {
        let config: AdaptiveConfig = serde_json::from_str("{}").unwrap();
        assert!(config.observe_queries);
        assert!(config.observe_changes);
        assert!(config.enable_correlation);
        assert_eq!(config.reindex_batch_size, 10);
    }

    #[test]
    fn rejects_out_of_range_strength() {
        let config = AdaptiveConfig {
            min_correlation_strength: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = AdaptiveConfig {
            reindex_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
