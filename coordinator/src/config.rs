//! Coordinator configuration

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;

/// Tunables for one market coordinator; every field has a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Quiet period after the last proposal edit before a quote is fetched
    pub debounce_ms: u64,
    /// Intervals sampled by `MarketCoordinator::curve`
    pub curve_steps: usize,
    /// Cached vs. fresh collateral divergence that counts as a moved quote
    pub divergence_warn_bps: u64,
    /// Abort the submission instead of warning when the quote moved
    pub block_on_divergence: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            curve_steps: distribution_model::DEFAULT_CURVE_STEPS,
            divergence_warn_bps: 100,
            block_on_divergence: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CoordinatorError> {
        toml::from_str(text).map_err(|e| CoordinatorError::InvalidInput(format!("config: {}", e)))
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self, CoordinatorError> {
        let text = fs::read_to_string(path)
            .map_err(|e| CoordinatorError::InvalidInput(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(200));
        assert_eq!(config.curve_steps, 100);
        assert!(!config.block_on_divergence);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CoordinatorConfig::from_toml_str("debounce_ms = 50\nblock_on_divergence = true\n").unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert!(config.block_on_divergence);
        assert_eq!(config.divergence_warn_bps, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "curve_steps = 20").unwrap();
        let config = CoordinatorConfig::load(file.path()).unwrap();
        assert_eq!(config.curve_steps, 20);
    }

    #[test]
    fn test_bad_toml_is_invalid_input() {
        assert!(CoordinatorConfig::from_toml_str("debounce_ms = \"soon\"").is_err());
    }
}
