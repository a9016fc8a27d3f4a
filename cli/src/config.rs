//! CLI configuration: state file location, signer and coordinator tunables

use anyhow::{Context, Result};
use distmarket_coordinator::{CoordinatorConfig, SimMarketParams};
use distribution_model::Address;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Account used when no signer is configured
pub const DEFAULT_SIGNER: Address = Address([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xa1,
]);

pub const DEFAULT_STATE_FILE: &str = "distmarket-state.json";

pub const DEFAULT_EXPLORER: &str = "https://explorer.testnet.rootstock.io";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// JSON file holding the simulated chain between invocations
    pub state_file: PathBuf,
    pub signer: Address,
    /// Block explorer base URL for transaction links
    pub explorer_url: String,
    pub coordinator: CoordinatorConfig,
    /// Market seeded by `init`
    pub market: SimMarketParams,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            signer: DEFAULT_SIGNER,
            explorer_url: DEFAULT_EXPLORER.to_string(),
            coordinator: CoordinatorConfig::default(),
            market: SimMarketParams::default(),
        }
    }
}

impl CliConfig {
    /// Load from `path` if given, otherwise defaults; `state` overrides the state file
    pub fn new(path: Option<&Path>, state: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(state) = state {
            config.state_file = state;
        }
        config.state_file = expand_path(&config.state_file)?;
        Ok(config)
    }

    fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Expand `~` and `$VARS` in a configured path
fn expand_path(path: &Path) -> Result<PathBuf> {
    let Some(raw) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    let expanded =
        shellexpand::full(raw).with_context(|| format!("Failed to expand path: {}", path.display()))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = CliConfig::new(None, None).unwrap();
        assert_eq!(config.state_file, PathBuf::from(DEFAULT_STATE_FILE));
        assert_eq!(config.signer, DEFAULT_SIGNER);
        assert_eq!(config.coordinator.debounce_ms, 200);
    }

    #[test]
    fn test_nested_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
state_file = "/tmp/market.json"
signer = "0x00000000000000000000000000000000000000b2"

[coordinator]
debounce_ms = 25

[market]
mean = 50.0
sigma = 5.0
k = 1.0
b = 25.0
description = "ETH close"
"#
        )
        .unwrap();

        let config = CliConfig::new(Some(file.path()), None).unwrap();
        assert_eq!(config.state_file, PathBuf::from("/tmp/market.json"));
        assert_eq!(config.signer.0[19], 0xb2);
        assert_eq!(config.coordinator.debounce_ms, 25);
        assert_eq!(config.coordinator.curve_steps, 100);
        assert_eq!(config.market.mean, 50.0);
        assert!(config.market.collateral_token.is_zero());
    }

    #[test]
    fn test_state_override() {
        let config = CliConfig::new(None, Some(PathBuf::from("/tmp/other.json"))).unwrap();
        assert_eq!(config.state_file, PathBuf::from("/tmp/other.json"));
    }

    #[test]
    fn test_expand_path() {
        let home = PathBuf::from(shellexpand::tilde("~").into_owned());
        assert_eq!(expand_path(Path::new("~/market.json")).unwrap(), home.join("market.json"));
        assert_eq!(expand_path(Path::new("~")).unwrap(), home);
        assert_eq!(
            expand_path(Path::new("/tmp/market.json")).unwrap(),
            PathBuf::from("/tmp/market.json")
        );
        assert!(expand_path(Path::new("$DISTMARKET_UNSET_TEST_VAR/state.json")).is_err());
    }
}
