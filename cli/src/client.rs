//! Simulated chain session and output helpers

use anyhow::{bail, Context, Result};
use colored::Colorize;
use distmarket_coordinator::{explorer_tx_url, MarketCoordinator, SimMarketParams, SimState, SimulatedMarket};
use distribution_model::{format_ether, parse_ether, Address, Amount, TxHash};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CliConfig;

/// The simulated chain loaded from the state file
pub struct Session {
    pub sim: Arc<SimulatedMarket>,
    path: PathBuf,
}

impl Session {
    /// Load the chain persisted at `config.state_file`
    pub fn open(config: &CliConfig) -> Result<Self> {
        let path = config.state_file.clone();
        if !path.exists() {
            bail!(
                "State file not found: {}\n\
                 Create one with: distmarket init",
                path.display()
            );
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let sim = SimulatedMarket::from_json(&json)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        debug!("loaded {} market(s) from {}", sim.state().markets.len(), path.display());
        Ok(Self { sim: Arc::new(sim), path })
    }

    /// Fresh chain with one market seeded from `params`
    pub fn create(path: &Path, signer: Address, params: &SimMarketParams, force: bool) -> Result<(Self, Address)> {
        if path.exists() && !force {
            bail!("State file already exists: {} (use --force to overwrite)", path.display());
        }
        let mut state = SimState::new(signer);
        let market = state.deploy(params).context("Failed to deploy simulated market")?;
        let session = Self { sim: Arc::new(SimulatedMarket::new(state)), path: path.to_path_buf() };
        session.save()?;
        Ok((session, market))
    }

    /// Persist the chain back to its state file
    pub fn save(&self) -> Result<()> {
        let json = self.sim.to_json().context("Failed to serialize state")?;
        fs::write(&self.path, json).with_context(|| format!("Failed to write state file: {}", self.path.display()))
    }

    /// `requested`, or the first deployed market
    pub fn market(&self, requested: Option<Address>) -> Result<Address> {
        let state = self.sim.state();
        match requested {
            Some(market) => {
                if !state.markets.iter().any(|m| m.address == market) {
                    bail!("Unknown market: {}", market);
                }
                Ok(market)
            }
            None => state
                .markets
                .first()
                .map(|m| m.address)
                .context("No markets deployed; run `distmarket init` or `distmarket market create`"),
        }
    }

    /// Mount a coordinator for the signer on `market`
    pub async fn coordinator(&self, config: &CliConfig, market: Option<Address>) -> Result<MarketCoordinator> {
        let market = self.market(market)?;
        let signer = self.sim.signer();
        Ok(MarketCoordinator::mount(self.sim.clone(), market, signer, config.coordinator.clone()).await)
    }
}

/// Parse a decimal collateral amount (`1.5` = 1.5 * 10^18)
pub fn parse_amount(text: &str) -> Result<Amount> {
    parse_ether(text).with_context(|| format!("Invalid amount: {}", text))
}

pub fn format_amount(amount: &Amount) -> String {
    format_ether(amount)
}

/// Pretty print a hash as a shortened explorer link
pub fn format_hash(hash: &TxHash, explorer: &str) -> String {
    let full = hash.to_string();
    let short = format!("{}...{}", &full[0..10], &full[full.len() - 8..]);
    format!("{} ({})", short.bright_blue(), explorer_tx_url(explorer, hash).dimmed())
}

/// Pretty print an address in shortened form
pub fn format_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[0..8], &full[full.len() - 6..]).bright_yellow().to_string()
}
