//! Market inspection and creation

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use colored::Colorize;
use distmarket_coordinator::{MarketDirectory, MarketParams, RemoteRead};
use distribution_model::{Address, CollateralAsset, ProposedState};

use crate::client::{format_address, format_amount, format_hash, Session};
use crate::config::CliConfig;

/// Create the state file with the configured market
pub async fn init(config: &CliConfig, force: bool) -> Result<()> {
    println!("{}", "=== Initialize Simulated Market ===".bright_green().bold());
    let (_, market) = Session::create(&config.state_file, config.signer, &config.market, force)?;

    println!("{} {}", "State file:".bright_cyan(), config.state_file.display());
    println!("{} {}", "Market:".bright_cyan(), market);
    println!("{} {}", "Signer:".bright_cyan(), config.signer);
    println!(
        "{} N({}, {})",
        "Consensus:".bright_cyan(),
        config.market.mean,
        config.market.sigma
    );
    Ok(())
}

pub async fn show(config: &CliConfig, market: Option<Address>) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Market ===".bright_green().bold());
    println!("{} {}", "Address:".bright_cyan(), coordinator.market_address());

    match coordinator.consensus() {
        RemoteRead::Ready(consensus) => {
            println!("{} {}", "Description:".bright_cyan(), consensus.description);
            println!("{} {}", "Mean:".bright_cyan(), consensus.mean);
            println!("{} {}", "Sigma:".bright_cyan(), consensus.sigma);
            if let Some(reason) = coordinator.market_error() {
                println!("{} {}", "Stale (last refresh failed):".yellow(), reason);
            }
        }
        RemoteRead::Failed(reason) => println!("{} {}", "Market read failed:".red(), reason),
        RemoteRead::Pending => println!("{}", "Market not loaded".dimmed()),
    }

    match coordinator.collateral_asset() {
        Some(CollateralAsset::Native) => println!("{} {}", "Collateral:".bright_cyan(), "native"),
        Some(CollateralAsset::Token(token)) => {
            println!("{} token {}", "Collateral:".bright_cyan(), format_address(&token))
        }
        None => {}
    }

    if let RemoteRead::Ready(position) = coordinator.liquidity() {
        println!("{} {}", "Pool collateral:".bright_cyan(), format_amount(&position.total_collateral));
        println!("{} {}", "Pool shares:".bright_cyan(), format_amount(&position.total_shares));
    }
    Ok(())
}

/// Print the consensus vs. proposal densities
pub async fn curve(
    config: &CliConfig,
    market: Option<Address>,
    steps: Option<usize>,
    mu: Option<f64>,
    sigma: Option<f64>,
) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    if let Some(draft) = coordinator.proposed() {
        let proposal = ProposedState::new(mu.unwrap_or(draft.mu), sigma.unwrap_or(draft.sigma));
        if proposal != draft {
            coordinator.set_proposed(proposal)?;
        }
    }

    let steps = steps.unwrap_or(config.coordinator.curve_steps);
    let curve = coordinator.curve_with_steps(steps).context("Market not loaded")?;

    println!("{}", "=== Distribution Curve ===".bright_green().bold());
    println!("{:>14} {:>14} {:>14}", "x".bright_cyan(), "consensus".bright_cyan(), "proposed".bright_cyan());
    for point in curve {
        println!("{:>14.4} {:>14.6} {:>14.6}", point.x, point.pdf_consensus, point.pdf_proposed);
    }
    Ok(())
}

pub async fn bounds(config: &CliConfig, market: Option<Address>) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;
    let bounds = coordinator.bounds().context("Market not loaded")?;

    println!("{}", "=== Proposal Bounds ===".bright_green().bold());
    println!("{} [{}, {}]", "mu:".bright_cyan(), bounds.mu_min, bounds.mu_max);
    println!("{} [{}, {}]", "sigma:".bright_cyan(), bounds.sigma_min, bounds.sigma_max);
    Ok(())
}

pub async fn list(config: &CliConfig) -> Result<()> {
    let session = Session::open(config)?;
    let directory = MarketDirectory::new(session.sim.clone());

    println!("{}", "=== Deployed Markets ===".bright_green().bold());
    match directory.refresh().await {
        RemoteRead::Ready(markets) if markets.is_empty() => println!("{}", "No markets deployed".dimmed()),
        RemoteRead::Ready(markets) => {
            let state = session.sim.state();
            for address in markets {
                let description = state
                    .markets
                    .iter()
                    .find(|m| m.address == address)
                    .map(|m| m.description.as_str())
                    .unwrap_or("");
                println!("  {} {}", address.to_string().bright_yellow(), description);
            }
        }
        RemoteRead::Failed(reason) => println!("{} {}", "Market list unavailable:".red(), reason),
        RemoteRead::Pending => {}
    }
    Ok(())
}

/// Parse `2026-12-31T16:00:00Z`, `2026-12-31 16:00` or raw unix seconds
pub fn parse_expiry(text: &str) -> Result<u64> {
    if let Ok(seconds) = text.parse::<u64>() {
        return Ok(seconds);
    }
    let timestamp = match chrono::DateTime::parse_from_rfc3339(text) {
        Ok(dt) => dt.timestamp(),
        Err(_) => {
            let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M")
                .with_context(|| format!("Invalid expiry: {}", text))?;
            Utc.from_utc_datetime(&naive).timestamp()
        }
    };
    u64::try_from(timestamp).with_context(|| format!("Expiry before 1970: {}", text))
}

pub async fn create(config: &CliConfig, params: MarketParams) -> Result<()> {
    let session = Session::open(config)?;
    let directory = MarketDirectory::new(session.sim.clone());

    println!("{}", "=== Create Market ===".bright_green().bold());
    println!("{} {}", "Description:".bright_cyan(), params.description);
    println!("{} N({}, {})", "Initial:".bright_cyan(), params.initial_mean, params.initial_sigma);

    let hash = directory.create_market(&params).await?;
    session.save()?;

    println!("{} {}", "Transaction confirmed:".bright_green(), format_hash(&hash, &config.explorer_url));
    if let RemoteRead::Ready(markets) = directory.markets() {
        if let Some(address) = markets.last() {
            println!("{} {}", "Market:".bright_cyan(), address);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expiry_formats() {
        assert_eq!(parse_expiry("1900000000").unwrap(), 1_900_000_000);
        assert_eq!(parse_expiry("1970-01-01T00:01:00Z").unwrap(), 60);
        assert_eq!(parse_expiry("1970-01-02 00:00").unwrap(), 86_400);
        assert!(parse_expiry("tomorrow").is_err());
    }
}
