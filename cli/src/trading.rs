//! Quoting and trading a proposed distribution

use anyhow::Result;
use colored::Colorize;
use distmarket_coordinator::{MarketCoordinator, QuotePhase};
use distribution_model::{Address, ProposedState};

use crate::client::{format_amount, format_hash, Session};
use crate::config::CliConfig;

/// Draft `N(mu, sigma)` and wait for its debounced quote
fn draft(coordinator: &MarketCoordinator, mu: f64, sigma: f64) -> Result<()> {
    let proposal = ProposedState::new(mu, sigma);
    if let Some(bounds) = coordinator.bounds() {
        if !bounds.contains(&proposal) {
            println!(
                "{} mu in [{}, {}], sigma in [{}, {}]",
                "Warning: proposal outside suggested bounds:".yellow(),
                bounds.mu_min,
                bounds.mu_max,
                bounds.sigma_min,
                bounds.sigma_max
            );
        }
    }
    coordinator.set_proposed(proposal)?;
    Ok(())
}

pub async fn quote(config: &CliConfig, market: Option<Address>, mu: f64, sigma: f64) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;
    draft(&coordinator, mu, sigma)?;

    let status = coordinator.settled_quote().await?;

    println!("{}", "=== Quote ===".bright_green().bold());
    println!("{} N({}, {})", "Proposal:".bright_cyan(), mu, sigma);
    match status.phase {
        QuotePhase::Resolved => {
            if let Some((collateral, arg_min_x)) = status.quote.pair() {
                println!("{} {}", "Collateral:".bright_cyan(), format_amount(collateral));
                println!("{} {}", "argmin x:".bright_cyan(), arg_min_x);
            }
            if let Some(required) = coordinator.required_approval() {
                println!("{} {}", "Approval needed:".yellow(), format_amount(&required));
            }
        }
        QuotePhase::Idle => println!("{}", "Proposal equals consensus; nothing to quote".dimmed()),
        _ => {
            let reason = status.last_error.unwrap_or_else(|| format!("{:?}", status.phase));
            println!("{} {}", "Quote unavailable:".red(), reason);
        }
    }
    Ok(())
}

pub async fn trade(config: &CliConfig, market: Option<Address>, mu: f64, sigma: f64) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;
    draft(&coordinator, mu, sigma)?;
    coordinator.settled_quote().await?;

    println!("{}", "=== Trade ===".bright_green().bold());
    println!("{} N({}, {})", "Proposal:".bright_cyan(), mu, sigma);
    println!("{}", "Sending transaction...".dimmed());

    let result = coordinator.submit_trade().await;
    // reverted transactions still consume a nonce
    session.save()?;
    let outcome = result?;

    if let Some(divergence) = &outcome.divergence {
        println!(
            "{} {} -> {} ({} bps)",
            "Quote moved before submission:".yellow(),
            format_amount(&divergence.cached),
            format_amount(&divergence.fresh),
            divergence.bps
        );
    }
    println!("{} {}", "Collateral:".bright_cyan(), format_amount(&outcome.collateral));
    println!("{} {}", "argmin x:".bright_cyan(), outcome.arg_min_x);
    println!(
        "{} {} at {}",
        "Transaction confirmed:".bright_green(),
        format_hash(&outcome.hash, &config.explorer_url),
        chrono::Local::now().format("%H:%M:%S")
    );

    if let Some(consensus) = coordinator.consensus().ready() {
        println!("{} N({}, {})", "New consensus:".bright_cyan(), consensus.mean, consensus.sigma);
    }
    Ok(())
}
