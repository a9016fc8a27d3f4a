//! Position legs: listing, close quotes and closing

use anyhow::Result;
use colored::Colorize;
use distmarket_coordinator::RemoteRead;
use distribution_model::Address;

use crate::client::{format_amount, format_hash, Session};
use crate::config::CliConfig;

pub async fn list(config: &CliConfig, market: Option<Address>) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Position Legs ===".bright_green().bold());
    match coordinator.legs() {
        RemoteRead::Ready(legs) if legs.is_empty() => println!("{}", "No positions found".dimmed()),
        RemoteRead::Ready(legs) => {
            for leg in legs {
                let ((old_mu, old_sigma), (new_mu, new_sigma)) = leg.transition();
                let status = if leg.is_open { "open".bright_green() } else { "closed".dimmed() };
                println!(
                    "  #{:<3} N({}, {}) -> N({}, {})  {}",
                    leg.index, old_mu, old_sigma, new_mu, new_sigma, status
                );
            }
        }
        RemoteRead::Failed(reason) => println!("{} {}", "Legs unavailable:".red(), reason),
        RemoteRead::Pending => {}
    }
    Ok(())
}

pub async fn quote(config: &CliConfig, market: Option<Address>, index: u64) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Close Quote ===".bright_green().bold());
    println!("{} {}", "Leg:".bright_cyan(), index);
    match coordinator.quote_close(index).await? {
        Some(quote) => {
            println!("{} {}", "Collateral:".bright_cyan(), format_amount(&quote.collateral));
            println!("{} {}", "argmin x:".bright_cyan(), quote.arg_min_x);
            println!("{} {}", "Expected refund:".bright_cyan(), quote.expected_refund);
        }
        None => println!("{}", "Quote superseded".dimmed()),
    }
    Ok(())
}

pub async fn close(config: &CliConfig, market: Option<Address>, index: u64) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Close Position ===".bright_green().bold());
    println!("{} {}", "Leg:".bright_cyan(), index);
    coordinator.quote_close(index).await?;

    let result = coordinator.submit_close(index).await;
    session.save()?;
    let outcome = result?;

    if let Some(divergence) = &outcome.divergence {
        println!("{} {} bps", "Close quote moved before submission:".yellow(), divergence.bps);
    }
    println!("{} {}", "Collateral:".bright_cyan(), format_amount(&outcome.quote.collateral));
    println!("{} {}", "Refund:".bright_cyan(), outcome.quote.expected_refund);
    println!("{} {}", "Transaction confirmed:".bright_green(), format_hash(&outcome.hash, &config.explorer_url));
    Ok(())
}
