//! Liquidity provider operations and collateral approval

use anyhow::Result;
use colored::Colorize;
use distmarket_coordinator::RemoteRead;
use distribution_model::{Address, CollateralAsset};

use crate::client::{format_amount, format_hash, parse_amount, Session};
use crate::config::CliConfig;

pub async fn show(config: &CliConfig, market: Option<Address>) -> Result<()> {
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Liquidity Position ===".bright_green().bold());
    println!("{} {}", "User:".bright_cyan(), coordinator.user_address());

    match coordinator.liquidity() {
        RemoteRead::Ready(position) => {
            println!("{} {}", "Your shares:".bright_cyan(), format_amount(&position.user_shares));
            println!("{} {}", "Total shares:".bright_cyan(), format_amount(&position.total_shares));
            println!("{} {}", "Total collateral:".bright_cyan(), format_amount(&position.total_collateral));
            println!("{} {:.4}%", "Pool share:".bright_cyan(), position.pool_share_percent());
            println!("{} {}", "Share value:".bright_cyan(), format_amount(&position.share_value()));
        }
        RemoteRead::Failed(reason) => println!("{} {}", "Liquidity read failed:".red(), reason),
        RemoteRead::Pending => println!("{}", "Liquidity not loaded".dimmed()),
    }

    if let Some(CollateralAsset::Token(_)) = coordinator.collateral_asset() {
        match coordinator.allowance() {
            Some(RemoteRead::Ready(allowance)) => {
                println!("{} {}", "Allowance:".bright_cyan(), format_amount(&allowance))
            }
            _ => println!("{}", "Allowance unknown".dimmed()),
        }
    }
    Ok(())
}

pub async fn add(config: &CliConfig, market: Option<Address>, amount: String) -> Result<()> {
    let amount = parse_amount(&amount)?;
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Add Liquidity ===".bright_green().bold());
    println!("{} {}", "Amount:".bright_cyan(), format_amount(&amount));

    let result = coordinator.add_liquidity(amount).await;
    session.save()?;
    let hash = result?;

    println!("{} {}", "Transaction confirmed:".bright_green(), format_hash(&hash, &config.explorer_url));
    if let RemoteRead::Ready(position) = coordinator.liquidity() {
        println!("{} {}", "Your shares:".bright_cyan(), format_amount(&position.user_shares));
    }
    Ok(())
}

pub async fn remove(config: &CliConfig, market: Option<Address>, shares: String) -> Result<()> {
    let shares = parse_amount(&shares)?;
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Remove Liquidity ===".bright_green().bold());
    println!("{} {}", "Shares:".bright_cyan(), format_amount(&shares));
    if let RemoteRead::Ready(position) = coordinator.liquidity() {
        println!("{} {}", "Expected payout:".bright_cyan(), format_amount(&position.redeem_value(&shares)));
    }

    let result = coordinator.remove_liquidity(shares).await;
    session.save()?;
    let hash = result?;

    println!("{} {}", "Transaction confirmed:".bright_green(), format_hash(&hash, &config.explorer_url));
    Ok(())
}

pub async fn approve(config: &CliConfig, market: Option<Address>, amount: String) -> Result<()> {
    let amount = parse_amount(&amount)?;
    let session = Session::open(config)?;
    let coordinator = session.coordinator(config, market).await?;

    println!("{}", "=== Approve Collateral ===".bright_green().bold());
    println!("{} {}", "Amount:".bright_cyan(), format_amount(&amount));

    let result = coordinator.approve(amount).await;
    session.save()?;
    let hash = result?;

    println!("{} {}", "Transaction confirmed:".bright_green(), format_hash(&hash, &config.explorer_url));
    Ok(())
}
