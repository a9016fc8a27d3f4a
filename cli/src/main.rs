//! Distmarket CLI - drive a distribution market coordinator from the shell
//!
//! Runs every command against a simulated market persisted in a JSON state
//! file, so quoting, trading, liquidity and position flows can be exercised
//! end to end without a node.

use clap::{Parser, Subcommand};
use colored::Colorize;
use distmarket_coordinator::MarketParams;
use distribution_model::Address;
use std::path::PathBuf;

mod client;
mod config;
mod fixed;
mod legs;
mod liquidity;
mod market;
mod trading;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "distmarket")]
#[command(about = "Distribution market CLI - quote, trade and provide liquidity", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated chain state file (overrides the config)
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Market address (defaults to the first deployed market)
    #[arg(short, long)]
    market: Option<Address>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the state file with one market from the config
    Init {
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },

    /// Market inspection and creation
    Market {
        #[command(subcommand)]
        command: MarketCommands,
    },

    /// Quote the collateral for a proposed distribution
    Quote {
        /// Proposed mean
        #[arg(long, allow_hyphen_values = true)]
        mu: f64,

        /// Proposed standard deviation
        #[arg(long)]
        sigma: f64,
    },

    /// Trade the market to a proposed distribution
    Trade {
        /// Proposed mean
        #[arg(long, allow_hyphen_values = true)]
        mu: f64,

        /// Proposed standard deviation
        #[arg(long)]
        sigma: f64,
    },

    /// Liquidity operations
    Liquidity {
        #[command(subcommand)]
        command: LiquidityCommands,
    },

    /// Approve the market to spend collateral tokens
    Approve {
        /// Amount in whole units (e.g. 1.5)
        amount: String,
    },

    /// Position leg operations
    Legs {
        #[command(subcommand)]
        command: LegCommands,
    },

    /// SD59x18 fixed-point conversion
    Fixed {
        #[command(subcommand)]
        command: FixedCommands,
    },
}

#[derive(Subcommand)]
enum MarketCommands {
    /// Show consensus, collateral and pool totals
    Show,

    /// Print consensus and proposal densities
    Curve {
        /// Number of intervals
        #[arg(long)]
        steps: Option<usize>,

        /// Proposed mean (defaults to the consensus)
        #[arg(long, allow_hyphen_values = true)]
        mu: Option<f64>,

        /// Proposed sigma (defaults to the consensus)
        #[arg(long)]
        sigma: Option<f64>,
    },

    /// Show the suggested proposal ranges
    Bounds,

    /// List deployed markets
    List,

    /// Deploy a new market through the factory
    Create {
        /// Initial mean
        #[arg(long, allow_hyphen_values = true)]
        mean: f64,

        /// Initial sigma
        #[arg(long)]
        sigma: f64,

        /// L2 norm of every position
        #[arg(long, default_value = "1")]
        k: f64,

        /// Backing constant
        #[arg(long)]
        b: f64,

        /// Oracle price feed id (32 bytes hex)
        #[arg(long)]
        price_feed_id: String,

        /// Expiry (RFC 3339, "YYYY-MM-DD HH:MM" UTC, or unix seconds)
        #[arg(long)]
        expiry: String,

        /// Collateral token (omit for native)
        #[arg(long)]
        collateral: Option<Address>,

        /// Market description
        #[arg(long)]
        description: String,

        /// LP token name
        #[arg(long)]
        lp_name: String,

        /// LP token symbol
        #[arg(long)]
        lp_symbol: String,

        /// Restrict trading to a whitelist
        #[arg(long)]
        private: bool,

        /// Whitelisted addresses (private markets only)
        #[arg(long, value_delimiter = ',')]
        whitelist: Vec<Address>,
    },
}

#[derive(Subcommand)]
enum LiquidityCommands {
    /// Show shares, pool totals and allowance
    Show,

    /// Deposit collateral for pool shares
    Add {
        /// Amount in whole units (e.g. 1.5)
        amount: String,
    },

    /// Burn pool shares for collateral
    Remove {
        /// Shares in whole units
        shares: String,
    },
}

#[derive(Subcommand)]
enum LegCommands {
    /// List every leg of the signer's position
    List,

    /// Quote closing a leg
    Quote {
        /// Leg index
        index: u64,
    },

    /// Close a leg
    Close {
        /// Leg index
        index: u64,
    },
}

#[derive(Subcommand)]
enum FixedCommands {
    /// Encode a float as SD59x18
    To {
        #[arg(allow_hyphen_values = true)]
        value: f64,
    },

    /// Decode an SD59x18 integer
    From {
        #[arg(allow_hyphen_values = true)]
        raw: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = CliConfig::new(cli.config.as_deref(), cli.state.clone())?;

    if cli.verbose {
        println!("{} {}", "State file:".bright_cyan(), config.state_file.display());
        println!("{} {}", "Signer:".bright_cyan(), config.signer);
        println!("{} {}ms", "Debounce:".bright_cyan(), config.coordinator.debounce_ms);
    }

    let selected = cli.market;
    match cli.command {
        Commands::Init { force } => {
            market::init(&config, force).await?;
        }
        Commands::Market { command } => match command {
            MarketCommands::Show => market::show(&config, selected).await?,
            MarketCommands::Curve { steps, mu, sigma } => market::curve(&config, selected, steps, mu, sigma).await?,
            MarketCommands::Bounds => market::bounds(&config, selected).await?,
            MarketCommands::List => market::list(&config).await?,
            MarketCommands::Create {
                mean,
                sigma,
                k,
                b,
                price_feed_id,
                expiry,
                collateral,
                description,
                lp_name,
                lp_symbol,
                private,
                whitelist,
            } => {
                let params = MarketParams {
                    initial_mean: mean,
                    initial_sigma: sigma,
                    k,
                    b,
                    price_feed_id,
                    expiry: market::parse_expiry(&expiry)?,
                    collateral: collateral.unwrap_or(Address::ZERO),
                    description,
                    lp_name,
                    lp_symbol,
                    private,
                    whitelist,
                };
                market::create(&config, params).await?;
            }
        },
        Commands::Quote { mu, sigma } => {
            trading::quote(&config, selected, mu, sigma).await?;
        }
        Commands::Trade { mu, sigma } => {
            trading::trade(&config, selected, mu, sigma).await?;
        }
        Commands::Liquidity { command } => match command {
            LiquidityCommands::Show => liquidity::show(&config, selected).await?,
            LiquidityCommands::Add { amount } => liquidity::add(&config, selected, amount).await?,
            LiquidityCommands::Remove { shares } => liquidity::remove(&config, selected, shares).await?,
        },
        Commands::Approve { amount } => {
            liquidity::approve(&config, selected, amount).await?;
        }
        Commands::Legs { command } => match command {
            LegCommands::List => legs::list(&config, selected).await?,
            LegCommands::Quote { index } => legs::quote(&config, selected, index).await?,
            LegCommands::Close { index } => legs::close(&config, selected, index).await?,
        },
        Commands::Fixed { command } => match command {
            FixedCommands::To { value } => fixed::to(value)?,
            FixedCommands::From { raw } => fixed::from(&raw)?,
        },
    }

    Ok(())
}
