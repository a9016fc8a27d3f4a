//! Distribution market coordinator
//!
//! Client-side coordination for a continuous distribution market: the
//! user drafts a normal distribution, gets a debounced collateral quote,
//! submits trades and liquidity actions, and watches each transaction
//! through its own lifecycle tracker.
//!
//! The chain is reached only through the [`MarketBackend`] and
//! [`MarketFactory`] traits; [`SimulatedMarket`] implements both in memory.

pub mod chain;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod factory;
pub mod ledger;
pub mod quote;
pub mod read;
pub mod sim;
pub mod tracker;

pub use chain::{
    CloseRequest, LiquiditySnapshot, MarketBackend, MarketSnapshot, RawQuote, ReceiptStatus, TradeRequest,
};
pub use config::CoordinatorConfig;
pub use coordinator::{CloseOutcome, MarketCoordinator, QuoteDivergence, TradeOutcome};
pub use error::{ChainError, CoordinatorError, ErrorKind, Result};
pub use factory::{explorer_tx_url, parse_feed_id, EncodedMarketParams, MarketDirectory, MarketFactory, MarketParams};
pub use ledger::{AllowanceGate, PositionBook};
pub use quote::{divergence_bps, QuoteEngine, QuotePhase, QuoteStatus};
pub use read::RemoteRead;
pub use sim::{SimCall, SimMarketParams, SimMethod, SimState, SimulatedMarket};
pub use tracker::{Trackers, TransactionAttempt, TxAction, TxPhase, TxTracker};

