//! Distribution Model - pure math behind the distribution market coordinator
//!
//! This crate holds everything the coordinator computes locally:
//! - SD59x18 fixed-point conversion (`fixed`)
//! - Normal density curves for the consensus/proposal chart (`curve`)
//! - Liquidity pool share arithmetic and position legs (`ledger`)
//! - Proposal slider bounds (`bounds`)
//! - Ether-style decimal amount parsing/formatting (`units`)
//!
//! Nothing here touches the network; the AMM pricing function itself lives
//! on-chain and is only ever seen through the coordinator's backend trait.

pub mod bounds;
pub mod curve;
pub mod fixed;
pub mod ledger;
pub mod types;
pub mod units;

pub use bounds::ProposalBounds;
pub use curve::{generate_curve, pdf, Curve, CurvePoint};
pub use fixed::{from_fixed, to_fixed, Fixed18};
pub use ledger::{CloseQuote, LiquidityPosition, PositionLeg};
pub use types::{decode_hex, Address, Amount, CollateralAsset, MarketConsensus, ProposedState, Quote, TxHash};
pub use units::{ether, format_ether, format_units, parse_ether, parse_units};

/// Fractional decimals of the on-chain fixed-point format (SD59x18)
pub const DECIMALS: u32 = 18;

/// Fractional decimals kept when converting fixed-point back to floats
pub const DISPLAY_DECIMALS: u32 = 6;

/// Default number of curve intervals drawn by the chart
pub const DEFAULT_CURVE_STEPS: usize = 100;

/// Error types for model conversions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// NaN or infinite input where a finite number is required
    NonFinite,
    /// Malformed hex address (expects 0x + 40 hex digits)
    InvalidAddress(String),
    /// Malformed transaction hash (expects 0x + 64 hex digits)
    InvalidHash(String),
    /// Malformed decimal amount string
    InvalidAmount(String),
}

impl core::fmt::Display for ModelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ModelError::NonFinite => write!(f, "value is not a finite number"),
            ModelError::InvalidAddress(s) => write!(f, "invalid address: {}", s),
            ModelError::InvalidHash(s) => write!(f, "invalid transaction hash: {}", s),
            ModelError::InvalidAmount(s) => write!(f, "invalid amount: {}", s),
        }
    }
}

impl std::error::Error for ModelError {}
