//! Liquidity pool accounting and position legs

use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::fixed::Fixed18;
use crate::types::Amount;

/// Raw pool balances for one liquidity provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPosition {
    #[serde(with = "decimal")]
    pub user_shares: Amount,
    #[serde(with = "decimal")]
    pub total_shares: Amount,
    #[serde(with = "decimal")]
    pub total_collateral: Amount,
}

impl LiquidityPosition {
    pub fn new(user_shares: Amount, total_shares: Amount, total_collateral: Amount) -> Self {
        Self { user_shares, total_shares, total_collateral }
    }

    /// userShares / totalShares * 100, or 0 for an empty pool
    pub fn pool_share_percent(&self) -> f64 {
        if self.total_shares.is_zero() {
            return 0.0;
        }
        let user = self.user_shares.to_f64().unwrap_or(0.0);
        let total = self.total_shares.to_f64().unwrap_or(0.0);
        let percent = user / total * 100.0;
        if percent.is_finite() {
            percent
        } else {
            0.0
        }
    }

    /// floor(userShares * totalCollateral / totalShares), or 0 for an empty pool
    pub fn share_value(&self) -> Amount {
        if self.total_shares.is_zero() {
            return Amount::zero();
        }
        &self.user_shares * &self.total_collateral / &self.total_shares
    }

    /// Collateral paid out for burning `shares` at the current ratio
    pub fn redeem_value(&self, shares: &Amount) -> Amount {
        if self.total_shares.is_zero() {
            return Amount::zero();
        }
        shares * &self.total_collateral / &self.total_shares
    }
}

/// One historical proposal transition of a user's position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLeg {
    pub index: u64,
    pub old_mean: Fixed18,
    pub old_sigma: Fixed18,
    pub new_mean: Fixed18,
    pub new_sigma: Fixed18,
    pub is_open: bool,
}

impl PositionLeg {
    /// `(old_mean, old_sigma) -> (new_mean, new_sigma)` as display floats
    pub fn transition(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.old_mean.to_f64(), self.old_sigma.to_f64()),
            (self.new_mean.to_f64(), self.new_sigma.to_f64()),
        )
    }
}

/// Settlement quote for closing a single leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseQuote {
    #[serde(with = "decimal")]
    pub collateral: Amount,
    pub arg_min_x: Fixed18,
    pub expected_refund: Fixed18,
}

/// Serde helper: big unsigned integers as decimal strings
pub mod decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::Amount;

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
