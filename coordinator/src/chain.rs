//! Remote market boundary
//!
//! The AMM contract, wallet and node are external collaborators. The
//! coordinator only sees their call signatures; every call is a suspension
//! point and may resolve in any order relative to when it was issued.

use distribution_model::{Address, Amount, CloseQuote, Fixed18, PositionLeg, TxHash};
use futures::future::BoxFuture;

use crate::error::ChainError;

/// Raw market read (`mean`, `standardDeviation`, `description`, `collateralToken`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub mean: Fixed18,
    pub sigma: Fixed18,
    pub description: String,
    pub collateral_token: Address,
}

/// Result of `quoteCollateral(mu, sigma)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuote {
    pub collateral: Amount,
    pub arg_min_x: Fixed18,
}

/// Raw liquidity read for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquiditySnapshot {
    pub user_shares: Amount,
    pub total_shares: Amount,
    pub total_collateral: Amount,
    /// Token allowance granted to the market; `None` for native collateral
    pub allowance: Option<Amount>,
}

/// Arguments of the `trade` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    pub mu: Fixed18,
    pub sigma: Fixed18,
    pub arg_min_x: Fixed18,
    /// Call value; only populated for native collateral
    pub value: Option<Amount>,
}

/// Arguments of the `closePosition` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub leg_index: u64,
    pub arg_min_x: Fixed18,
    pub value: Option<Amount>,
}

/// Final status of an included transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Contract-shaped view of one distribution market plus the connected signer
///
/// Writes are sent from the signer's account and return as soon as the
/// transaction hash is known; inclusion is observed via `wait_for_receipt`,
/// which may never resolve.
pub trait MarketBackend: Send + Sync {
    fn read_market(&self, market: Address) -> BoxFuture<'_, Result<MarketSnapshot, ChainError>>;

    fn quote_collateral(
        &self,
        market: Address,
        mu: Fixed18,
        sigma: Fixed18,
    ) -> BoxFuture<'_, Result<RawQuote, ChainError>>;

    fn submit_trade(&self, market: Address, request: TradeRequest) -> BoxFuture<'_, Result<TxHash, ChainError>>;

    fn read_liquidity(&self, market: Address, user: Address) -> BoxFuture<'_, Result<LiquiditySnapshot, ChainError>>;

    fn submit_add_liquidity(
        &self,
        market: Address,
        amount: Amount,
        value: Option<Amount>,
    ) -> BoxFuture<'_, Result<TxHash, ChainError>>;

    fn submit_remove_liquidity(&self, market: Address, shares: Amount) -> BoxFuture<'_, Result<TxHash, ChainError>>;

    /// ERC20 `approve(spender, amount)` on the collateral token
    fn approve(&self, token: Address, spender: Address, amount: Amount) -> BoxFuture<'_, Result<TxHash, ChainError>>;

    fn submit_close_position(&self, market: Address, request: CloseRequest) -> BoxFuture<'_, Result<TxHash, ChainError>>;

    fn wait_for_receipt(&self, hash: TxHash) -> BoxFuture<'_, Result<ReceiptStatus, ChainError>>;

    fn position_leg_count(&self, market: Address, user: Address) -> BoxFuture<'_, Result<u64, ChainError>>;

    fn position_leg(&self, market: Address, user: Address, index: u64) -> BoxFuture<'_, Result<PositionLeg, ChainError>>;

    fn quote_close_position(&self, market: Address, leg_index: u64) -> BoxFuture<'_, Result<CloseQuote, ChainError>>;
}
