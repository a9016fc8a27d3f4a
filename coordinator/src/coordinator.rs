//! Per-market coordinator handle
//!
//! Owns the proposal draft, the quote engine, the ledger views and one
//! transaction tracker per action. Every method takes `&self`, so an
//! approval and a trade can be driven concurrently from one handle.
//! Locks are never held across a network call.

use std::sync::Arc;

use distribution_model::{
    from_fixed, generate_curve, to_fixed, Address, Amount, CloseQuote, CollateralAsset, Curve, Fixed18,
    LiquidityPosition, MarketConsensus, PositionLeg, ProposalBounds, ProposedState, TxHash,
};
use futures::future::try_join_all;
use log::{info, warn};
use num_traits::Zero;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::chain::{CloseRequest, MarketBackend, TradeRequest};
use crate::config::CoordinatorConfig;
use crate::error::{ChainError, CoordinatorError, Result};
use crate::ledger::{AllowanceGate, PositionBook};
use crate::quote::{divergence_bps, QuoteEngine, QuoteStatus};
use crate::read::RemoteRead;
use crate::tracker::{Trackers, TxAction, TxTracker};

/// Cached vs. fresh quote mismatch seen at submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteDivergence {
    pub cached: Amount,
    pub fresh: Amount,
    pub bps: u64,
}

/// A confirmed trade and the values it was sent with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    pub hash: TxHash,
    pub collateral: Amount,
    pub arg_min_x: Fixed18,
    pub divergence: Option<QuoteDivergence>,
}

/// A confirmed leg close and the quote it was sent with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub hash: TxHash,
    pub leg_index: u64,
    pub quote: CloseQuote,
    pub divergence: Option<QuoteDivergence>,
}

#[derive(Default)]
struct MarketView {
    consensus: RemoteRead<MarketConsensus>,
    market_error: Option<String>,
    gate: Option<AllowanceGate>,
    allowance: RemoteRead<Amount>,
    proposed: Option<ProposedState>,
    liquidity: RemoteRead<LiquidityPosition>,
    positions: PositionBook,
}

/// Coordinator for one market and one connected user
pub struct MarketCoordinator {
    backend: Arc<dyn MarketBackend>,
    market: Address,
    user: Address,
    config: CoordinatorConfig,
    view: Mutex<MarketView>,
    quotes: QuoteEngine,
    trackers: Trackers,
}

impl MarketCoordinator {
    /// Build a coordinator with every read still `Pending`
    pub fn new(backend: Arc<dyn MarketBackend>, market: Address, user: Address, config: CoordinatorConfig) -> Self {
        let quotes = QuoteEngine::new(backend.clone(), market, config.debounce());
        Self {
            backend,
            market,
            user,
            config,
            view: Mutex::new(MarketView::default()),
            quotes,
            trackers: Trackers::new(),
        }
    }

    /// Build and perform the initial reads (market, liquidity, legs)
    pub async fn mount(
        backend: Arc<dyn MarketBackend>,
        market: Address,
        user: Address,
        config: CoordinatorConfig,
    ) -> Self {
        let coordinator = Self::new(backend, market, user, config);
        coordinator.refresh_all().await;
        coordinator
    }

    pub fn market_address(&self) -> Address {
        self.market
    }

    pub fn user_address(&self) -> Address {
        self.user
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn refresh_all(&self) {
        self.refresh_market().await;
        self.refresh_liquidity().await;
        self.refresh_legs().await;
    }

    /// Re-read the consensus and collateral asset
    ///
    /// The first successful read seeds the proposal draft. A failed read
    /// keeps the last good consensus and records the error beside it.
    ///
    /// # Returns
    /// The outcome of this read, not the retained view
    pub async fn refresh_market(&self) -> RemoteRead<MarketConsensus> {
        let read = self.backend.read_market(self.market).await;

        let mut view = self.view.lock();
        match read {
            Ok(snapshot) => {
                let consensus = MarketConsensus {
                    mean: from_fixed(&snapshot.mean),
                    sigma: from_fixed(&snapshot.sigma),
                    description: snapshot.description,
                };
                let asset = CollateralAsset::from_token_address(snapshot.collateral_token);
                let current = view.gate.as_ref().map(|g| g.asset());
                match current {
                    Some(current) if current == asset => {}
                    Some(_) => view.gate = Some(AllowanceGate::new(asset)),
                    None => {
                        // liquidity may have been read before the asset was known
                        let mut gate = AllowanceGate::new(asset);
                        if !view.allowance.is_pending() {
                            gate.update(view.allowance.clone());
                        }
                        view.gate = Some(gate);
                    }
                }
                if view.proposed.is_none() {
                    view.proposed = Some(ProposedState::from_consensus(&consensus));
                }
                view.consensus = RemoteRead::Ready(consensus.clone());
                view.market_error = None;
                RemoteRead::Ready(consensus)
            }
            Err(err) => {
                warn!("market {} read failed: {}", self.market, err);
                if !view.consensus.is_ready() {
                    view.consensus = RemoteRead::Failed(err.to_string());
                }
                view.market_error = Some(err.to_string());
                RemoteRead::Failed(err.to_string())
            }
        }
    }

    /// Re-read shares, pool totals and (for tokens) the allowance
    pub async fn refresh_liquidity(&self) -> RemoteRead<LiquidityPosition> {
        let read = self.backend.read_liquidity(self.market, self.user).await;

        let mut view = self.view.lock();
        match read {
            Ok(snapshot) => {
                if let Some(allowance) = snapshot.allowance {
                    view.allowance = RemoteRead::Ready(allowance.clone());
                    if let Some(gate) = view.gate.as_mut() {
                        gate.update(RemoteRead::Ready(allowance));
                    }
                }
                view.liquidity = RemoteRead::Ready(LiquidityPosition::new(
                    snapshot.user_shares,
                    snapshot.total_shares,
                    snapshot.total_collateral,
                ));
            }
            Err(err) => {
                warn!("liquidity read for {} failed: {}", self.user, err);
                view.allowance = RemoteRead::Failed(err.to_string());
                if let Some(gate) = view.gate.as_mut() {
                    gate.update(RemoteRead::Failed(err.to_string()));
                }
                view.liquidity = RemoteRead::Failed(err.to_string());
            }
        }
        view.liquidity.clone()
    }

    /// Re-fetch the full leg sequence (count, then every index)
    pub async fn refresh_legs(&self) -> RemoteRead<Vec<PositionLeg>> {
        let read: RemoteRead<Vec<PositionLeg>> = self.fetch_legs().await.into();
        if let RemoteRead::Failed(reason) = &read {
            warn!("position legs for {} unavailable: {}", self.user, reason);
        }
        self.view.lock().positions.replace_legs(read.clone());
        read
    }

    async fn fetch_legs(&self) -> std::result::Result<Vec<PositionLeg>, ChainError> {
        let count = self.backend.position_leg_count(self.market, self.user).await?;
        let fetches = (0..count).map(|index| self.backend.position_leg(self.market, self.user, index));
        try_join_all(fetches).await
    }

    pub fn consensus(&self) -> RemoteRead<MarketConsensus> {
        self.view.lock().consensus.clone()
    }

    /// Error from the latest market read, if it failed
    ///
    /// `consensus()` still serves the previous value while this is set.
    pub fn market_error(&self) -> Option<String> {
        self.view.lock().market_error.clone()
    }

    pub fn collateral_asset(&self) -> Option<CollateralAsset> {
        self.view.lock().gate.as_ref().map(|g| g.asset())
    }

    pub fn liquidity(&self) -> RemoteRead<LiquidityPosition> {
        self.view.lock().liquidity.clone()
    }

    pub fn allowance(&self) -> Option<RemoteRead<Amount>> {
        self.view.lock().gate.as_ref().map(|g| g.allowance().clone())
    }

    /// `allowance >= required`; always true for native collateral
    pub fn allowance_sufficient(&self, required: &Amount) -> bool {
        self.view
            .lock()
            .gate
            .as_ref()
            .map(|g| g.allowance_sufficient(required))
            .unwrap_or(false)
    }

    /// Amount still to approve before the current quote can be traded
    pub fn required_approval(&self) -> Option<Amount> {
        let status = self.quotes.status();
        let collateral = status.quote.collateral()?.clone();
        if self.allowance_sufficient(&collateral) {
            None
        } else {
            Some(collateral)
        }
    }

    pub fn legs(&self) -> RemoteRead<Vec<PositionLeg>> {
        self.view.lock().positions.legs().clone()
    }

    pub fn selected_leg(&self) -> Option<u64> {
        self.view.lock().positions.selected()
    }

    /// `(leg, quote)` for the selected leg, if its close quote has arrived
    pub fn close_quote(&self) -> Option<(u64, CloseQuote)> {
        self.view.lock().positions.close_quote().map(|(index, quote)| (index, quote.clone()))
    }

    // ========================================================================
    // Proposal & quote
    // ========================================================================

    pub fn proposed(&self) -> Option<ProposedState> {
        self.view.lock().proposed
    }

    /// Replace the draft and kick the debounced quote
    pub fn set_proposed(&self, proposal: ProposedState) -> Result<()> {
        if !proposal.is_valid() {
            return Err(CoordinatorError::InvalidInput(format!(
                "proposal needs finite mu and sigma > 0 (got mu={}, sigma={})",
                proposal.mu, proposal.sigma
            )));
        }

        let consensus = {
            let mut view = self.view.lock();
            let consensus = view.consensus.require("market")?.clone();
            view.proposed = Some(proposal);
            consensus
        };
        self.quotes.propose(proposal, &consensus)
    }

    pub fn quote(&self) -> QuoteStatus {
        self.quotes.status()
    }

    pub fn subscribe_quote(&self) -> watch::Receiver<QuoteStatus> {
        self.quotes.subscribe()
    }

    /// Wait for the debounced quote of the current draft to settle
    pub async fn settled_quote(&self) -> Result<QuoteStatus> {
        self.quotes.settled().await
    }

    pub fn bounds(&self) -> Option<ProposalBounds> {
        self.view.lock().consensus.ready().map(ProposalBounds::for_consensus)
    }

    /// Consensus vs. draft chart with the configured step count
    pub fn curve(&self) -> Option<Curve> {
        self.curve_with_steps(self.config.curve_steps)
    }

    pub fn curve_with_steps(&self, steps: usize) -> Option<Curve> {
        let view = self.view.lock();
        let consensus = view.consensus.ready()?;
        let proposed = view.proposed?;
        Some(generate_curve(consensus, &proposed, steps))
    }

    /// Re-issue the quote for the current draft against the current consensus
    fn requote(&self) {
        let (proposal, consensus) = {
            let view = self.view.lock();
            (view.proposed, view.consensus.ready().cloned())
        };
        match (proposal, consensus) {
            (Some(proposal), Some(consensus)) => {
                if let Err(err) = self.quotes.propose(proposal, &consensus) {
                    warn!("requote failed: {}", err);
                }
            }
            _ => self.quotes.invalidate(),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn trackers(&self) -> &Trackers {
        &self.trackers
    }

    pub fn tracker(&self, action: TxAction) -> Option<&TxTracker> {
        self.trackers.get(action)
    }

    /// Submit the current draft as a trade
    ///
    /// Requires a resolved debounced quote for the draft, then re-quotes
    /// and sends the *fresh* `argMinX` / collateral. Native collateral goes
    /// out as the call value; token collateral must already be approved.
    pub async fn submit_trade(&self) -> Result<TradeOutcome> {
        let prepared = match self.prepare_trade().await {
            Ok(prepared) => prepared,
            Err(err) => {
                self.trackers.trade.reject(&err);
                return Err(err);
            }
        };
        let PreparedTrade { request, collateral, divergence } = prepared;
        let arg_min_x = request.arg_min_x.clone();

        info!("submitting trade on {}: collateral={} argminX={}", self.market, collateral, arg_min_x);
        let backend = &self.backend;
        let hash = self
            .trackers
            .trade
            .run(backend.submit_trade(self.market, request), |h| backend.wait_for_receipt(h))
            .await?;

        self.refresh_after(TxAction::Trade).await;
        Ok(TradeOutcome { hash, collateral, arg_min_x, divergence })
    }

    async fn prepare_trade(&self) -> Result<PreparedTrade> {
        self.trackers.trade.ensure_available()?;

        let proposal = {
            let view = self.view.lock();
            let consensus = view.consensus.require("market")?;
            let proposal = view
                .proposed
                .ok_or_else(|| CoordinatorError::QuoteUnavailable("no proposal".into()))?;
            if proposal.matches(consensus) {
                return Err(CoordinatorError::QuoteUnavailable("proposal equals consensus".into()));
            }
            proposal
        };

        let cached = self
            .quotes
            .status()
            .resolved_for(&proposal)
            .map(|(collateral, _)| collateral.clone())
            .ok_or_else(|| CoordinatorError::QuoteUnavailable("quote not resolved for current proposal".into()))?;

        let fresh = self.quotes.fresh_quote(&proposal).await?;
        let (collateral, arg_min_x) = fresh
            .pair()
            .map(|(c, a)| (c.clone(), a.clone()))
            .ok_or_else(|| CoordinatorError::QuoteUnavailable("fresh quote incomplete".into()))?;
        let divergence = self.check_divergence(&cached, &collateral)?;

        let value = self.gate_spend(&collateral)?;
        Ok(PreparedTrade {
            request: TradeRequest {
                mu: to_fixed(proposal.mu)?,
                sigma: to_fixed(proposal.sigma)?,
                arg_min_x,
                value,
            },
            collateral,
            divergence,
        })
    }

    /// Approve the market to pull `amount` of the collateral token
    pub async fn approve(&self, amount: Amount) -> Result<TxHash> {
        let token = match self.prepare_approve() {
            Ok(token) => token,
            Err(err) => {
                self.trackers.approve.reject(&err);
                return Err(err);
            }
        };

        info!("approving {} of {} for {}", amount, token, self.market);
        let backend = &self.backend;
        let hash = self
            .trackers
            .approve
            .run(backend.approve(token, self.market, amount), |h| backend.wait_for_receipt(h))
            .await?;

        self.refresh_after(TxAction::Approve).await;
        Ok(hash)
    }

    fn prepare_approve(&self) -> Result<Address> {
        self.trackers.approve.ensure_available()?;
        match self.collateral_asset() {
            Some(CollateralAsset::Token(token)) => Ok(token),
            Some(CollateralAsset::Native) => {
                Err(CoordinatorError::InvalidInput("native collateral needs no approval".into()))
            }
            None => Err(CoordinatorError::ReadUnavailable("collateral asset not loaded yet".into())),
        }
    }

    /// Deposit `amount` of collateral for pool shares
    pub async fn add_liquidity(&self, amount: Amount) -> Result<TxHash> {
        let value = match self.prepare_add_liquidity(&amount) {
            Ok(value) => value,
            Err(err) => {
                self.trackers.add_liquidity.reject(&err);
                return Err(err);
            }
        };

        info!("adding {} liquidity to {}", amount, self.market);
        let backend = &self.backend;
        let hash = self
            .trackers
            .add_liquidity
            .run(backend.submit_add_liquidity(self.market, amount, value), |h| backend.wait_for_receipt(h))
            .await?;

        self.refresh_after(TxAction::AddLiquidity).await;
        Ok(hash)
    }

    fn prepare_add_liquidity(&self, amount: &Amount) -> Result<Option<Amount>> {
        self.trackers.add_liquidity.ensure_available()?;
        if amount.is_zero() {
            return Err(CoordinatorError::InvalidInput("liquidity amount must be positive".into()));
        }
        self.gate_spend(amount)
    }

    /// Burn `shares` pool shares for their collateral
    pub async fn remove_liquidity(&self, shares: Amount) -> Result<TxHash> {
        if let Err(err) = self.prepare_remove_liquidity(&shares) {
            self.trackers.remove_liquidity.reject(&err);
            return Err(err);
        }

        info!("removing {} shares from {}", shares, self.market);
        let backend = &self.backend;
        let hash = self
            .trackers
            .remove_liquidity
            .run(backend.submit_remove_liquidity(self.market, shares), |h| backend.wait_for_receipt(h))
            .await?;

        self.refresh_after(TxAction::RemoveLiquidity).await;
        Ok(hash)
    }

    fn prepare_remove_liquidity(&self, shares: &Amount) -> Result<()> {
        self.trackers.remove_liquidity.ensure_available()?;
        if shares.is_zero() {
            return Err(CoordinatorError::InvalidInput("shares to burn must be positive".into()));
        }
        if let RemoteRead::Ready(position) = &self.view.lock().liquidity {
            if shares > &position.user_shares {
                return Err(CoordinatorError::InvalidInput(format!(
                    "cannot burn {} shares, only {} held",
                    shares, position.user_shares
                )));
            }
        }
        Ok(())
    }

    /// Select `index` and fetch its close quote
    ///
    /// # Returns
    /// * `Some(quote)` if it is still the selected leg when the quote lands
    /// * `None` if another leg was selected meanwhile (result dropped)
    pub async fn quote_close(&self, index: u64) -> Result<Option<CloseQuote>> {
        let generation = {
            let mut view = self.view.lock();
            if let RemoteRead::Ready(_) = view.positions.legs() {
                if view.positions.leg(index).is_none() {
                    return Err(CoordinatorError::InvalidInput(format!("no position leg {}", index)));
                }
            }
            view.positions.select(index)
        };

        let result = self.backend.quote_close_position(self.market, index).await;

        let mut view = self.view.lock();
        match result {
            Ok(quote) => {
                if view.positions.apply_close_quote(generation, quote.clone()) {
                    Ok(Some(quote))
                } else {
                    Ok(None)
                }
            }
            Err(err) if view.positions.is_current(generation) => {
                warn!("close quote for leg {} failed: {}", index, err);
                Err(CoordinatorError::QuoteUnavailable(err.to_string()))
            }
            Err(_) => Ok(None),
        }
    }

    /// Close leg `index` using a fresh close quote
    pub async fn submit_close(&self, index: u64) -> Result<CloseOutcome> {
        let (request, quote, divergence) = match self.prepare_close(index).await {
            Ok(prepared) => prepared,
            Err(err) => {
                self.trackers.close_position.reject(&err);
                return Err(err);
            }
        };

        info!("closing leg {} on {}", index, self.market);
        let backend = &self.backend;
        let hash = self
            .trackers
            .close_position
            .run(backend.submit_close_position(self.market, request), |h| backend.wait_for_receipt(h))
            .await?;

        self.view.lock().positions.invalidate_close_quote();
        self.refresh_after(TxAction::ClosePosition).await;
        Ok(CloseOutcome { hash, leg_index: index, quote, divergence })
    }

    async fn prepare_close(&self, index: u64) -> Result<(CloseRequest, CloseQuote, Option<QuoteDivergence>)> {
        self.trackers.close_position.ensure_available()?;

        let cached = {
            let view = self.view.lock();
            let legs = view.positions.legs().require("position legs")?;
            let leg = legs
                .iter()
                .find(|leg| leg.index == index)
                .ok_or_else(|| CoordinatorError::InvalidInput(format!("no position leg {}", index)))?;
            if !leg.is_open {
                return Err(CoordinatorError::InvalidInput(format!("leg {} already closed", index)));
            }
            view.positions
                .close_quote_for(index)
                .cloned()
                .ok_or_else(|| CoordinatorError::QuoteUnavailable(format!("no close quote for leg {}", index)))?
        };

        let fresh = self
            .backend
            .quote_close_position(self.market, index)
            .await
            .map_err(|e| CoordinatorError::QuoteUnavailable(e.to_string()))?;
        let divergence = self.check_divergence(&cached.collateral, &fresh.collateral)?;

        let value = self.gate_spend(&fresh.collateral)?;
        let request = CloseRequest { leg_index: index, arg_min_x: fresh.arg_min_x.clone(), value };
        Ok((request, fresh, divergence))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Allowance check for `amount`; returns the call value to attach
    fn gate_spend(&self, amount: &Amount) -> Result<Option<Amount>> {
        let view = self.view.lock();
        let gate = view
            .gate
            .as_ref()
            .ok_or_else(|| CoordinatorError::ReadUnavailable("collateral asset not loaded yet".into()))?;
        gate.ensure(amount)?;
        Ok(gate.asset().is_native().then(|| amount.clone()))
    }

    fn check_divergence(&self, cached: &Amount, fresh: &Amount) -> Result<Option<QuoteDivergence>> {
        let bps = divergence_bps(cached, fresh);
        if bps <= self.config.divergence_warn_bps {
            return Ok(None);
        }

        warn!("quote moved {} bps between quoting and submission ({} -> {})", bps, cached, fresh);
        if self.config.block_on_divergence {
            return Err(CoordinatorError::StaleQuoteAtSubmission {
                cached: cached.clone(),
                fresh: fresh.clone(),
                divergence_bps: bps,
            });
        }
        Ok(Some(QuoteDivergence { cached: cached.clone(), fresh: fresh.clone(), bps }))
    }

    /// Re-read whatever a confirmed `action` may have changed
    async fn refresh_after(&self, action: TxAction) {
        match action {
            TxAction::Trade | TxAction::ClosePosition => {
                self.refresh_all().await;
                self.requote();
            }
            TxAction::AddLiquidity | TxAction::RemoveLiquidity => {
                self.refresh_market().await;
                self.refresh_liquidity().await;
            }
            TxAction::Approve => {
                self.refresh_liquidity().await;
            }
            TxAction::CreateMarket => {}
        }
    }
}

struct PreparedTrade {
    request: TradeRequest,
    collateral: Amount,
    divergence: Option<QuoteDivergence>,
}
