//! Deterministic in-memory distribution market
//!
//! Implements both chain boundaries (`MarketBackend`, `MarketFactory`) over
//! a serde-serialisable `SimState`. Writes are queued at submission and
//! only take effect when their receipt is awaited, like a real chain.
//! Latency, failures, rejections, reverts and receipt holds can be
//! scripted per call; every call is logged with the tokio clock.

use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;
use std::time::Duration;

use distribution_model::ledger::decimal;
use distribution_model::{to_fixed, Address, Amount, CloseQuote, Fixed18, PositionLeg, TxHash};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn};
use num_bigint::BigInt;
use num_traits::Zero;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::chain::{
    CloseRequest, LiquiditySnapshot, MarketBackend, MarketSnapshot, RawQuote, ReceiptStatus, TradeRequest,
};
use crate::error::ChainError;
use crate::factory::{EncodedMarketParams, MarketFactory};

/// Grid resolution for the collateral search
const QUOTE_GRID_STEPS: usize = 2000;

/// Grid half-width in sigmas
const QUOTE_GRID_SIGMAS: f64 = 4.0;

// ============================================================================
// State
// ============================================================================

/// Parameters for seeding one simulated market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimMarketParams {
    pub mean: f64,
    pub sigma: f64,
    pub k: f64,
    pub b: f64,
    pub description: String,
    /// Zero address for native collateral
    pub collateral_token: Address,
}

impl Default for SimMarketParams {
    fn default() -> Self {
        Self {
            mean: 100.0,
            sigma: 10.0,
            k: 1.0,
            b: 50.0,
            description: "Simulated market".into(),
            collateral_token: Address::ZERO,
        }
    }
}

/// One leg as stored by the market, with the collateral it locked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimLeg {
    pub leg: PositionLeg,
    #[serde(with = "decimal")]
    pub posted: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimAccount {
    pub address: Address,
    #[serde(with = "decimal")]
    pub shares: Amount,
    /// Token allowance granted to the market
    #[serde(with = "decimal")]
    pub allowance: Amount,
    pub legs: Vec<SimLeg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMarketState {
    pub address: Address,
    pub mean: Fixed18,
    pub sigma: Fixed18,
    pub k: f64,
    pub b: f64,
    pub description: String,
    pub collateral_token: Address,
    #[serde(with = "decimal")]
    pub total_shares: Amount,
    #[serde(with = "decimal")]
    pub total_collateral: Amount,
    pub accounts: Vec<SimAccount>,
}

impl SimMarketState {
    fn account(&self, user: Address) -> Option<&SimAccount> {
        self.accounts.iter().find(|a| a.address == user)
    }

    fn account_mut(&mut self, user: Address) -> &mut SimAccount {
        match self.accounts.iter().position(|a| a.address == user) {
            Some(i) => &mut self.accounts[i],
            None => {
                self.accounts.push(SimAccount { address: user, ..SimAccount::default() });
                let last = self.accounts.len() - 1;
                &mut self.accounts[last]
            }
        }
    }

    fn is_native(&self) -> bool {
        self.collateral_token.is_zero()
    }

    /// Native collateral must arrive as call value, tokens via allowance
    fn collect(&mut self, payer: Address, amount: &Amount, value: Option<&Amount>) -> Result<(), String> {
        if self.is_native() {
            let sent = value.cloned().unwrap_or_default();
            if &sent < amount {
                return Err(format!("value {} below required {}", sent, amount));
            }
        } else {
            let account = self.account_mut(payer);
            if &account.allowance < amount {
                return Err(format!("allowance {} below required {}", account.allowance, amount));
            }
            account.allowance -= amount;
        }
        Ok(())
    }
}

/// Whole simulated chain: markets, the signing account and a tx nonce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    pub signer: Address,
    pub nonce: u64,
    pub markets: Vec<SimMarketState>,
}

impl SimState {
    pub fn new(signer: Address) -> Self {
        Self { signer, nonce: 0, markets: Vec::new() }
    }

    /// Add a market at a fresh address
    pub fn deploy(&mut self, params: &SimMarketParams) -> Result<Address, ChainError> {
        let mean = to_fixed(params.mean).map_err(|e| ChainError::Reverted(e.to_string()))?;
        let sigma = to_fixed(params.sigma).map_err(|e| ChainError::Reverted(e.to_string()))?;
        if params.sigma <= 0.0 || params.k <= 0.0 || params.b <= 0.0 {
            return Err(ChainError::Reverted("sigma, k and b must be positive".into()));
        }

        let address = market_address(self.markets.len() as u64 + 1);
        self.markets.push(SimMarketState {
            address,
            mean,
            sigma,
            k: params.k,
            b: params.b,
            description: params.description.clone(),
            collateral_token: params.collateral_token,
            total_shares: Amount::zero(),
            total_collateral: Amount::zero(),
            accounts: Vec::new(),
        });
        Ok(address)
    }

    fn market(&self, address: Address) -> Result<&SimMarketState, ChainError> {
        self.markets
            .iter()
            .find(|m| m.address == address)
            .ok_or_else(|| ChainError::NotFound(format!("market {}", address)))
    }

    fn market_mut(&mut self, address: Address) -> Result<&mut SimMarketState, String> {
        self.markets
            .iter_mut()
            .find(|m| m.address == address)
            .ok_or_else(|| format!("no market at {}", address))
    }

    fn next_hash(&mut self) -> TxHash {
        self.nonce += 1;
        let mut bytes = [0u8; 32];
        bytes[0] = 0x5e;
        bytes[24..].copy_from_slice(&self.nonce.to_be_bytes());
        TxHash(bytes)
    }
}

fn market_address(n: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xd1;
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    Address(bytes)
}

// ============================================================================
// Quote math
// ============================================================================

/// Scale factor bringing a normal pdf to L2 norm `k`: k * sqrt(2σ√π)
pub fn l2_lambda(k: f64, sigma: f64) -> f64 {
    k * (2.0 * sigma * PI.sqrt()).sqrt()
}

/// Smallest sigma whose scaled peak stays within the backing `b`
pub fn min_sigma(k: f64, b: f64) -> f64 {
    k * k / (b * b * PI.sqrt())
}

fn scaled_pdf(x: f64, mu: f64, sigma: f64, k: f64) -> f64 {
    l2_lambda(k, sigma) * distribution_model::pdf(x, mu, sigma)
}

/// Worst-case loss of holding `to - from` (both L2-scaled to `k`)
///
/// # Returns
/// * `(collateral, arg_min_x)` with collateral = max(0, -min payoff)
pub fn position_collateral(from: (f64, f64), to: (f64, f64), k: f64) -> (f64, f64) {
    let (from_mu, from_sigma) = from;
    let (to_mu, to_sigma) = to;
    let width = QUOTE_GRID_SIGMAS * from_sigma.max(to_sigma);
    let lo = from_mu.min(to_mu) - width;
    let hi = from_mu.max(to_mu) + width;
    let step = (hi - lo) / QUOTE_GRID_STEPS as f64;

    let mut min_payoff = f64::INFINITY;
    let mut arg_min = from_mu;
    for i in 0..=QUOTE_GRID_STEPS {
        let x = lo + step * i as f64;
        let payoff = scaled_pdf(x, to_mu, to_sigma, k) - scaled_pdf(x, from_mu, from_sigma, k);
        if payoff < min_payoff {
            min_payoff = payoff;
            arg_min = x;
        }
    }
    ((-min_payoff).max(0.0), arg_min)
}

fn amount_from_f64(value: f64) -> Result<Amount, String> {
    let fixed = to_fixed(value).map_err(|e| e.to_string())?;
    Ok(fixed.into_raw().to_biguint().unwrap_or_default())
}

// ============================================================================
// Scripting
// ============================================================================

/// Boundary call kinds, used for scripting and the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimMethod {
    ReadMarket,
    QuoteCollateral,
    SubmitTrade,
    ReadLiquidity,
    AddLiquidity,
    RemoveLiquidity,
    Approve,
    ClosePosition,
    Receipt,
    LegCount,
    Leg,
    QuoteClose,
    DeployedMarkets,
    CreateMarket,
}

impl SimMethod {
    fn is_write(&self) -> bool {
        matches!(
            self,
            SimMethod::SubmitTrade
                | SimMethod::AddLiquidity
                | SimMethod::RemoveLiquidity
                | SimMethod::Approve
                | SimMethod::ClosePosition
                | SimMethod::CreateMarket
        )
    }
}

/// One logged boundary call
#[derive(Debug, Clone)]
pub struct SimCall {
    pub method: SimMethod,
    pub at: Instant,
    pub detail: String,
}

#[derive(Default)]
struct Script {
    latency: HashMap<SimMethod, VecDeque<Duration>>,
    default_latency: HashMap<SimMethod, Duration>,
    failures: HashMap<SimMethod, VecDeque<ChainError>>,
    reject_writes: usize,
    revert_writes: usize,
    fixed_quote: Option<RawQuote>,
}

enum Effect {
    Trade { market: Address, request: TradeRequest },
    AddLiquidity { market: Address, amount: Amount, value: Option<Amount> },
    RemoveLiquidity { market: Address, shares: Amount },
    Approve { token: Address, spender: Address, amount: Amount },
    Close { market: Address, request: CloseRequest },
    CreateMarket { params: EncodedMarketParams },
}

struct PendingTx {
    effect: Effect,
    revert: bool,
}

// ============================================================================
// Simulated market
// ============================================================================

pub struct SimulatedMarket {
    state: Mutex<SimState>,
    script: Mutex<Script>,
    pending: Mutex<HashMap<TxHash, PendingTx>>,
    calls: Mutex<Vec<SimCall>>,
    held: watch::Sender<bool>,
}

impl SimulatedMarket {
    pub fn new(state: SimState) -> Self {
        let (held, _) = watch::channel(false);
        Self {
            state: Mutex::new(state),
            script: Mutex::new(Script::default()),
            pending: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            held,
        }
    }

    /// Fresh chain with one market; returns the market address too
    pub fn with_market(signer: Address, params: &SimMarketParams) -> Result<(Self, Address), ChainError> {
        let mut state = SimState::new(signer);
        let market = state.deploy(params)?;
        Ok((Self::new(state), market))
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.state.lock())
    }

    pub fn state(&self) -> SimState {
        self.state.lock().clone()
    }

    pub fn signer(&self) -> Address {
        self.state.lock().signer
    }

    /// Mutate state directly (test setup)
    pub fn edit<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Delay the next call of `method` by `delay`
    pub fn push_latency(&self, method: SimMethod, delay: Duration) {
        self.script.lock().latency.entry(method).or_default().push_back(delay);
    }

    /// Delay every call of `method` without a queued latency
    pub fn set_latency(&self, method: SimMethod, delay: Duration) {
        self.script.lock().default_latency.insert(method, delay);
    }

    /// Fail the next call of `method` with `err`
    pub fn push_failure(&self, method: SimMethod, err: ChainError) {
        self.script.lock().failures.entry(method).or_default().push_back(err);
    }

    /// The signer declines the next `count` writes
    pub fn reject_next_writes(&self, count: usize) {
        self.script.lock().reject_writes = count;
    }

    /// The next `count` accepted writes revert on inclusion
    pub fn revert_next_writes(&self, count: usize) {
        self.script.lock().revert_writes = count;
    }

    /// While held, receipts never arrive
    pub fn hold_receipts(&self, hold: bool) {
        self.held.send_replace(hold);
    }

    /// Answer every `quoteCollateral` with `quote` instead of computing it
    pub fn set_fixed_quote(&self, quote: Option<RawQuote>) {
        self.script.lock().fixed_quote = quote;
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, method: SimMethod) -> Vec<SimCall> {
        self.calls.lock().iter().filter(|c| c.method == method).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Log the call, apply scripted latency, then any scripted failure
    async fn enter(&self, method: SimMethod, detail: String) -> Result<(), ChainError> {
        self.calls.lock().push(SimCall { method, at: Instant::now(), detail });

        let (delay, failure, reject) = {
            let mut script = self.script.lock();
            let queued = script.latency.get_mut(&method).and_then(VecDeque::pop_front);
            let delay = queued.or_else(|| script.default_latency.get(&method).copied());
            let failure = script.failures.get_mut(&method).and_then(VecDeque::pop_front);
            let reject = method.is_write() && script.reject_writes > 0;
            if reject {
                script.reject_writes -= 1;
            }
            (delay, failure, reject)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            debug!("sim {:?} failing: {}", method, err);
            return Err(err);
        }
        if reject {
            return Err(ChainError::Rejected("user denied transaction signature".into()));
        }
        Ok(())
    }

    fn queue(&self, effect: Effect) -> TxHash {
        let hash = self.state.lock().next_hash();
        let revert = {
            let mut script = self.script.lock();
            let revert = script.revert_writes > 0;
            if revert {
                script.revert_writes -= 1;
            }
            revert
        };
        self.pending.lock().insert(hash, PendingTx { effect, revert });
        hash
    }

    fn compute_quote(&self, market: Address, mu: &Fixed18, sigma: &Fixed18) -> Result<RawQuote, ChainError> {
        if let Some(quote) = self.script.lock().fixed_quote.clone() {
            return Ok(quote);
        }

        let state = self.state.lock();
        let m = state.market(market)?;
        let (mu, sigma) = (mu.to_f64(), sigma.to_f64());
        check_sigma(m, sigma).map_err(ChainError::Reverted)?;

        let (collateral, arg_min_x) = position_collateral((m.mean.to_f64(), m.sigma.to_f64()), (mu, sigma), m.k);
        Ok(RawQuote {
            collateral: amount_from_f64(collateral).map_err(ChainError::Reverted)?,
            arg_min_x: to_fixed(arg_min_x).map_err(|e| ChainError::Reverted(e.to_string()))?,
        })
    }

    fn compute_close_quote(&self, market: Address, leg_index: u64) -> Result<CloseQuote, ChainError> {
        let state = self.state.lock();
        let signer = state.signer;
        let m = state.market(market)?;
        let stored = m
            .account(signer)
            .and_then(|a| a.legs.iter().find(|l| l.leg.index == leg_index))
            .ok_or_else(|| ChainError::NotFound(format!("leg {}", leg_index)))?;
        if !stored.leg.is_open {
            return Err(ChainError::Reverted(format!("leg {} already closed", leg_index)));
        }

        let ((old_mu, old_sigma), (new_mu, new_sigma)) = stored.leg.transition();
        let (collateral, arg_min_x) = position_collateral((new_mu, new_sigma), (old_mu, old_sigma), m.k);
        Ok(CloseQuote {
            collateral: amount_from_f64(collateral).map_err(ChainError::Reverted)?,
            arg_min_x: to_fixed(arg_min_x).map_err(|e| ChainError::Reverted(e.to_string()))?,
            expected_refund: Fixed18::from_raw(BigInt::from(stored.posted.clone())),
        })
    }

    fn apply(&self, effect: Effect) -> Result<(), String> {
        let mut state = self.state.lock();
        let signer = state.signer;

        match effect {
            Effect::Trade { market, request } => {
                let quote = {
                    let m = state.market(market).map_err(|e| e.to_string())?;
                    let (mu, sigma) = (request.mu.to_f64(), request.sigma.to_f64());
                    check_sigma(m, sigma)?;
                    let (collateral, _) = position_collateral((m.mean.to_f64(), m.sigma.to_f64()), (mu, sigma), m.k);
                    amount_from_f64(collateral)?
                };
                let fixed = self.script.lock().fixed_quote.as_ref().map(|q| q.collateral.clone());
                let required = fixed.unwrap_or(quote);

                let m = state.market_mut(market)?;
                m.collect(signer, &required, request.value.as_ref())?;
                let (old_mean, old_sigma) = (m.mean.clone(), m.sigma.clone());
                m.mean = request.mu.clone();
                m.sigma = request.sigma.clone();
                m.total_collateral += &required;

                let account = m.account_mut(signer);
                let index = account.legs.len() as u64;
                account.legs.push(SimLeg {
                    leg: PositionLeg {
                        index,
                        old_mean,
                        old_sigma,
                        new_mean: request.mu,
                        new_sigma: request.sigma,
                        is_open: true,
                    },
                    posted: required,
                });
            }
            Effect::AddLiquidity { market, amount, value } => {
                let m = state.market_mut(market)?;
                m.collect(signer, &amount, value.as_ref())?;
                let minted = if m.total_shares.is_zero() || m.total_collateral.is_zero() {
                    amount.clone()
                } else {
                    &amount * &m.total_shares / &m.total_collateral
                };
                m.total_shares += &minted;
                m.total_collateral += &amount;
                m.account_mut(signer).shares += minted;
            }
            Effect::RemoveLiquidity { market, shares } => {
                let m = state.market_mut(market)?;
                let held = m.account(signer).map(|a| a.shares.clone()).unwrap_or_default();
                if shares > held {
                    return Err(format!("burning {} shares, only {} held", shares, held));
                }
                let payout = &shares * &m.total_collateral / &m.total_shares;
                m.total_shares -= &shares;
                m.total_collateral -= payout;
                m.account_mut(signer).shares -= shares;
            }
            Effect::Approve { token, spender, amount } => {
                let m = state.market_mut(spender)?;
                if m.collateral_token != token || m.is_native() {
                    return Err(format!("{} is not the collateral token of {}", token, spender));
                }
                m.account_mut(signer).allowance = amount;
            }
            Effect::Close { market, request } => {
                drop(state);
                let quote = self.compute_close_quote(market, request.leg_index).map_err(|e| e.to_string())?;
                let mut state = self.state.lock();
                let m = state.market_mut(market)?;
                m.collect(signer, &quote.collateral, request.value.as_ref())?;
                let refund = quote.expected_refund.into_raw().to_biguint().unwrap_or_default();
                m.total_collateral += &quote.collateral;
                if m.total_collateral >= refund {
                    m.total_collateral -= refund;
                }
                let account = m.account_mut(signer);
                if let Some(stored) = account.legs.iter_mut().find(|l| l.leg.index == request.leg_index) {
                    stored.leg.is_open = false;
                }
            }
            Effect::CreateMarket { params } => {
                let sim = SimMarketParams {
                    mean: params.initial_mean.to_f64(),
                    sigma: params.initial_sigma.to_f64(),
                    k: params.k.to_f64(),
                    b: params.b.to_f64(),
                    description: params.description,
                    collateral_token: params.collateral,
                };
                state.deploy(&sim).map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }

    async fn receipt(&self, hash: TxHash) -> Result<ReceiptStatus, ChainError> {
        self.enter(SimMethod::Receipt, hash.to_string()).await?;

        let mut held = self.held.subscribe();
        let released = held.wait_for(|h| !*h).await.is_ok();
        if !released {
            return Err(ChainError::Unavailable("simulated chain shut down".into()));
        }

        let tx = self
            .pending
            .lock()
            .remove(&hash)
            .ok_or_else(|| ChainError::NotFound(format!("transaction {}", hash)))?;
        if tx.revert {
            debug!("sim tx {} reverting (scripted)", hash);
            return Ok(ReceiptStatus::Reverted);
        }
        match self.apply(tx.effect) {
            Ok(()) => Ok(ReceiptStatus::Success),
            Err(reason) => {
                warn!("sim tx {} reverted: {}", hash, reason);
                Ok(ReceiptStatus::Reverted)
            }
        }
    }
}

fn check_sigma(market: &SimMarketState, sigma: f64) -> Result<(), String> {
    let floor = min_sigma(market.k, market.b);
    if !sigma.is_finite() || sigma <= 0.0 || sigma < floor {
        return Err(format!("sigma {} below minimum {}", sigma, floor));
    }
    Ok(())
}

impl MarketBackend for SimulatedMarket {
    fn read_market(&self, market: Address) -> BoxFuture<'_, Result<MarketSnapshot, ChainError>> {
        async move {
            self.enter(SimMethod::ReadMarket, market.to_string()).await?;
            let state = self.state.lock();
            let m = state.market(market)?;
            Ok(MarketSnapshot {
                mean: m.mean.clone(),
                sigma: m.sigma.clone(),
                description: m.description.clone(),
                collateral_token: m.collateral_token,
            })
        }
        .boxed()
    }

    fn quote_collateral(
        &self,
        market: Address,
        mu: Fixed18,
        sigma: Fixed18,
    ) -> BoxFuture<'_, Result<RawQuote, ChainError>> {
        async move {
            self.enter(SimMethod::QuoteCollateral, format!("{} {}", mu, sigma)).await?;
            self.compute_quote(market, &mu, &sigma)
        }
        .boxed()
    }

    fn submit_trade(&self, market: Address, request: TradeRequest) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        async move {
            let detail = format!("{} {} value={:?}", request.mu, request.sigma, request.value);
            self.enter(SimMethod::SubmitTrade, detail).await?;
            Ok(self.queue(Effect::Trade { market, request }))
        }
        .boxed()
    }

    fn read_liquidity(&self, market: Address, user: Address) -> BoxFuture<'_, Result<LiquiditySnapshot, ChainError>> {
        async move {
            self.enter(SimMethod::ReadLiquidity, user.to_string()).await?;
            let state = self.state.lock();
            let m = state.market(market)?;
            let account = m.account(user);
            Ok(LiquiditySnapshot {
                user_shares: account.map(|a| a.shares.clone()).unwrap_or_default(),
                total_shares: m.total_shares.clone(),
                total_collateral: m.total_collateral.clone(),
                allowance: if m.is_native() {
                    None
                } else {
                    Some(account.map(|a| a.allowance.clone()).unwrap_or_default())
                },
            })
        }
        .boxed()
    }

    fn submit_add_liquidity(
        &self,
        market: Address,
        amount: Amount,
        value: Option<Amount>,
    ) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        async move {
            self.enter(SimMethod::AddLiquidity, format!("{} value={:?}", amount, value)).await?;
            Ok(self.queue(Effect::AddLiquidity { market, amount, value }))
        }
        .boxed()
    }

    fn submit_remove_liquidity(&self, market: Address, shares: Amount) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        async move {
            self.enter(SimMethod::RemoveLiquidity, shares.to_string()).await?;
            Ok(self.queue(Effect::RemoveLiquidity { market, shares }))
        }
        .boxed()
    }

    fn approve(&self, token: Address, spender: Address, amount: Amount) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        async move {
            self.enter(SimMethod::Approve, amount.to_string()).await?;
            Ok(self.queue(Effect::Approve { token, spender, amount }))
        }
        .boxed()
    }

    fn submit_close_position(&self, market: Address, request: CloseRequest) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        async move {
            self.enter(SimMethod::ClosePosition, format!("{} value={:?}", request.leg_index, request.value))
                .await?;
            Ok(self.queue(Effect::Close { market, request }))
        }
        .boxed()
    }

    fn wait_for_receipt(&self, hash: TxHash) -> BoxFuture<'_, Result<ReceiptStatus, ChainError>> {
        self.receipt(hash).boxed()
    }

    fn position_leg_count(&self, market: Address, user: Address) -> BoxFuture<'_, Result<u64, ChainError>> {
        async move {
            self.enter(SimMethod::LegCount, user.to_string()).await?;
            let state = self.state.lock();
            let m = state.market(market)?;
            Ok(m.account(user).map(|a| a.legs.len() as u64).unwrap_or(0))
        }
        .boxed()
    }

    fn position_leg(&self, market: Address, user: Address, index: u64) -> BoxFuture<'_, Result<PositionLeg, ChainError>> {
        async move {
            self.enter(SimMethod::Leg, index.to_string()).await?;
            let state = self.state.lock();
            let m = state.market(market)?;
            m.account(user)
                .and_then(|a| a.legs.iter().find(|l| l.leg.index == index))
                .map(|l| l.leg.clone())
                .ok_or_else(|| ChainError::NotFound(format!("leg {}", index)))
        }
        .boxed()
    }

    fn quote_close_position(&self, market: Address, leg_index: u64) -> BoxFuture<'_, Result<CloseQuote, ChainError>> {
        async move {
            self.enter(SimMethod::QuoteClose, leg_index.to_string()).await?;
            self.compute_close_quote(market, leg_index)
        }
        .boxed()
    }
}

impl MarketFactory for SimulatedMarket {
    fn deployed_markets(&self) -> BoxFuture<'_, Result<Vec<Address>, ChainError>> {
        async move {
            self.enter(SimMethod::DeployedMarkets, String::new()).await?;
            Ok(self.state.lock().markets.iter().map(|m| m.address).collect())
        }
        .boxed()
    }

    fn create_market(&self, params: EncodedMarketParams) -> BoxFuture<'_, Result<TxHash, ChainError>> {
        async move {
            self.enter(SimMethod::CreateMarket, params.description.clone()).await?;
            Ok(self.queue(Effect::CreateMarket { params }))
        }
        .boxed()
    }

    fn wait_for_creation(&self, hash: TxHash) -> BoxFuture<'_, Result<ReceiptStatus, ChainError>> {
        self.receipt(hash).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distribution_model::ether;

    fn signer() -> Address {
        Address([0xaa; 20])
    }

    fn native() -> (SimulatedMarket, Address) {
        SimulatedMarket::with_market(signer(), &SimMarketParams::default()).unwrap()
    }

    #[test]
    fn test_lambda_scales_to_l2_norm() {
        // ∫ (λ p)^2 = λ^2 / (2σ√π) = k^2
        let (k, sigma) = (2.0, 3.0);
        let lambda = l2_lambda(k, sigma);
        let l2_squared = lambda * lambda / (2.0 * sigma * PI.sqrt());
        assert!((l2_squared - k * k).abs() < 1e-9);
    }

    #[test]
    fn test_collateral_zero_for_identical_distribution() {
        let (collateral, _) = position_collateral((100.0, 10.0), (100.0, 10.0), 1.0);
        assert_eq!(collateral, 0.0);
    }

    #[test]
    fn test_collateral_for_mean_shift() {
        let (collateral, arg_min) = position_collateral((100.0, 10.0), (105.0, 10.0), 1.0);
        assert!(collateral > 0.0);
        // worst case sits on the side the trader moved away from
        assert!(arg_min < 102.5);
    }

    #[tokio::test]
    async fn test_quote_rejects_sigma_below_floor() {
        let (sim, market) = native();
        let mu = to_fixed(100.0).unwrap();
        let result = sim.quote_collateral(market, mu, Fixed18::zero()).await;
        assert!(matches!(result, Err(ChainError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_writes_apply_only_on_receipt() {
        let (sim, market) = native();
        let hash = sim.submit_add_liquidity(market, ether(10), Some(ether(10))).await.unwrap();
        assert_eq!(sim.pending_count(), 1);
        assert!(sim.state().markets[0].total_shares.is_zero());

        let status = sim.wait_for_receipt(hash).await.unwrap();
        assert_eq!(status, ReceiptStatus::Success);
        assert_eq!(sim.state().markets[0].total_shares, ether(10));
        assert_eq!(sim.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_native_add_without_value_reverts() {
        let (sim, market) = native();
        let hash = sim.submit_add_liquidity(market, ether(10), None).await.unwrap();
        assert_eq!(sim.wait_for_receipt(hash).await.unwrap(), ReceiptStatus::Reverted);
        assert!(sim.state().markets[0].total_shares.is_zero());
    }

    #[tokio::test]
    async fn test_scripted_rejection_and_revert() {
        let (sim, market) = native();
        sim.reject_next_writes(1);
        let rejected = sim.submit_remove_liquidity(market, ether(1)).await;
        assert!(matches!(rejected, Err(ChainError::Rejected(_))));

        sim.revert_next_writes(1);
        let hash = sim.submit_add_liquidity(market, ether(1), Some(ether(1))).await.unwrap();
        assert_eq!(sim.wait_for_receipt(hash).await.unwrap(), ReceiptStatus::Reverted);
    }

    #[tokio::test]
    async fn test_trade_appends_leg_and_moves_consensus() {
        let (sim, market) = native();
        let mu = to_fixed(105.0).unwrap();
        let sigma = to_fixed(12.0).unwrap();
        let quote = sim.quote_collateral(market, mu.clone(), sigma.clone()).await.unwrap();

        let request = TradeRequest {
            mu: mu.clone(),
            sigma: sigma.clone(),
            arg_min_x: quote.arg_min_x.clone(),
            value: Some(quote.collateral.clone()),
        };
        let hash = sim.submit_trade(market, request).await.unwrap();
        assert_eq!(sim.wait_for_receipt(hash).await.unwrap(), ReceiptStatus::Success);

        let snapshot = sim.read_market(market).await.unwrap();
        assert_eq!(snapshot.mean, mu);
        assert_eq!(sim.position_leg_count(market, signer()).await.unwrap(), 1);
        let leg = sim.position_leg(market, signer(), 0).await.unwrap();
        assert!(leg.is_open);
        assert_eq!(leg.old_mean, to_fixed(100.0).unwrap());
    }

    #[test]
    fn test_state_json_round_trip() {
        let (sim, _) = native();
        let json = sim.to_json().unwrap();
        let back = SimulatedMarket::from_json(&json).unwrap();
        assert_eq!(back.state(), sim.state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_and_call_log() {
        let (sim, market) = native();
        sim.push_latency(SimMethod::ReadMarket, Duration::from_millis(300));
        let start = Instant::now();
        sim.read_market(market).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(sim.calls_of(SimMethod::ReadMarket).len(), 1);
    }
}
