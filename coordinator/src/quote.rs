//! Debounced, generation-checked collateral quoting
//!
//! Pipeline: proposal edit -> debounce timer -> `quoteCollateral` ->
//! apply if still the latest generation. A newer edit aborts a pending
//! timer outright; a fetch already on the wire is left to finish and its
//! result is dropped.

use std::sync::Arc;
use std::time::Duration;

use distribution_model::{to_fixed, Address, Amount, Fixed18, MarketConsensus, ProposedState, Quote};
use log::{debug, warn};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chain::MarketBackend;
use crate::error::CoordinatorError;

/// `Idle -> Debouncing -> Fetching -> (Resolved | Stale | Failed)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotePhase {
    /// Nothing to quote (no proposal, or proposal equals consensus)
    Idle,
    Debouncing,
    Fetching,
    Resolved,
    /// Quote dropped because its inputs changed underneath it
    Stale,
    Failed,
}

impl QuotePhase {
    /// No timer or fetch outstanding for the current generation
    pub fn is_settled(&self) -> bool {
        !matches!(self, QuotePhase::Debouncing | QuotePhase::Fetching)
    }
}

/// Observable quote state for one market
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteStatus {
    pub generation: u64,
    pub phase: QuotePhase,
    pub quote: Quote,
    /// Proposal the current generation quotes
    pub proposal: Option<ProposedState>,
    pub last_error: Option<String>,
    /// Fetch results dropped because a newer generation existed
    pub discarded: u64,
}

impl QuoteStatus {
    fn initial() -> Self {
        Self {
            generation: 0,
            phase: QuotePhase::Idle,
            quote: Quote::empty(),
            proposal: None,
            last_error: None,
            discarded: 0,
        }
    }

    /// Resolved quote for exactly `proposal`
    pub fn resolved_for(&self, proposal: &ProposedState) -> Option<(&Amount, &Fixed18)> {
        if self.phase != QuotePhase::Resolved || self.proposal.as_ref() != Some(proposal) {
            return None;
        }
        self.quote.pair()
    }
}

#[derive(Default)]
struct Schedule {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// Quote engine for one market
pub struct QuoteEngine {
    backend: Arc<dyn MarketBackend>,
    market: Address,
    debounce: Duration,
    schedule: Arc<Mutex<Schedule>>,
    status: Arc<watch::Sender<QuoteStatus>>,
}

impl QuoteEngine {
    pub fn new(backend: Arc<dyn MarketBackend>, market: Address, debounce: Duration) -> Self {
        let (status, _) = watch::channel(QuoteStatus::initial());
        Self {
            backend,
            market,
            debounce,
            schedule: Arc::new(Mutex::new(Schedule::default())),
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> QuoteStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QuoteStatus> {
        self.status.subscribe()
    }

    /// React to a proposal edit; must be called inside a tokio runtime
    ///
    /// Invalidates the current quote immediately and restarts the debounce
    /// timer. A proposal identical to the consensus is not quoted at all.
    pub fn propose(&self, proposal: ProposedState, consensus: &MarketConsensus) -> Result<(), CoordinatorError> {
        let mu = to_fixed(proposal.mu)?;
        let sigma = to_fixed(proposal.sigma)?;

        let mut schedule = self.schedule.lock();
        schedule.generation += 1;
        let generation = schedule.generation;
        if let Some(timer) = schedule.pending.take() {
            timer.abort();
        }

        if proposal.matches(consensus) {
            debug!("quote gen {}: proposal equals consensus, nothing to quote", generation);
            self.status.send_modify(|s| {
                s.generation = generation;
                s.phase = QuotePhase::Idle;
                s.quote = Quote::empty();
                s.proposal = Some(proposal);
                s.last_error = None;
            });
            return Ok(());
        }

        self.status.send_modify(|s| {
            s.generation = generation;
            s.phase = QuotePhase::Debouncing;
            s.quote = Quote::empty();
            s.proposal = Some(proposal);
            s.last_error = None;
        });

        let task = tokio::spawn(debounced_fetch(
            self.backend.clone(),
            self.market,
            self.debounce,
            self.schedule.clone(),
            self.status.clone(),
            generation,
            mu,
            sigma,
        ));
        schedule.pending = Some(task);
        Ok(())
    }

    /// Drop the current quote without scheduling a new one
    pub fn invalidate(&self) {
        let mut schedule = self.schedule.lock();
        schedule.generation += 1;
        let generation = schedule.generation;
        if let Some(timer) = schedule.pending.take() {
            timer.abort();
        }
        self.status.send_modify(|s| {
            s.generation = generation;
            s.phase = QuotePhase::Stale;
            s.quote = Quote::empty();
        });
    }

    /// Quote `proposal` right now, bypassing debounce and cache
    ///
    /// Used at submission time; the cached status is left untouched.
    pub async fn fresh_quote(&self, proposal: &ProposedState) -> Result<Quote, CoordinatorError> {
        let mu = to_fixed(proposal.mu)?;
        let sigma = to_fixed(proposal.sigma)?;
        let raw = self
            .backend
            .quote_collateral(self.market, mu, sigma)
            .await
            .map_err(|e| CoordinatorError::QuoteUnavailable(e.to_string()))?;
        Ok(Quote::resolved(raw.collateral, raw.arg_min_x))
    }

    /// Wait until the current generation has no timer or fetch outstanding
    pub async fn settled(&self) -> Result<QuoteStatus, CoordinatorError> {
        let mut rx = self.subscribe();
        rx.wait_for(|s| s.phase.is_settled())
            .await
            .map(|status| status.clone())
            .map_err(|_| CoordinatorError::ReadUnavailable("quote engine shut down".into()))
    }
}

impl Drop for QuoteEngine {
    fn drop(&mut self) {
        if let Some(timer) = self.schedule.lock().pending.take() {
            timer.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn debounced_fetch(
    backend: Arc<dyn MarketBackend>,
    market: Address,
    debounce: Duration,
    schedule: Arc<Mutex<Schedule>>,
    status: Arc<watch::Sender<QuoteStatus>>,
    generation: u64,
    mu: Fixed18,
    sigma: Fixed18,
) {
    tokio::time::sleep(debounce).await;

    {
        let mut schedule = schedule.lock();
        if schedule.generation != generation {
            return;
        }
        // past this point the fetch is no longer abortable
        schedule.pending = None;
    }

    debug!("quote gen {}: fetching mu={} sigma={}", generation, mu, sigma);
    status.send_modify(|s| {
        if s.generation == generation {
            s.phase = QuotePhase::Fetching;
        }
    });

    let result = backend.quote_collateral(market, mu, sigma).await;

    let schedule = schedule.lock();
    if schedule.generation != generation {
        debug!("quote gen {}: superseded by gen {}, discarding", generation, schedule.generation);
        status.send_modify(|s| s.discarded += 1);
        return;
    }

    match result {
        Ok(raw) => {
            debug!("quote gen {}: collateral={} argminX={}", generation, raw.collateral, raw.arg_min_x);
            status.send_modify(|s| {
                s.phase = QuotePhase::Resolved;
                s.quote = Quote::resolved(raw.collateral, raw.arg_min_x);
                s.last_error = None;
            });
        }
        Err(err) => {
            warn!("quote gen {} failed: {}", generation, err);
            status.send_modify(|s| {
                s.phase = QuotePhase::Failed;
                s.quote = Quote::empty();
                s.last_error = Some(err.to_string());
            });
        }
    }
}

/// Relative move of `fresh` against `cached`, in basis points (saturating)
pub fn divergence_bps(cached: &BigUint, fresh: &BigUint) -> u64 {
    if cached == fresh {
        return 0;
    }
    if cached.is_zero() {
        return u64::MAX;
    }
    let diff = if fresh > cached { fresh - cached } else { cached - fresh };
    (diff * 10_000u32 / cached).to_u64().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_bps() {
        let hundred = BigUint::from(100u32);
        assert_eq!(divergence_bps(&hundred, &hundred), 0);
        assert_eq!(divergence_bps(&hundred, &BigUint::from(101u32)), 100);
        assert_eq!(divergence_bps(&hundred, &BigUint::from(50u32)), 5_000);
        assert_eq!(divergence_bps(&BigUint::zero(), &hundred), u64::MAX);
    }

    #[test]
    fn test_settled_phases() {
        assert!(QuotePhase::Idle.is_settled());
        assert!(QuotePhase::Resolved.is_settled());
        assert!(!QuotePhase::Debouncing.is_settled());
        assert!(!QuotePhase::Fetching.is_settled());
    }
}
