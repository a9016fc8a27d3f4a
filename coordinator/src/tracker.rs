//! Transaction lifecycle tracking (write -> hash -> receipt)
//!
//! Every logical action owns its own tracker so an approval and a trade in
//! flight at the same time never share phase or hash. Observers subscribe
//! to a `watch` channel; the tracker itself never refreshes anything on
//! confirmation, that is the owner's job.

use std::fmt;
use std::future::Future;

use distribution_model::TxHash;
use log::{info, warn};
use tokio::sync::watch;

use crate::chain::ReceiptStatus;
use crate::error::{ChainError, CoordinatorError, ErrorKind};

/// Logical action a tracker is dedicated to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxAction {
    Trade,
    Approve,
    AddLiquidity,
    RemoveLiquidity,
    ClosePosition,
    CreateMarket,
}

impl fmt::Display for TxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxAction::Trade => "trade",
            TxAction::Approve => "approve",
            TxAction::AddLiquidity => "add-liquidity",
            TxAction::RemoveLiquidity => "remove-liquidity",
            TxAction::ClosePosition => "close-position",
            TxAction::CreateMarket => "create-market",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxPhase {
    Idle,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl TxPhase {
    /// Submitting or waiting for a receipt
    pub fn is_busy(&self) -> bool {
        matches!(self, TxPhase::Submitting | TxPhase::AwaitingConfirmation)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxPhase::Confirmed | TxPhase::Failed)
    }
}

/// Observable state of the latest attempt for one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionAttempt {
    pub hash: Option<TxHash>,
    pub phase: TxPhase,
    pub error: Option<ErrorKind>,
}

impl TransactionAttempt {
    pub fn idle() -> Self {
        Self { hash: None, phase: TxPhase::Idle, error: None }
    }
}

/// State machine `Idle -> Submitting -> AwaitingConfirmation -> {Confirmed, Failed}`
pub struct TxTracker {
    action: TxAction,
    state: watch::Sender<TransactionAttempt>,
}

impl TxTracker {
    pub fn new(action: TxAction) -> Self {
        let (state, _) = watch::channel(TransactionAttempt::idle());
        Self { action, state }
    }

    pub fn action(&self) -> TxAction {
        self.action
    }

    pub fn attempt(&self) -> TransactionAttempt {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionAttempt> {
        self.state.subscribe()
    }

    pub fn is_writing(&self) -> bool {
        self.state.borrow().phase == TxPhase::Submitting
    }

    pub fn is_confirming(&self) -> bool {
        self.state.borrow().phase == TxPhase::AwaitingConfirmation
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().phase.is_busy()
    }

    /// Fail fast if an attempt is still in flight
    pub fn ensure_available(&self) -> Result<(), CoordinatorError> {
        if self.is_busy() {
            return Err(CoordinatorError::ActionInFlight(self.action));
        }
        Ok(())
    }

    /// Record a pre-flight rejection; the tracker stays `Idle`
    ///
    /// Ignored while an attempt is in flight so it cannot clobber that
    /// attempt's state.
    pub fn reject(&self, err: &CoordinatorError) {
        let kind = err.kind();
        self.state.send_if_modified(|attempt| {
            if attempt.phase.is_busy() {
                return false;
            }
            *attempt = TransactionAttempt { hash: None, phase: TxPhase::Idle, error: Some(kind) };
            true
        });
    }

    /// Back to `Idle` after a terminal state
    pub fn reset(&self) {
        self.state.send_if_modified(|attempt| {
            if attempt.phase.is_busy() {
                return false;
            }
            *attempt = TransactionAttempt::idle();
            true
        });
    }

    /// Drive one attempt through the full lifecycle
    ///
    /// `submit` is the write (resolves to the hash once the signer accepted
    /// it); `confirm` waits for the receipt. A receipt that never arrives
    /// leaves the tracker in `AwaitingConfirmation`.
    ///
    /// # Returns
    /// * the hash once the receipt reports success
    /// * `ActionInFlight` if the previous attempt has not finished
    /// * `SubmissionRejected` if the write was refused (tracker back to `Idle`)
    /// * `TransactionReverted` / `ReadUnavailable` if the receipt failed
    pub async fn run<S, C, F>(&self, submit: S, confirm: C) -> Result<TxHash, CoordinatorError>
    where
        S: Future<Output = Result<TxHash, ChainError>>,
        C: FnOnce(TxHash) -> F,
        F: Future<Output = Result<ReceiptStatus, ChainError>>,
    {
        let started = self.state.send_if_modified(|attempt| {
            if attempt.phase.is_busy() {
                return false;
            }
            *attempt = TransactionAttempt { hash: None, phase: TxPhase::Submitting, error: None };
            true
        });
        if !started {
            return Err(CoordinatorError::ActionInFlight(self.action));
        }

        let hash = match submit.await {
            Ok(hash) => hash,
            Err(err) => {
                warn!("{} submission rejected: {}", self.action, err);
                let err = CoordinatorError::SubmissionRejected { action: self.action, reason: err.to_string() };
                self.finish(None, TxPhase::Idle, Some(err.kind()));
                return Err(err);
            }
        };

        info!("{} submitted: {}", self.action, hash);
        self.finish(Some(hash), TxPhase::AwaitingConfirmation, None);

        match confirm(hash).await {
            Ok(ReceiptStatus::Success) => {
                info!("{} confirmed: {}", self.action, hash);
                self.finish(Some(hash), TxPhase::Confirmed, None);
                Ok(hash)
            }
            Ok(ReceiptStatus::Reverted) => {
                warn!("{} reverted: {}", self.action, hash);
                let err = CoordinatorError::TransactionReverted { action: self.action, hash };
                self.finish(Some(hash), TxPhase::Failed, Some(err.kind()));
                Err(err)
            }
            Err(ChainError::Reverted(reason)) => {
                warn!("{} reverted: {} ({})", self.action, hash, reason);
                let err = CoordinatorError::TransactionReverted { action: self.action, hash };
                self.finish(Some(hash), TxPhase::Failed, Some(err.kind()));
                Err(err)
            }
            Err(other) => {
                warn!("{} receipt unavailable for {}: {}", self.action, hash, other);
                let err = CoordinatorError::ReadUnavailable(format!("receipt for {}: {}", hash, other));
                self.finish(Some(hash), TxPhase::Failed, Some(err.kind()));
                Err(err)
            }
        }
    }

    fn finish(&self, hash: Option<TxHash>, phase: TxPhase, error: Option<ErrorKind>) {
        self.state.send_replace(TransactionAttempt { hash, phase, error });
    }
}

/// One tracker per logical market action
pub struct Trackers {
    pub trade: TxTracker,
    pub approve: TxTracker,
    pub add_liquidity: TxTracker,
    pub remove_liquidity: TxTracker,
    pub close_position: TxTracker,
}

impl Trackers {
    pub fn new() -> Self {
        Self {
            trade: TxTracker::new(TxAction::Trade),
            approve: TxTracker::new(TxAction::Approve),
            add_liquidity: TxTracker::new(TxAction::AddLiquidity),
            remove_liquidity: TxTracker::new(TxAction::RemoveLiquidity),
            close_position: TxTracker::new(TxAction::ClosePosition),
        }
    }

    pub fn get(&self, action: TxAction) -> Option<&TxTracker> {
        match action {
            TxAction::Trade => Some(&self.trade),
            TxAction::Approve => Some(&self.approve),
            TxAction::AddLiquidity => Some(&self.add_liquidity),
            TxAction::RemoveLiquidity => Some(&self.remove_liquidity),
            TxAction::ClosePosition => Some(&self.close_position),
            TxAction::CreateMarket => None,
        }
    }
}

impl Default for Trackers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hash(n: u8) -> TxHash {
        TxHash([n; 32])
    }

    async fn success(_: TxHash) -> Result<ReceiptStatus, ChainError> {
        Ok(ReceiptStatus::Success)
    }

    #[tokio::test]
    async fn test_happy_path_phases() {
        let tracker = TxTracker::new(TxAction::Trade);
        let mut rx = tracker.subscribe();
        let mut seen = vec![rx.borrow().phase];

        let watcher = tokio::spawn(async move {
            let mut phases = Vec::new();
            while rx.changed().await.is_ok() {
                let phase = rx.borrow().phase;
                phases.push(phase);
                if phase.is_terminal() {
                    break;
                }
            }
            phases
        });

        let result = tracker
            .run(
                async {
                    tokio::task::yield_now().await;
                    Ok(hash(1))
                },
                |h| async move {
                    tokio::task::yield_now().await;
                    success(h).await
                },
            )
            .await;
        assert_eq!(result, Ok(hash(1)));

        seen.extend(watcher.await.unwrap());
        assert_eq!(
            seen,
            vec![TxPhase::Idle, TxPhase::Submitting, TxPhase::AwaitingConfirmation, TxPhase::Confirmed]
        );
        assert_eq!(tracker.attempt().hash, Some(hash(1)));
    }

    #[tokio::test]
    async fn test_rejected_submission_returns_to_idle() {
        let tracker = TxTracker::new(TxAction::Approve);
        let result = tracker
            .run(async { Err(ChainError::Rejected("user declined".into())) }, success)
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SubmissionRejected);
        let attempt = tracker.attempt();
        assert_eq!(attempt.phase, TxPhase::Idle);
        assert_eq!(attempt.error, Some(ErrorKind::SubmissionRejected));
        assert_eq!(attempt.hash, None);
    }

    #[tokio::test]
    async fn test_reverted_receipt_fails() {
        let tracker = TxTracker::new(TxAction::AddLiquidity);
        let result = tracker
            .run(async { Ok(hash(2)) }, |_| async { Ok(ReceiptStatus::Reverted) })
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::TransactionReverted);
        let attempt = tracker.attempt();
        assert_eq!(attempt.phase, TxPhase::Failed);
        assert_eq!(attempt.hash, Some(hash(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_blocked_while_confirming() {
        let tracker = TxTracker::new(TxAction::Trade);
        let first = tracker.run(async { Ok(hash(3)) }, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ReceiptStatus::Success)
        });
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(tracker.is_confirming());
            tracker.run(async { Ok(hash(4)) }, success).await
        };

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first, Ok(hash(3)));
        assert_eq!(second, Err(CoordinatorError::ActionInFlight(TxAction::Trade)));
        assert_eq!(tracker.attempt().hash, Some(hash(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_receipt_stays_awaiting() {
        let tracker = TxTracker::new(TxAction::ClosePosition);
        let run = tracker.run(async { Ok(hash(5)) }, |_| futures::future::pending());
        let timed = tokio::time::timeout(Duration::from_secs(60), run).await;
        assert!(timed.is_err());
        assert_eq!(tracker.attempt().phase, TxPhase::AwaitingConfirmation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_trackers_do_not_interfere() {
        let trackers = Trackers::new();
        let approve = trackers.approve.run(async { Ok(hash(6)) }, |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ReceiptStatus::Success)
        });
        let trade = trackers.trade.run(async { Ok(hash(7)) }, |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(ReceiptStatus::Reverted)
        });
        let (approve, trade) = tokio::join!(approve, trade);
        assert!(approve.is_ok());
        assert!(trade.is_err());
        assert_eq!(trackers.approve.attempt().phase, TxPhase::Confirmed);
        assert_eq!(trackers.approve.attempt().hash, Some(hash(6)));
        assert_eq!(trackers.trade.attempt().phase, TxPhase::Failed);
        assert_eq!(trackers.trade.attempt().hash, Some(hash(7)));
    }

    #[test]
    fn test_reject_and_reset() {
        let tracker = TxTracker::new(TxAction::AddLiquidity);
        tracker.reject(&CoordinatorError::InvalidInput("zero amount".into()));
        assert_eq!(tracker.attempt().error, Some(ErrorKind::InvalidInput));
        tracker.reset();
        assert_eq!(tracker.attempt(), TransactionAttempt::idle());
    }
}
