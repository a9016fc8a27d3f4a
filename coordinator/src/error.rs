//! Error types for the coordinator and its chain boundary

use distribution_model::{Amount, ModelError, TxHash};
use thiserror::Error;

use crate::tracker::TxAction;

/// Failure reported by the remote chain / wallet
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Node unreachable, read pending or otherwise not answerable right now
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    /// Signer declined or the node refused the transaction before inclusion
    #[error("rejected: {0}")]
    Rejected(String),
    /// Transaction or call reverted on-chain
    #[error("reverted: {0}")]
    Reverted(String),
    /// Requested entry (leg, market) does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

/// Flat error classification stored on transaction attempts and shown by UIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ReadUnavailable,
    QuoteStale,
    QuoteUnavailable,
    InsufficientAllowance,
    SubmissionRejected,
    TransactionReverted,
    StaleQuoteAtSubmission,
    ActionInFlight,
    InvalidInput,
}

/// Coordinator error; every failure is scoped to one action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("read unavailable: {0}")]
    ReadUnavailable(String),

    #[error("quote superseded by a newer proposal")]
    QuoteStale,

    #[error("no quote available: {0}")]
    QuoteUnavailable(String),

    #[error("insufficient allowance: approved {approved}, required {required}")]
    InsufficientAllowance { approved: Amount, required: Amount },

    #[error("{action} submission rejected: {reason}")]
    SubmissionRejected { action: TxAction, reason: String },

    #[error("{action} transaction {hash} reverted")]
    TransactionReverted { action: TxAction, hash: TxHash },

    #[error("quote moved between quoting and submission ({divergence_bps} bps)")]
    StaleQuoteAtSubmission { cached: Amount, fresh: Amount, divergence_bps: u64 },

    #[error("{0} already in flight")]
    ActionInFlight(TxAction),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::ReadUnavailable(_) => ErrorKind::ReadUnavailable,
            CoordinatorError::QuoteStale => ErrorKind::QuoteStale,
            CoordinatorError::QuoteUnavailable(_) => ErrorKind::QuoteUnavailable,
            CoordinatorError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            CoordinatorError::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
            CoordinatorError::TransactionReverted { .. } => ErrorKind::TransactionReverted,
            CoordinatorError::StaleQuoteAtSubmission { .. } => ErrorKind::StaleQuoteAtSubmission,
            CoordinatorError::ActionInFlight(_) => ErrorKind::ActionInFlight,
            CoordinatorError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

impl From<ModelError> for CoordinatorError {
    fn from(err: ModelError) -> Self {
        CoordinatorError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
