//! Three-state result for remote reads

use crate::error::{ChainError, CoordinatorError};

/// A remote value that is loading, loaded, or failed to load
///
/// Keeps "not fetched yet" apart from "fetched and empty".
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRead<T> {
    Pending,
    Ready(T),
    Failed(String),
}

impl<T> Default for RemoteRead<T> {
    fn default() -> Self {
        RemoteRead::Pending
    }
}

impl<T> RemoteRead<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            RemoteRead::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RemoteRead::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RemoteRead::Pending)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RemoteRead<U> {
        match self {
            RemoteRead::Pending => RemoteRead::Pending,
            RemoteRead::Ready(value) => RemoteRead::Ready(f(value)),
            RemoteRead::Failed(reason) => RemoteRead::Failed(reason),
        }
    }

    /// Borrow the value or fail with `ReadUnavailable` naming `what`
    pub fn require(&self, what: &str) -> Result<&T, CoordinatorError> {
        match self {
            RemoteRead::Ready(value) => Ok(value),
            RemoteRead::Pending => Err(CoordinatorError::ReadUnavailable(format!("{} not loaded yet", what))),
            RemoteRead::Failed(reason) => Err(CoordinatorError::ReadUnavailable(format!("{}: {}", what, reason))),
        }
    }
}

impl<T> From<Result<T, ChainError>> for RemoteRead<T> {
    fn from(result: Result<T, ChainError>) -> Self {
        match result {
            Ok(value) => RemoteRead::Ready(value),
            Err(err) => RemoteRead::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_require_distinguishes_pending_and_failed() {
        let pending: RemoteRead<u32> = RemoteRead::Pending;
        let err = pending.require("market").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadUnavailable);
        assert!(err.to_string().contains("not loaded"));

        let failed: RemoteRead<u32> = Err(ChainError::Unavailable("timeout".into())).into();
        assert!(failed.require("market").unwrap_err().to_string().contains("timeout"));

        let ready = RemoteRead::Ready(0u32);
        assert_eq!(ready.require("market").unwrap(), &0);
    }
}
