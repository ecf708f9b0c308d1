//! Crate-level error type.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by funnel operations.
///
/// Validation failures are rejected before any state changes. Lock and
/// schema failures come from the ledger. Backend failures carry whatever the
/// scheduler adapter reported.
#[derive(Debug, Error)]
pub enum FunnelError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl FunnelError {
    /// The ledger lock could not be acquired in time.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::Store(StoreError::Lock { .. }))
    }

    /// Input was rejected before anything changed.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::Store(StoreError::Invalid(_)))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

impl From<regex::Error> for FunnelError {
    fn from(err: regex::Error) -> Self {
        Self::Invalid(format!("bad name pattern: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_error_classification() {
        let lock = FunnelError::from(StoreError::Lock {
            timeout: Duration::from_secs(1),
        });
        assert!(lock.is_lock_timeout());
        assert!(!lock.is_validation());

        let invalid = FunnelError::from(StoreError::Invalid("negative".into()));
        assert!(invalid.is_validation());

        let backend = FunnelError::from(anyhow::anyhow!("qsub exited with status 1"));
        assert!(backend.is_backend());
        assert_eq!(backend.to_string(), "backend error: qsub exited with status 1");
    }
}
