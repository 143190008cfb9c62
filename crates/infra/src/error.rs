//! Store and engine error types.

use thiserror::Error;

use bank_core::{AccountId, HolderId};
use bank_ledger::RuleViolation;

/// Account store / movement log operation error.
///
/// These are **infrastructure errors** (storage, contention, referential
/// integrity) as opposed to ledger rule violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("holder {0} already has an account")]
    HolderHasAccount(HolderId),

    #[error("holder {0} already has a customer profile")]
    HolderHasProfile(HolderId),

    #[error("holder {0} has no customer profile")]
    ProfileNotFound(HolderId),

    #[error("account {0} is referenced by movement records and cannot be deleted")]
    AccountReferenced(AccountId),

    /// Transient contention (serialization failure, lock timeout, lost race).
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    /// Anything else the backend reported. Nothing was committed.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Outcome of a failed ledger operation.
///
/// Every variant guarantees the atomic unit rolled back: balances and the
/// movement log are exactly as they were before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A business rule refused the operation. Final, never retried.
    #[error(transparent)]
    Rejected(RuleViolation),

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Contention persisted past the retry budget. Safe to retry later.
    #[error("data store conflict: {0}")]
    Conflict(String),

    /// The data store failed; the operation did not commit.
    #[error("data store failure: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }

    pub fn rule(&self) -> Option<&RuleViolation> {
        match self {
            LedgerError::Rejected(rule) => Some(rule),
            _ => None,
        }
    }
}

impl From<RuleViolation> for LedgerError {
    fn from(value: RuleViolation) -> Self {
        match value {
            RuleViolation::UnknownAccount(id) => LedgerError::AccountNotFound(id),
            other => LedgerError::Rejected(other),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            other => LedgerError::Store(other.to_string()),
        }
    }
}
