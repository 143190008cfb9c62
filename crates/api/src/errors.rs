//! Caller-facing errors with stable codes and status numbers.

use serde::Serialize;
use thiserror::Error;

use bank_core::DomainError;
use bank_infra::{LedgerError, StoreError};
use bank_ledger::RuleViolation;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Not enough money on balance.")]
    InsufficientFunds,

    #[error("You can't send money to your own account.")]
    SelfTransfer,

    #[error("Account of receiver is inactive or blocked.")]
    ReceiverUnavailable,

    #[error("Account of receiver does not exist.")]
    ReceiverNotFound,

    #[error("Your account is blocked.")]
    SenderBlocked,

    #[error("You don't have an account yet.")]
    NoAccount,

    #[error("You already have an account.")]
    AccountExists,

    #[error("Account not found.")]
    AccountNotFound,

    #[error("Account has history and cannot be deleted.")]
    AccountReferenced,

    #[error("You don't have a customer profile yet.")]
    NoProfile,

    #[error("You already have a customer profile.")]
    ProfileExists,

    #[error("{0}")]
    InvalidAmount(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Balance would exceed the maximum allowed.")]
    BalanceLimit,

    #[error("You are not allowed to do that.")]
    Forbidden,

    #[error("Exchange rate for {0} is unavailable.")]
    RateUnavailable(String),

    #[error("The ledger is busy, please try again.")]
    Conflict,

    /// Details stay in the variant for logging; callers only see the message.
    #[error("Something went wrong, please try again later.")]
    Internal(String),
}

/// JSON body for an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InsufficientFunds => "insufficient_funds",
            ApiError::SelfTransfer => "self_transfer",
            ApiError::ReceiverUnavailable => "receiver_unavailable",
            ApiError::ReceiverNotFound => "receiver_not_found",
            ApiError::SenderBlocked => "account_blocked",
            ApiError::NoAccount => "no_account",
            ApiError::AccountExists => "account_exists",
            ApiError::AccountNotFound => "account_not_found",
            ApiError::AccountReferenced => "account_referenced",
            ApiError::NoProfile => "no_profile",
            ApiError::ProfileExists => "profile_exists",
            ApiError::InvalidAmount(_) => "invalid_amount",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::BalanceLimit => "balance_limit",
            ApiError::Forbidden => "forbidden",
            ApiError::RateUnavailable(_) => "rate_unavailable",
            ApiError::Conflict => "conflict",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// HTTP-style status number.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::InsufficientFunds
            | ApiError::SelfTransfer
            | ApiError::InvalidAmount(_)
            | ApiError::InvalidRequest(_)
            | ApiError::BalanceLimit => 400,
            ApiError::Forbidden | ApiError::SenderBlocked => 403,
            ApiError::ReceiverUnavailable
            | ApiError::ReceiverNotFound
            | ApiError::NoAccount
            | ApiError::AccountNotFound
            | ApiError::NoProfile => 404,
            ApiError::AccountExists
            | ApiError::AccountReferenced
            | ApiError::ProfileExists
            | ApiError::Conflict => 409,
            ApiError::RateUnavailable(_) => 503,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.code(),
            message: self.message(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Conflict)
    }
}

impl From<RuleViolation> for ApiError {
    fn from(value: RuleViolation) -> Self {
        match value {
            RuleViolation::InsufficientFunds { .. } => ApiError::InsufficientFunds,
            RuleViolation::SelfTransfer => ApiError::SelfTransfer,
            RuleViolation::ReceiverUnavailable { .. } => ApiError::ReceiverUnavailable,
            RuleViolation::SenderBlocked => ApiError::SenderBlocked,
            RuleViolation::InvalidAmount(msg) => ApiError::InvalidAmount(msg),
            RuleViolation::InvalidMerchant(msg) => ApiError::InvalidRequest(msg),
            RuleViolation::BalanceOverflow { .. } => ApiError::BalanceLimit,
            RuleViolation::UnknownAccount(_) => ApiError::AccountNotFound,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Rejected(rule) => rule.into(),
            LedgerError::AccountNotFound(_) => ApiError::AccountNotFound,
            LedgerError::Conflict(_) => ApiError::Conflict,
            LedgerError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::AccountNotFound(_) => ApiError::AccountNotFound,
            StoreError::HolderHasAccount(_) => ApiError::AccountExists,
            StoreError::AccountReferenced(_) => ApiError::AccountReferenced,
            StoreError::HolderHasProfile(_) => ApiError::ProfileExists,
            StoreError::ProfileNotFound(_) => ApiError::NoProfile,
            StoreError::Conflict(_) => ApiError::Conflict,
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => ApiError::InvalidRequest(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_ledger::AccountStatus;

    #[test]
    fn rule_messages_match_the_product_copy() {
        let funds: ApiError = LedgerError::Rejected(RuleViolation::InsufficientFunds {
            available: "0.00".parse().unwrap(),
            requested: "1.00".parse().unwrap(),
        })
        .into();
        assert_eq!(funds.message(), "Not enough money on balance.");
        assert_eq!(funds.status(), 400);

        let own: ApiError = RuleViolation::SelfTransfer.into();
        assert_eq!(own.message(), "You can't send money to your own account.");
        assert_eq!(own.status(), 400);

        let receiver: ApiError = RuleViolation::ReceiverUnavailable {
            status: AccountStatus::Blocked,
        }
        .into();
        assert_eq!(receiver.message(), "Account of receiver is inactive or blocked.");
        assert_eq!(receiver.status(), 404);
    }

    #[test]
    fn infrastructure_failures_hide_details() {
        let err: ApiError = LedgerError::Store("connection reset by peer".to_string()).into();
        assert_eq!(err.status(), 500);
        assert!(!err.message().contains("connection"));

        let busy: ApiError = LedgerError::Conflict("deadlock detected".to_string()).into();
        assert_eq!(busy.status(), 409);
        assert!(busy.is_retryable());
    }

    #[test]
    fn body_carries_code_and_message() {
        let body = ApiError::ReceiverNotFound.body();
        assert_eq!(body.error, "receiver_not_found");
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "error": "receiver_not_found",
                "message": "Account of receiver does not exist.",
            })
        );
    }

    #[test]
    fn profile_errors_map_to_conflict_and_not_found() {
        let holder = bank_core::HolderId::new();
        let exists: ApiError = StoreError::HolderHasProfile(holder).into();
        assert_eq!(exists.status(), 409);
        assert_eq!(exists.code(), "profile_exists");

        let missing: ApiError = StoreError::ProfileNotFound(holder).into();
        assert_eq!(missing.status(), 404);

        let invalid: ApiError = DomainError::validation("passport is required").into();
        assert_eq!(invalid, ApiError::InvalidRequest("passport is required".to_string()));
    }
}
