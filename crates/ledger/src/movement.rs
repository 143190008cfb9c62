//! Immutable movement records (the audit trail).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bank_core::{AccountId, Money, MovementId};

/// Money moved between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: MovementId,
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    pub comment: String,
}

/// Money paid out of an account to an external merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantDebitRecord {
    pub id: MovementId,
    pub account: AccountId,
    pub merchant: String,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    pub comment: String,
}

/// Money entering the system into an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub id: MovementId,
    pub account: AccountId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    pub comment: String,
}

/// Money leaving the system from an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: MovementId,
    pub account: AccountId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Transfer,
    MerchantDebit,
    Deposit,
    Withdrawal,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Transfer => "transfer",
            MovementKind::MerchantDebit => "merchant_debit",
            MovementKind::Deposit => "deposit",
            MovementKind::Withdrawal => "withdrawal",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed ledger operation. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Movement {
    Transfer(TransferRecord),
    MerchantDebit(MerchantDebitRecord),
    Deposit(DepositRecord),
    Withdrawal(WithdrawalRecord),
}

impl Movement {
    pub fn id(&self) -> MovementId {
        match self {
            Movement::Transfer(r) => r.id,
            Movement::MerchantDebit(r) => r.id,
            Movement::Deposit(r) => r.id,
            Movement::Withdrawal(r) => r.id,
        }
    }

    pub fn kind(&self) -> MovementKind {
        match self {
            Movement::Transfer(_) => MovementKind::Transfer,
            Movement::MerchantDebit(_) => MovementKind::MerchantDebit,
            Movement::Deposit(_) => MovementKind::Deposit,
            Movement::Withdrawal(_) => MovementKind::Withdrawal,
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            Movement::Transfer(r) => r.amount,
            Movement::MerchantDebit(r) => r.amount,
            Movement::Deposit(r) => r.amount,
            Movement::Withdrawal(r) => r.amount,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Movement::Transfer(r) => r.created_at,
            Movement::MerchantDebit(r) => r.created_at,
            Movement::Deposit(r) => r.created_at,
            Movement::Withdrawal(r) => r.created_at,
        }
    }

    /// Whether this record references `account` in any role.
    pub fn involves(&self, account: AccountId) -> bool {
        match self {
            Movement::Transfer(r) => r.source == account || r.destination == account,
            Movement::MerchantDebit(r) => r.account == account,
            Movement::Deposit(r) => r.account == account,
            Movement::Withdrawal(r) => r.account == account,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_involves_both_sides_only() {
        let source = AccountId::new();
        let destination = AccountId::new();
        let movement = Movement::Transfer(TransferRecord {
            id: MovementId::new(),
            source,
            destination,
            amount: "5.00".parse().unwrap(),
            created_at: Utc::now(),
            comment: String::new(),
        });

        assert!(movement.involves(source));
        assert!(movement.involves(destination));
        assert!(!movement.involves(AccountId::new()));
        assert_eq!(movement.kind(), MovementKind::Transfer);
    }

    #[test]
    fn serialises_with_kind_tag() {
        let movement = Movement::Withdrawal(WithdrawalRecord {
            id: MovementId::new(),
            account: AccountId::new(),
            amount: "60.00".parse().unwrap(),
            created_at: Utc::now(),
        });

        let json = serde_json::to_value(&movement).unwrap();
        assert_eq!(json["kind"], "withdrawal");
        assert_eq!(json["amount"], "60.00");
    }
}
