use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bank_core::{AccountId, DomainError, HolderId, Money, PublicAccountId};

/// Lifecycle status of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    #[default]
    Inactive,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Blocked => "blocked",
        }
    }
}

impl core::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            "blocked" => Ok(AccountStatus::Blocked),
            other => Err(DomainError::validation(format!(
                "unknown account status '{other}' (expected active, inactive or blocked)"
            ))),
        }
    }
}

/// A personal bank account.
///
/// The balance is never negative and only changes through a ledger
/// [`Posting`](crate::Posting). The holder and public id are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    public_id: PublicAccountId,
    holder_id: HolderId,
    balance: Money,
    status: AccountStatus,
    created_at: DateTime<Utc>,
}

impl Account {
    /// A freshly opened account: zero balance, inactive.
    pub fn open(holder_id: HolderId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            public_id: PublicAccountId::new(),
            holder_id,
            balance: Money::ZERO,
            status: AccountStatus::Inactive,
            created_at,
        }
    }

    /// Rebuild an account from persisted state.
    pub fn restore(
        id: AccountId,
        public_id: PublicAccountId,
        holder_id: HolderId,
        balance: Money,
        status: AccountStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            public_id,
            holder_id,
            balance,
            status,
            created_at,
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn public_id(&self) -> PublicAccountId {
        self.public_id
    }

    pub fn holder_id(&self) -> HolderId {
        self.holder_id
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Only active accounts may receive transfers.
    pub fn is_eligible_receiver(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Status transitions are administrative and never touch the balance.
    pub fn set_status(&mut self, status: AccountStatus) {
        self.status = status;
    }

    pub(crate) fn set_balance(&mut self, balance: Money) {
        self.balance = balance;
    }
}

impl core::fmt::Display for Account {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}, {}", self.public_id, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_with_zero_balance_and_inactive() {
        let account = Account::open(HolderId::new(), Utc::now());
        assert_eq!(account.balance(), Money::ZERO);
        assert_eq!(account.status(), AccountStatus::Inactive);
        assert!(!account.is_eligible_receiver());
    }

    #[test]
    fn display_shows_public_id_and_status() {
        let account = Account::open(HolderId::new(), Utc::now());
        assert_eq!(account.to_string(), format!("{}, inactive", account.public_id()));
    }

    #[test]
    fn status_change_keeps_balance() {
        let mut account = Account::restore(
            AccountId::new(),
            PublicAccountId::new(),
            HolderId::new(),
            "25.00".parse().unwrap(),
            AccountStatus::Inactive,
            Utc::now(),
        );
        account.set_status(AccountStatus::Blocked);
        assert_eq!(account.status(), AccountStatus::Blocked);
        assert_eq!(account.balance(), "25.00".parse::<Money>().unwrap());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Active".parse::<AccountStatus>().unwrap(), AccountStatus::Active);
        assert_eq!(" blocked ".parse::<AccountStatus>().unwrap(), AccountStatus::Blocked);
        assert!("frozen".parse::<AccountStatus>().is_err());
    }
}
