//! Balance-changing commands accepted by the ledger.

use serde::{Deserialize, Serialize};

use bank_core::{AccountId, Money};

use crate::movement::MovementKind;
use crate::rules::RuleViolation;

/// Smallest amount a transfer or merchant debit may move (0.01).
pub const MIN_TRANSFER_MINOR_UNITS: i64 = 1;

/// Smallest amount a deposit or withdrawal may move (10.00).
pub const MIN_CASH_MINOR_UNITS: i64 = 1_000;

/// Longest merchant label we store.
pub const MAX_MERCHANT_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Money,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantDebitCommand {
    pub account: AccountId,
    pub merchant: String,
    pub amount: Money,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account: AccountId,
    pub amount: Money,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalCommand {
    pub account: AccountId,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Transfer(TransferCommand),
    MerchantDebit(MerchantDebitCommand),
    Deposit(DepositCommand),
    Withdrawal(WithdrawalCommand),
}

impl LedgerCommand {
    pub fn kind(&self) -> MovementKind {
        match self {
            LedgerCommand::Transfer(_) => MovementKind::Transfer,
            LedgerCommand::MerchantDebit(_) => MovementKind::MerchantDebit,
            LedgerCommand::Deposit(_) => MovementKind::Deposit,
            LedgerCommand::Withdrawal(_) => MovementKind::Withdrawal,
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            LedgerCommand::Transfer(c) => c.amount,
            LedgerCommand::MerchantDebit(c) => c.amount,
            LedgerCommand::Deposit(c) => c.amount,
            LedgerCommand::Withdrawal(c) => c.amount,
        }
    }

    /// Accounts this command touches, sorted ascending and deduplicated.
    ///
    /// This is the lock acquisition order: every backend must lock in exactly
    /// this order so that crossing transfers cannot deadlock.
    pub fn lock_order(&self) -> Vec<AccountId> {
        let mut ids = match self {
            LedgerCommand::Transfer(c) => vec![c.from, c.to],
            LedgerCommand::MerchantDebit(c) => vec![c.account],
            LedgerCommand::Deposit(c) => vec![c.account],
            LedgerCommand::Withdrawal(c) => vec![c.account],
        };
        ids.sort();
        ids.dedup();
        ids
    }

    /// Shape checks that do not need account state.
    pub fn validate(&self) -> Result<(), RuleViolation> {
        let minimum = match self {
            LedgerCommand::Transfer(_) | LedgerCommand::MerchantDebit(_) => MIN_TRANSFER_MINOR_UNITS,
            LedgerCommand::Deposit(_) | LedgerCommand::Withdrawal(_) => MIN_CASH_MINOR_UNITS,
        };
        let amount = self.amount();
        if amount.minor_units() < minimum {
            return Err(RuleViolation::InvalidAmount(format!(
                "{} amount {amount} is below the minimum of {}",
                self.kind(),
                Money::from_minor_units(minimum).unwrap_or_default()
            )));
        }

        if let LedgerCommand::MerchantDebit(c) = self {
            let merchant = c.merchant.trim();
            if merchant.is_empty() {
                return Err(RuleViolation::InvalidMerchant("merchant is required".to_string()));
            }
            if merchant.chars().count() > MAX_MERCHANT_LEN {
                return Err(RuleViolation::InvalidMerchant(format!(
                    "merchant is longer than {MAX_MERCHANT_LEN} characters"
                )));
            }
        }

        Ok(())
    }
}
