//! Ledger decision rules.
//!
//! [`decide`] is the single place where sufficiency-of-funds and account
//! eligibility are checked. It is deterministic and side-effect free: it reads
//! the locked account snapshots and returns the balance changes plus the movement
//! record to persist, or the rule that rejected the command.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bank_core::{AccountId, Money, MovementId};

use crate::account::{Account, AccountStatus};
use crate::command::{
    DepositCommand, LedgerCommand, MerchantDebitCommand, TransferCommand, WithdrawalCommand,
};
use crate::movement::{
    DepositRecord, MerchantDebitRecord, Movement, TransferRecord, WithdrawalRecord,
};

/// Business-rule rejection of a ledger command.
///
/// These are final: retrying the same command against the same state yields
/// the same rejection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("not enough money on balance (available {available}, requested {requested})")]
    InsufficientFunds { available: Money, requested: Money },

    #[error("cannot send money to the same account")]
    SelfTransfer,

    #[error("receiver account is {status}")]
    ReceiverUnavailable { status: AccountStatus },

    #[error("account is blocked and cannot be debited")]
    SenderBlocked,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid merchant: {0}")]
    InvalidMerchant(String),

    #[error("balance of account {account} would exceed {}", Money::max())]
    BalanceOverflow { account: AccountId },

    #[error("account {0} was not loaded")]
    UnknownAccount(AccountId),
}

/// Knobs for rules the original product left open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// Refuse transfers, merchant debits and withdrawals from blocked accounts.
    pub reject_blocked_sender: bool,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            reject_blocked_sender: true,
        }
    }
}

/// Locked account snapshots visible to one decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSet {
    accounts: BTreeMap<AccountId, Account>,
}

impl AccountSet {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.id(), a)).collect(),
        }
    }

    pub fn get(&self, id: AccountId) -> Result<&Account, RuleViolation> {
        self.accounts.get(&id).ok_or(RuleViolation::UnknownAccount(id))
    }

    /// Apply a posting to the snapshots in place.
    pub fn apply(&mut self, posting: &Posting) {
        for account in self.accounts.values_mut() {
            posting.apply_to(account);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn into_accounts(self) -> Vec<Account> {
        self.accounts.into_values().collect()
    }
}

/// Balance of one account before and after a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub account: AccountId,
    pub before: Money,
    pub after: Money,
}

/// Everything one committed command writes: new balances plus one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub updates: Vec<BalanceUpdate>,
    pub movement: Movement,
}

impl Posting {
    pub fn update_for(&self, account: AccountId) -> Option<&BalanceUpdate> {
        self.updates.iter().find(|u| u.account == account)
    }

    /// Set the account's balance if this posting changes it.
    ///
    /// Returns whether the account was touched.
    pub fn apply_to(&self, account: &mut Account) -> bool {
        match self.update_for(account.id()) {
            Some(update) => {
                account.set_balance(update.after);
                true
            }
            None => false,
        }
    }
}

/// Decide the effect of `command` against the locked `accounts`.
pub fn decide(
    command: &LedgerCommand,
    accounts: &AccountSet,
    policy: &LedgerPolicy,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> Result<Posting, RuleViolation> {
    command.validate()?;

    match command {
        LedgerCommand::Transfer(cmd) => decide_transfer(cmd, accounts, policy, movement_id, now),
        LedgerCommand::MerchantDebit(cmd) => {
            decide_merchant_debit(cmd, accounts, policy, movement_id, now)
        }
        LedgerCommand::Deposit(cmd) => decide_deposit(cmd, accounts, movement_id, now),
        LedgerCommand::Withdrawal(cmd) => {
            decide_withdrawal(cmd, accounts, policy, movement_id, now)
        }
    }
}

fn ensure_can_debit(account: &Account, policy: &LedgerPolicy) -> Result<(), RuleViolation> {
    if policy.reject_blocked_sender && account.status() == AccountStatus::Blocked {
        return Err(RuleViolation::SenderBlocked);
    }
    Ok(())
}

fn debit(account: &Account, amount: Money) -> Result<BalanceUpdate, RuleViolation> {
    let after = account
        .balance()
        .checked_sub(amount)
        .ok_or(RuleViolation::InsufficientFunds {
            available: account.balance(),
            requested: amount,
        })?;
    Ok(BalanceUpdate {
        account: account.id(),
        before: account.balance(),
        after,
    })
}

fn credit(account: &Account, amount: Money) -> Result<BalanceUpdate, RuleViolation> {
    let after = account
        .balance()
        .checked_add(amount)
        .ok_or(RuleViolation::BalanceOverflow {
            account: account.id(),
        })?;
    Ok(BalanceUpdate {
        account: account.id(),
        before: account.balance(),
        after,
    })
}

fn decide_transfer(
    cmd: &TransferCommand,
    accounts: &AccountSet,
    policy: &LedgerPolicy,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> Result<Posting, RuleViolation> {
    let from = accounts.get(cmd.from)?;
    ensure_can_debit(from, policy)?;

    // Check order matters: funds, then same-account, then receiver status.
    let debited = debit(from, cmd.amount)?;
    if cmd.from == cmd.to {
        return Err(RuleViolation::SelfTransfer);
    }
    let to = accounts.get(cmd.to)?;
    if !to.is_eligible_receiver() {
        return Err(RuleViolation::ReceiverUnavailable {
            status: to.status(),
        });
    }
    let credited = credit(to, cmd.amount)?;

    Ok(Posting {
        updates: vec![debited, credited],
        movement: Movement::Transfer(TransferRecord {
            id: movement_id,
            source: cmd.from,
            destination: cmd.to,
            amount: cmd.amount,
            created_at: now,
            comment: cmd.comment.clone(),
        }),
    })
}

fn decide_merchant_debit(
    cmd: &MerchantDebitCommand,
    accounts: &AccountSet,
    policy: &LedgerPolicy,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> Result<Posting, RuleViolation> {
    let account = accounts.get(cmd.account)?;
    ensure_can_debit(account, policy)?;
    let debited = debit(account, cmd.amount)?;

    Ok(Posting {
        updates: vec![debited],
        movement: Movement::MerchantDebit(MerchantDebitRecord {
            id: movement_id,
            account: cmd.account,
            merchant: cmd.merchant.trim().to_string(),
            amount: cmd.amount,
            created_at: now,
            comment: cmd.comment.clone(),
        }),
    })
}

fn decide_deposit(
    cmd: &DepositCommand,
    accounts: &AccountSet,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> Result<Posting, RuleViolation> {
    let account = accounts.get(cmd.account)?;
    let credited = credit(account, cmd.amount)?;

    Ok(Posting {
        updates: vec![credited],
        movement: Movement::Deposit(DepositRecord {
            id: movement_id,
            account: cmd.account,
            amount: cmd.amount,
            created_at: now,
            comment: cmd.comment.clone(),
        }),
    })
}

fn decide_withdrawal(
    cmd: &WithdrawalCommand,
    accounts: &AccountSet,
    policy: &LedgerPolicy,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> Result<Posting, RuleViolation> {
    let account = accounts.get(cmd.account)?;
    ensure_can_debit(account, policy)?;
    let debited = debit(account, cmd.amount)?;

    Ok(Posting {
        updates: vec![debited],
        movement: Movement::Withdrawal(WithdrawalRecord {
            id: movement_id,
            account: cmd.account,
            amount: cmd.amount,
            created_at: now,
        }),
    })
}
