//! Ledger mutation pipeline.
//!
//! Every balance change goes through [`LedgerEngine::execute`]:
//!
//! ```text
//! LedgerCommand
//!   ↓
//! 1. Shape checks (amount minimum, merchant label)
//!   ↓
//! 2. Begin unit: lock the touched accounts in ascending id order
//!   ↓
//! 3. Decide against the locked snapshots (pure, `bank_ledger::decide`)
//!   ↓
//! 4. Commit: new balances + one movement record, all or nothing
//! ```
//!
//! A rule violation drops the unit (rollback) and is returned as is. A data
//! store conflict reruns the whole pipeline up to `max_conflict_retries` times.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use bank_core::{AccountId, Money, MovementId};
use bank_ledger::{
    Account, DepositCommand, LedgerCommand, LedgerPolicy, MerchantDebitCommand, Movement,
    TransferCommand, WithdrawalCommand, decide,
};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::store::{LedgerStore, UnitOfWork};

/// Result of a committed ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committed {
    /// Accounts whose balance changed, as committed.
    pub accounts: Vec<Account>,
    /// The appended movement record.
    pub movement: Movement,
}

impl Committed {
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id() == id)
    }
}

/// Executes ledger commands against a [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
    policy: LedgerPolicy,
    max_conflict_retries: u32,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, &LedgerConfig::default())
    }

    pub fn with_config(store: S, config: &LedgerConfig) -> Self {
        Self {
            store,
            policy: config.policy,
            max_conflict_retries: config.max_conflict_retries,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Money,
        comment: impl Into<String>,
    ) -> Result<Committed, LedgerError> {
        self.execute(LedgerCommand::Transfer(TransferCommand {
            from,
            to,
            amount,
            comment: comment.into(),
        }))
        .await
    }

    pub async fn merchant_debit(
        &self,
        account: AccountId,
        merchant: impl Into<String>,
        amount: Money,
        comment: impl Into<String>,
    ) -> Result<Committed, LedgerError> {
        self.execute(LedgerCommand::MerchantDebit(MerchantDebitCommand {
            account,
            merchant: merchant.into(),
            amount,
            comment: comment.into(),
        }))
        .await
    }

    pub async fn deposit(
        &self,
        account: AccountId,
        amount: Money,
        comment: impl Into<String>,
    ) -> Result<Committed, LedgerError> {
        self.execute(LedgerCommand::Deposit(DepositCommand {
            account,
            amount,
            comment: comment.into(),
        }))
        .await
    }

    pub async fn withdraw(&self, account: AccountId, amount: Money) -> Result<Committed, LedgerError> {
        self.execute(LedgerCommand::Withdrawal(WithdrawalCommand { account, amount }))
            .await
    }

    /// Run `command` as one atomic unit, retrying on data store conflicts.
    #[instrument(skip(self, command), fields(kind = %command.kind(), amount = %command.amount()), err)]
    pub async fn execute(&self, command: LedgerCommand) -> Result<Committed, LedgerError> {
        command.validate()?;

        let mut attempt = 0u32;
        loop {
            match self.try_execute(&command).await {
                Err(LedgerError::Conflict(reason)) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(attempt, %reason, "ledger conflict, retrying");
                    tokio::task::yield_now().await;
                }
                Ok(committed) => {
                    info!(
                        movement_id = %committed.movement.id(),
                        accounts = committed.accounts.len(),
                        "ledger operation committed"
                    );
                    return Ok(committed);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_execute(&self, command: &LedgerCommand) -> Result<Committed, LedgerError> {
        let unit = self.store.begin(&command.lock_order()).await?;

        // On rejection the unit is dropped here, which rolls it back.
        let posting = decide(
            command,
            unit.accounts(),
            &self.policy,
            MovementId::new(),
            Utc::now(),
        )?;

        let movement = posting.movement.clone();
        let accounts = unit.commit(posting).await?;
        Ok(Committed { accounts, movement })
    }
}
