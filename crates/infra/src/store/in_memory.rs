use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use bank_core::{AccountId, HolderId, PublicAccountId};
use bank_ledger::{Account, AccountSet, AccountStatus, CustomerProfile, Movement, Posting};

use crate::error::StoreError;
use crate::store::query::{AccountFilter, MovementFilter, MovementPage, Pagination};
use crate::store::r#trait::{CustomerStore, LedgerStore, UnitOfWork};

type Row = Arc<Mutex<Account>>;

#[derive(Debug, Default)]
struct AccountTable {
    rows: HashMap<AccountId, Row>,
    by_public_id: HashMap<PublicAccountId, AccountId>,
    by_holder: HashMap<HolderId, AccountId>,
}

impl AccountTable {
    fn insert(&mut self, account: Account) -> Result<(), StoreError> {
        if self.by_holder.contains_key(&account.holder_id()) {
            return Err(StoreError::HolderHasAccount(account.holder_id()));
        }
        if self.rows.contains_key(&account.id())
            || self.by_public_id.contains_key(&account.public_id())
        {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id()
            )));
        }

        self.by_public_id.insert(account.public_id(), account.id());
        self.by_holder.insert(account.holder_id(), account.id());
        self.rows.insert(account.id(), Arc::new(Mutex::new(account)));
        Ok(())
    }

    /// Whether `row` is still the live row for `id` (not deleted meanwhile).
    fn is_current(&self, id: AccountId, row: &Row) -> bool {
        self.rows.get(&id).is_some_and(|live| Arc::ptr_eq(live, row))
    }
}

/// In-memory account store and movement log.
///
/// Every account sits behind its own async mutex; a [`InMemoryUnit`] owns the
/// mutex guards of the accounts it touches until it commits or is dropped.
/// Intended for tests/dev.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    accounts: Arc<RwLock<AccountTable>>,
    movements: Arc<RwLock<Vec<Movement>>>,
    profiles: Arc<RwLock<HashMap<HolderId, CustomerProfile>>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an already existing account, balance and status included.
    pub fn seed(&self, account: Account) -> Result<(), StoreError> {
        self.accounts.write().map_err(poisoned)?.insert(account)
    }

    fn row(&self, id: AccountId) -> Result<Option<Row>, StoreError> {
        Ok(self.accounts.read().map_err(poisoned)?.rows.get(&id).cloned())
    }

    async fn read_row(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        match self.row(id)? {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    fn references(&self, id: AccountId) -> Result<bool, StoreError> {
        let log = self.movements.read().map_err(poisoned)?;
        Ok(log.iter().any(|m| m.involves(id)))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Unit = InMemoryUnit;

    async fn create_account(&self, holder: HolderId) -> Result<Account, StoreError> {
        let account = Account::open(holder, Utc::now());
        self.accounts
            .write()
            .map_err(poisoned)?
            .insert(account.clone())?;
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.read_row(id).await
    }

    async fn find_by_public_id(
        &self,
        public_id: PublicAccountId,
    ) -> Result<Option<Account>, StoreError> {
        let id = self
            .accounts
            .read()
            .map_err(poisoned)?
            .by_public_id
            .get(&public_id)
            .copied();
        match id {
            Some(id) => self.read_row(id).await,
            None => Ok(None),
        }
    }

    async fn find_by_holder(&self, holder: HolderId) -> Result<Option<Account>, StoreError> {
        let id = self
            .accounts
            .read()
            .map_err(poisoned)?
            .by_holder
            .get(&holder)
            .copied();
        match id {
            Some(id) => self.read_row(id).await,
            None => Ok(None),
        }
    }

    async fn list_accounts(
        &self,
        filter: AccountFilter,
        pagination: Pagination,
    ) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<Row> = self
            .accounts
            .read()
            .map_err(poisoned)?
            .rows
            .values()
            .cloned()
            .collect();

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let account = row.lock().await.clone();
            if filter.status.is_none_or(|status| account.status() == status) {
                accounts.push(account);
            }
        }
        accounts.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });

        Ok(pagination.window(&accounts))
    }

    async fn set_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, StoreError> {
        let row = self.row(id)?.ok_or(StoreError::AccountNotFound(id))?;
        let mut account = row.lock().await;
        if !self.accounts.read().map_err(poisoned)?.is_current(id, &row) {
            return Err(StoreError::AccountNotFound(id));
        }
        account.set_status(status);
        Ok(account.clone())
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        let row = self.row(id)?.ok_or(StoreError::AccountNotFound(id))?;
        let account = row.lock().await;

        if self.references(id)? {
            return Err(StoreError::AccountReferenced(id));
        }

        let mut table = self.accounts.write().map_err(poisoned)?;
        if !table.is_current(id, &row) {
            return Err(StoreError::AccountNotFound(id));
        }
        table.rows.remove(&id);
        table.by_public_id.remove(&account.public_id());
        table.by_holder.remove(&account.holder_id());
        Ok(())
    }

    async fn begin(&self, ids: &[AccountId]) -> Result<InMemoryUnit, StoreError> {
        let mut ordered = ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for id in ordered {
            let Some(row) = self.row(id)? else {
                continue;
            };
            let guard = row.clone().lock_owned().await;
            if self.accounts.read().map_err(poisoned)?.is_current(id, &row) {
                guards.push(guard);
            }
        }

        let snapshot = AccountSet::new(guards.iter().map(|g| (**g).clone()));
        Ok(InMemoryUnit {
            guards,
            snapshot,
            movements: Arc::clone(&self.movements),
        })
    }

    async fn movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let log = self.movements.read().map_err(poisoned)?;

        // Later appends first, so equal timestamps still read newest first.
        let mut matching: Vec<Movement> =
            log.iter().rev().filter(|m| filter.matches(m)).cloned().collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let total = matching.len() as u64;
        Ok(MovementPage::new(pagination.window(&matching), total, pagination))
    }
}

#[async_trait]
impl CustomerStore for InMemoryLedgerStore {
    async fn create_profile(&self, profile: CustomerProfile) -> Result<CustomerProfile, StoreError> {
        let mut profiles = self.profiles.write().map_err(poisoned)?;
        if profiles.contains_key(&profile.holder_id()) {
            return Err(StoreError::HolderHasProfile(profile.holder_id()));
        }
        profiles.insert(profile.holder_id(), profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, holder: HolderId) -> Result<Option<CustomerProfile>, StoreError> {
        Ok(self.profiles.read().map_err(poisoned)?.get(&holder).cloned())
    }

    async fn update_profile(
        &self,
        profile: CustomerProfile,
    ) -> Result<CustomerProfile, StoreError> {
        let mut profiles = self.profiles.write().map_err(poisoned)?;
        let stored = profiles
            .get_mut(&profile.holder_id())
            .ok_or(StoreError::ProfileNotFound(profile.holder_id()))?;
        let kept = CustomerProfile::restore(
            stored.uid(),
            stored.holder_id(),
            profile.details(),
            stored.created_at(),
        );
        *stored = kept.clone();
        Ok(kept)
    }
}

/// Atomic unit over the in-memory store. Holds the account locks.
#[derive(Debug)]
pub struct InMemoryUnit {
    guards: Vec<OwnedMutexGuard<Account>>,
    snapshot: AccountSet,
    movements: Arc<RwLock<Vec<Movement>>>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    fn accounts(&self) -> &AccountSet {
        &self.snapshot
    }

    async fn commit(mut self, posting: Posting) -> Result<Vec<Account>, StoreError> {
        let mut log = self.movements.write().map_err(poisoned)?;

        // Check everything before writing anything.
        for update in &posting.updates {
            let guard = self
                .guards
                .iter()
                .find(|g| g.id() == update.account)
                .ok_or_else(|| {
                    StoreError::Backend(format!(
                        "account {} is not locked by this unit",
                        update.account
                    ))
                })?;
            if guard.balance() != update.before {
                return Err(StoreError::Conflict(format!(
                    "balance of account {} changed under the lock",
                    update.account
                )));
            }
        }
        if log.iter().any(|m| m.id() == posting.movement.id()) {
            return Err(StoreError::Conflict(format!(
                "movement {} already recorded",
                posting.movement.id()
            )));
        }

        let mut updated = Vec::with_capacity(posting.updates.len());
        for guard in self.guards.iter_mut() {
            if posting.apply_to(guard) {
                updated.push((**guard).clone());
            }
        }
        log.push(posting.movement);

        Ok(updated)
    }
}
