use std::sync::Arc;

use async_trait::async_trait;

use bank_core::{AccountId, HolderId, PublicAccountId};
use bank_ledger::{Account, AccountSet, AccountStatus, CustomerProfile, Posting};

use crate::error::StoreError;
use crate::store::query::{AccountFilter, MovementFilter, MovementPage, Pagination};

/// Persistent accounts plus the append-only movement log.
///
/// Balances are never written directly through this trait: they change only
/// when a [`UnitOfWork`] obtained from [`LedgerStore::begin`] commits a
/// [`Posting`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Unit: UnitOfWork;

    /// Open a new account for `holder`: zero balance, inactive.
    ///
    /// A holder owns at most one account.
    async fn create_account(&self, holder: HolderId) -> Result<Account, StoreError>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_by_public_id(
        &self,
        public_id: PublicAccountId,
    ) -> Result<Option<Account>, StoreError>;

    async fn find_by_holder(&self, holder: HolderId) -> Result<Option<Account>, StoreError>;

    /// Accounts matching `filter`, newest first.
    async fn list_accounts(
        &self,
        filter: AccountFilter,
        pagination: Pagination,
    ) -> Result<Vec<Account>, StoreError>;

    /// Change an account's status. Waits for any in-flight posting on the
    /// account and never touches the balance.
    async fn set_status(&self, id: AccountId, status: AccountStatus)
    -> Result<Account, StoreError>;

    /// Remove an account that no movement record references.
    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError>;

    /// Start an atomic unit holding exclusive locks on `ids`.
    ///
    /// Locks are taken in ascending id order whatever order `ids` is given in.
    /// Ids with no matching account are left out of [`UnitOfWork::accounts`].
    async fn begin(&self, ids: &[AccountId]) -> Result<Self::Unit, StoreError>;

    /// Movement records matching `filter`, ordered by `created_at` descending.
    async fn movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;
}

/// One atomic ledger mutation in progress.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] rolls it back and
/// releases its locks.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Snapshots of the locked accounts as read under the lock.
    fn accounts(&self) -> &AccountSet;

    /// Write every balance in `posting`, append its movement record and
    /// release the locks. All or nothing.
    ///
    /// Returns the updated accounts.
    async fn commit(self, posting: Posting) -> Result<Vec<Account>, StoreError>;
}

/// Customer profiles, one per holder.
///
/// Kept apart from [`LedgerStore`]: profiles never take part in a posting.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Store a new profile. Fails with [`StoreError::HolderHasProfile`] when
    /// the holder already has one.
    async fn create_profile(&self, profile: CustomerProfile) -> Result<CustomerProfile, StoreError>;

    async fn get_profile(&self, holder: HolderId) -> Result<Option<CustomerProfile>, StoreError>;

    /// Overwrite the holder's profile fields. `uid` and `created_at` are kept.
    async fn update_profile(&self, profile: CustomerProfile)
    -> Result<CustomerProfile, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore,
{
    type Unit = S::Unit;

    async fn create_account(&self, holder: HolderId) -> Result<Account, StoreError> {
        (**self).create_account(holder).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).get_account(id).await
    }

    async fn find_by_public_id(
        &self,
        public_id: PublicAccountId,
    ) -> Result<Option<Account>, StoreError> {
        (**self).find_by_public_id(public_id).await
    }

    async fn find_by_holder(&self, holder: HolderId) -> Result<Option<Account>, StoreError> {
        (**self).find_by_holder(holder).await
    }

    async fn list_accounts(
        &self,
        filter: AccountFilter,
        pagination: Pagination,
    ) -> Result<Vec<Account>, StoreError> {
        (**self).list_accounts(filter, pagination).await
    }

    async fn set_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, StoreError> {
        (**self).set_status(id, status).await
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        (**self).delete_account(id).await
    }

    async fn begin(&self, ids: &[AccountId]) -> Result<Self::Unit, StoreError> {
        (**self).begin(ids).await
    }

    async fn movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).movements(filter, pagination).await
    }
}

#[async_trait]
impl<S> CustomerStore for Arc<S>
where
    S: CustomerStore,
{
    async fn create_profile(&self, profile: CustomerProfile) -> Result<CustomerProfile, StoreError> {
        (**self).create_profile(profile).await
    }

    async fn get_profile(&self, holder: HolderId) -> Result<Option<CustomerProfile>, StoreError> {
        (**self).get_profile(holder).await
    }

    async fn update_profile(
        &self,
        profile: CustomerProfile,
    ) -> Result<CustomerProfile, StoreError> {
        (**self).update_profile(profile).await
    }
}
