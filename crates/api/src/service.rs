//! Caller-scoped banking operations on top of the ledger engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use bank_core::{AccountId, PublicAccountId};
use bank_infra::{
    AccountFilter, Committed, CustomerStore, LedgerEngine, LedgerStore, MovementFilter,
    Pagination,
};
use bank_ledger::{
    Account, AccountStatus, CustomerProfile, Movement, MovementKind, ProfileChanges,
};

use crate::context::CallerContext;
use crate::dto::{
    AccountView, DepositRequest, Direction, HistoryPage, HistoryQuery, MerchantPaymentRequest,
    MovementView, ProfileRequest, ProfileUpdate, ProfileView, Receipt, TransferRequest,
    WithdrawalRequest,
};
use crate::errors::ApiError;
use crate::rates::{ConvertedBalance, RateError, RateLookup};
use crate::validate;

/// Entry point for every caller-facing surface.
///
/// Resolves the caller's own account from its holder id, validates request
/// fields, resolves receivers by public account number and hands the rest to
/// the [`LedgerEngine`].
pub struct BankingService<S> {
    engine: LedgerEngine<S>,
    rates: Option<Arc<dyn RateLookup>>,
}

impl<S> BankingService<S> {
    pub fn new(engine: LedgerEngine<S>) -> Self {
        Self {
            engine,
            rates: None,
        }
    }

    pub fn with_rates(mut self, rates: Arc<dyn RateLookup>) -> Self {
        self.rates = Some(rates);
        self
    }

    pub fn engine(&self) -> &LedgerEngine<S> {
        &self.engine
    }
}

impl<S: LedgerStore> BankingService<S> {
    async fn own_account(&self, caller: &CallerContext) -> Result<Account, ApiError> {
        self.engine
            .store()
            .find_by_holder(caller.holder_id())
            .await?
            .ok_or(ApiError::NoAccount)
    }

    async fn account_by_number(&self, number: &str) -> Result<Account, ApiError> {
        let number = validate::parse_public_id(number)?;
        self.engine
            .store()
            .find_by_public_id(number)
            .await?
            .ok_or(ApiError::AccountNotFound)
    }

    /// Number of the other account of a transfer, looked up once per call.
    async fn counterparty_number(
        &self,
        viewer: AccountId,
        movement: &Movement,
        numbers: &mut HashMap<AccountId, Option<PublicAccountId>>,
    ) -> Result<Option<PublicAccountId>, ApiError> {
        let Some(other) = counterparty_of(viewer, movement) else {
            return Ok(None);
        };
        if let Some(number) = numbers.get(&other) {
            return Ok(*number);
        }
        let number = self
            .engine
            .store()
            .get_account(other)
            .await?
            .map(|a| a.public_id());
        numbers.insert(other, number);
        Ok(number)
    }

    /// Open the caller's account: zero balance, inactive until an admin
    /// activates it.
    #[instrument(skip(self, caller), fields(holder_id = %caller.holder_id()), err)]
    pub async fn open_account(&self, caller: &CallerContext) -> Result<AccountView, ApiError> {
        let account = self.engine.store().create_account(caller.holder_id()).await?;
        info!(account = %account, "account opened");
        Ok(AccountView::from(&account))
    }

    pub async fn my_account(&self, caller: &CallerContext) -> Result<AccountView, ApiError> {
        Ok(AccountView::from(&self.own_account(caller).await?))
    }

    /// Send money from the caller's account to the account numbered `request.to`.
    #[instrument(skip(self, caller, request), fields(holder_id = %caller.holder_id()), err)]
    pub async fn transfer(
        &self,
        caller: &CallerContext,
        request: TransferRequest,
    ) -> Result<Receipt, ApiError> {
        let amount = validate::parse_amount(&request.amount, MovementKind::Transfer)?;
        let comment = validate::comment(request.comment.as_deref())?;
        let to = validate::parse_public_id(&request.to)?;

        let sender = self.own_account(caller).await?;
        let receiver = self
            .engine
            .store()
            .find_by_public_id(to)
            .await?
            .ok_or(ApiError::ReceiverNotFound)?;

        let committed = self
            .engine
            .transfer(sender.id(), receiver.id(), amount, comment)
            .await?;
        Ok(receipt(&sender, &committed, Some(receiver.public_id())))
    }

    #[instrument(skip(self, caller, request), fields(holder_id = %caller.holder_id()), err)]
    pub async fn pay_merchant(
        &self,
        caller: &CallerContext,
        request: MerchantPaymentRequest,
    ) -> Result<Receipt, ApiError> {
        let amount = validate::parse_amount(&request.amount, MovementKind::MerchantDebit)?;
        let merchant = validate::merchant(&request.merchant)?;
        let comment = validate::comment(request.comment.as_deref())?;

        let account = self.own_account(caller).await?;
        let committed = self
            .engine
            .merchant_debit(account.id(), merchant, amount, comment)
            .await?;
        Ok(receipt(&account, &committed, None))
    }

    #[instrument(skip(self, caller, request), fields(holder_id = %caller.holder_id()), err)]
    pub async fn deposit(
        &self,
        caller: &CallerContext,
        request: DepositRequest,
    ) -> Result<Receipt, ApiError> {
        let amount = validate::parse_amount(&request.amount, MovementKind::Deposit)?;
        let comment = validate::comment(request.comment.as_deref())?;

        let account = self.own_account(caller).await?;
        let committed = self.engine.deposit(account.id(), amount, comment).await?;
        Ok(receipt(&account, &committed, None))
    }

    #[instrument(skip(self, caller, request), fields(holder_id = %caller.holder_id()), err)]
    pub async fn withdraw(
        &self,
        caller: &CallerContext,
        request: WithdrawalRequest,
    ) -> Result<Receipt, ApiError> {
        let amount = validate::parse_amount(&request.amount, MovementKind::Withdrawal)?;

        let account = self.own_account(caller).await?;
        let committed = self.engine.withdraw(account.id(), amount).await?;
        Ok(receipt(&account, &committed, None))
    }

    /// The caller's movement records, newest first.
    pub async fn history(
        &self,
        caller: &CallerContext,
        query: HistoryQuery,
    ) -> Result<HistoryPage, ApiError> {
        let kind = query
            .kind
            .as_deref()
            .map(parse_kind)
            .transpose()?;
        let account = self.own_account(caller).await?;

        let page = self
            .engine
            .store()
            .movements(
                MovementFilter {
                    account: Some(account.id()),
                    kind,
                },
                Pagination::new(query.limit, query.offset),
            )
            .await?;

        let mut numbers = HashMap::new();
        let mut items = Vec::with_capacity(page.movements.len());
        for movement in &page.movements {
            let counterparty = self
                .counterparty_number(account.id(), movement, &mut numbers)
                .await?;
            items.push(movement_view(account.id(), movement, counterparty));
        }

        Ok(HistoryPage {
            items,
            total: page.total,
            pagination: page.pagination,
            has_more: page.has_more,
        })
    }

    /// Public numbers of accounts that can currently receive transfers,
    /// excluding the caller's own.
    pub async fn eligible_receivers(
        &self,
        caller: &CallerContext,
        pagination: Pagination,
    ) -> Result<Vec<PublicAccountId>, ApiError> {
        let own = self
            .engine
            .store()
            .find_by_holder(caller.holder_id())
            .await?
            .map(|a| a.id());
        let accounts = self
            .engine
            .store()
            .list_accounts(AccountFilter::active(), pagination)
            .await?;
        Ok(accounts
            .iter()
            .filter(|a| Some(a.id()) != own)
            .map(|a| a.public_id())
            .collect())
    }

    /// The caller's balance shown in `currency`. Needs a configured rate source.
    pub async fn balance_in(
        &self,
        caller: &CallerContext,
        currency: &str,
    ) -> Result<ConvertedBalance, ApiError> {
        let code = currency.trim().to_uppercase();
        let rates = self
            .rates
            .as_ref()
            .ok_or_else(|| ApiError::RateUnavailable(code.clone()))?;
        let account = self.own_account(caller).await?;

        let rate = rates.rate(&code).await.map_err(|e| match e {
            RateError::Unknown(code) => ApiError::RateUnavailable(code),
            RateError::Source(msg) => {
                warn!(error = %msg, "rate lookup failed");
                ApiError::RateUnavailable(code.clone())
            }
        })?;
        ConvertedBalance::convert(account.balance(), &code, rate)
            .map_err(|_| ApiError::RateUnavailable(code.clone()))
    }

    fn require_admin(caller: &CallerContext) -> Result<(), ApiError> {
        if caller.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Change the status of the account numbered `number`. Admin only.
    #[instrument(skip(self, caller), fields(admin = %caller.holder_id()), err)]
    pub async fn set_status(
        &self,
        caller: &CallerContext,
        number: &str,
        status: AccountStatus,
    ) -> Result<AccountView, ApiError> {
        Self::require_admin(caller)?;
        let account = self.account_by_number(number).await?;
        let updated = self.engine.store().set_status(account.id(), status).await?;
        info!(account = %updated, "account status changed");
        Ok(AccountView::from(&updated))
    }

    pub async fn activate(
        &self,
        caller: &CallerContext,
        number: &str,
    ) -> Result<AccountView, ApiError> {
        self.set_status(caller, number, AccountStatus::Active).await
    }

    pub async fn deactivate(
        &self,
        caller: &CallerContext,
        number: &str,
    ) -> Result<AccountView, ApiError> {
        self.set_status(caller, number, AccountStatus::Inactive).await
    }

    pub async fn block(&self, caller: &CallerContext, number: &str) -> Result<AccountView, ApiError> {
        self.set_status(caller, number, AccountStatus::Blocked).await
    }

    /// All accounts, optionally by status, newest first. Admin only.
    pub async fn list_accounts(
        &self,
        caller: &CallerContext,
        status: Option<AccountStatus>,
        pagination: Pagination,
    ) -> Result<Vec<AccountView>, ApiError> {
        Self::require_admin(caller)?;
        let accounts = self
            .engine
            .store()
            .list_accounts(AccountFilter { status }, pagination)
            .await?;
        Ok(accounts.iter().map(AccountView::from).collect())
    }

    /// Remove an account without history. Admin only.
    #[instrument(skip(self, caller), fields(admin = %caller.holder_id()), err)]
    pub async fn close_account(&self, caller: &CallerContext, number: &str) -> Result<(), ApiError> {
        Self::require_admin(caller)?;
        let account = self.account_by_number(number).await?;
        self.engine.store().delete_account(account.id()).await?;
        info!(number = %account.public_id(), "account closed");
        Ok(())
    }
}

impl<S: CustomerStore> BankingService<S> {
    /// Store the caller's customer profile. One per holder.
    #[instrument(skip(self, caller, request), fields(holder_id = %caller.holder_id()), err)]
    pub async fn create_profile(
        &self,
        caller: &CallerContext,
        request: ProfileRequest,
    ) -> Result<ProfileView, ApiError> {
        let profile = CustomerProfile::create(caller.holder_id(), request.into(), Utc::now())?;
        let profile = self.engine.store().create_profile(profile).await?;
        info!(customer = %profile.uid(), "customer profile created");
        Ok(ProfileView::from(&profile))
    }

    pub async fn my_profile(&self, caller: &CallerContext) -> Result<ProfileView, ApiError> {
        let profile = self
            .engine
            .store()
            .get_profile(caller.holder_id())
            .await?
            .ok_or(ApiError::NoProfile)?;
        Ok(ProfileView::from(&profile))
    }

    /// Change some fields of the caller's profile.
    #[instrument(skip(self, caller, request), fields(holder_id = %caller.holder_id()), err)]
    pub async fn update_profile(
        &self,
        caller: &CallerContext,
        request: ProfileUpdate,
    ) -> Result<ProfileView, ApiError> {
        let changes = ProfileChanges::from(request);
        let mut profile = self
            .engine
            .store()
            .get_profile(caller.holder_id())
            .await?
            .ok_or(ApiError::NoProfile)?;
        if changes.is_empty() {
            return Ok(ProfileView::from(&profile));
        }

        profile.apply(changes)?;
        let profile = self.engine.store().update_profile(profile).await?;
        info!(customer = %profile.uid(), "customer profile updated");
        Ok(ProfileView::from(&profile))
    }
}

/// Receipt for a committed operation. Built from what the commit returned
/// only, so it cannot fail once money has moved.
fn receipt(
    own: &Account,
    committed: &Committed,
    counterparty: Option<PublicAccountId>,
) -> Receipt {
    let account = match committed.account(own.id()) {
        Some(account) => account.clone(),
        None => {
            warn!(account = %own.id(), "committed posting did not return the caller's account");
            own.clone()
        }
    };
    Receipt {
        movement: movement_view(own.id(), &committed.movement, counterparty),
        account: AccountView::from(&account),
    }
}

/// The other account of a transfer, seen from `viewer`.
fn counterparty_of(viewer: AccountId, movement: &Movement) -> Option<AccountId> {
    match movement {
        Movement::Transfer(r) if r.source == viewer => Some(r.destination),
        Movement::Transfer(r) => Some(r.source),
        _ => None,
    }
}

fn movement_view(
    viewer: AccountId,
    movement: &Movement,
    counterparty: Option<PublicAccountId>,
) -> MovementView {
    let (direction, merchant, comment) = match movement {
        Movement::Transfer(r) if r.source == viewer => (Direction::Out, None, r.comment.clone()),
        Movement::Transfer(r) => (Direction::In, None, r.comment.clone()),
        Movement::MerchantDebit(r) => (Direction::Out, Some(r.merchant.clone()), r.comment.clone()),
        Movement::Deposit(r) => (Direction::In, None, r.comment.clone()),
        Movement::Withdrawal(_) => (Direction::Out, None, String::new()),
    };

    MovementView {
        id: movement.id(),
        kind: movement.kind(),
        direction,
        amount: movement.amount(),
        counterparty,
        merchant,
        comment,
        created_at: movement.created_at(),
    }
}

fn parse_kind(raw: &str) -> Result<MovementKind, ApiError> {
    let kind = match raw.trim().to_lowercase().as_str() {
        "transfer" => MovementKind::Transfer,
        "merchant_debit" => MovementKind::MerchantDebit,
        "deposit" => MovementKind::Deposit,
        "withdrawal" => MovementKind::Withdrawal,
        other => {
            return Err(ApiError::InvalidRequest(format!(
                "Unknown movement kind '{other}'."
            )));
        }
    };
    Ok(kind)
}
