use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bank_core::{CustomerId, Money, MovementId, PublicAccountId};
use bank_infra::Pagination;
use bank_ledger::{
    Account, AccountStatus, CustomerProfile, MovementKind, ProfileChanges, ProfileDetails,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    /// Public account number of the receiver.
    pub to: String,
    pub amount: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantPaymentRequest {
    pub merchant: String,
    pub amount: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// One of `transfer`, `merchant_debit`, `deposit`, `withdrawal`.
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRequest {
    pub birthday: NaiveDate,
    pub address: String,
    pub passport: String,
    pub phone_number: String,
}

impl From<ProfileRequest> for ProfileDetails {
    fn from(request: ProfileRequest) -> Self {
        Self {
            birthday: request.birthday,
            address: request.address,
            passport: request.passport,
            phone_number: request.phone_number,
        }
    }
}

/// Partial profile update; omitted fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub birthday: Option<NaiveDate>,
    pub address: Option<String>,
    pub passport: Option<String>,
    pub phone_number: Option<String>,
}

impl From<ProfileUpdate> for ProfileChanges {
    fn from(update: ProfileUpdate) -> Self {
        Self {
            birthday: update.birthday,
            address: update.address,
            passport: update.passport,
            phone_number: update.phone_number,
        }
    }
}

// -------------------------
// Views
// -------------------------

/// An account as its holder (or an admin) sees it. Internal ids stay hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    pub number: PublicAccountId,
    pub balance: Money,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            number: account.public_id(),
            balance: account.balance(),
            status: account.status(),
            created_at: account.created_at(),
        }
    }
}

/// Money flow relative to the viewing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// One movement record from the viewing account's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementView {
    pub id: MovementId,
    pub kind: MovementKind,
    pub direction: Direction,
    pub amount: Money,
    /// Other account of a transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<PublicAccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub items: Vec<MovementView>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Outcome of a balance-changing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub movement: MovementView,
    /// The caller's account after the operation.
    pub account: AccountView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    pub uid: CustomerId,
    pub birthday: NaiveDate,
    pub address: String,
    pub passport: String,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

impl From<&CustomerProfile> for ProfileView {
    fn from(profile: &CustomerProfile) -> Self {
        Self {
            uid: profile.uid(),
            birthday: profile.birthday(),
            address: profile.address().to_string(),
            passport: profile.passport().to_string(),
            phone_number: profile.phone_number().to_string(),
            created_at: profile.created_at(),
        }
    }
}
