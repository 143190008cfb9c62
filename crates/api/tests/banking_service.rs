use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use bank_api::dto::{
    DepositRequest, Direction, HistoryQuery, MerchantPaymentRequest, ProfileRequest,
    ProfileUpdate, TransferRequest, WithdrawalRequest,
};
use bank_api::{ApiError, BankingService, CallerContext, FixedRates};
use bank_core::{AccountId, HolderId, Money, PublicAccountId};
use bank_infra::store::in_memory::InMemoryUnit;
use bank_infra::{
    AccountFilter, InMemoryLedgerStore, LedgerEngine, LedgerStore, MovementFilter, MovementPage,
    Pagination, StoreError,
};
use bank_ledger::{Account, AccountStatus, MovementKind};

type Service = BankingService<InMemoryLedgerStore>;

fn service() -> Service {
    BankingService::new(LedgerEngine::new(InMemoryLedgerStore::new()))
}

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

fn admin() -> CallerContext {
    CallerContext::admin(HolderId::new())
}

/// Open, activate and fund an account for a fresh holder.
async fn funded(service: &Service, amount: &str) -> (CallerContext, String) {
    let caller = CallerContext::customer(HolderId::new());
    let view = service.open_account(&caller).await.unwrap();
    service
        .activate(&admin(), &view.number.to_string())
        .await
        .unwrap();
    if amount != "0" {
        service
            .deposit(
                &caller,
                DepositRequest {
                    amount: amount.to_string(),
                    comment: None,
                },
            )
            .await
            .unwrap();
    }
    (caller, view.number.to_string())
}

fn transfer_to(to: &str, amount: &str) -> TransferRequest {
    TransferRequest {
        to: to.to_string(),
        amount: amount.to_string(),
        comment: Some("rent".to_string()),
    }
}

#[tokio::test]
async fn opened_account_starts_inactive_and_empty() {
    let service = service();
    let caller = CallerContext::customer(HolderId::new());

    let view = service.open_account(&caller).await.unwrap();
    assert_eq!(view.balance, Money::ZERO);
    assert_eq!(view.status, AccountStatus::Inactive);
    assert_eq!(service.my_account(&caller).await.unwrap(), view);

    assert_eq!(
        service.open_account(&caller).await.unwrap_err(),
        ApiError::AccountExists
    );
}

#[tokio::test]
async fn caller_without_account_gets_no_account() {
    let service = service();
    let caller = CallerContext::customer(HolderId::new());

    assert_eq!(service.my_account(&caller).await.unwrap_err(), ApiError::NoAccount);
    let err = service
        .withdraw(
            &caller,
            WithdrawalRequest {
                amount: "10".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::NoAccount);
}

#[tokio::test]
async fn transfer_moves_money_and_returns_receipt() {
    let service = service();
    let (alice, _) = funded(&service, "100.00").await;
    let (bob, bob_number) = funded(&service, "0").await;

    let receipt = service
        .transfer(&alice, transfer_to(&bob_number, "30.00"))
        .await
        .unwrap();
    assert_eq!(receipt.account.balance, money("70.00"));
    assert_eq!(receipt.movement.kind, MovementKind::Transfer);
    assert_eq!(receipt.movement.direction, Direction::Out);
    assert_eq!(receipt.movement.counterparty.unwrap().to_string(), bob_number);
    assert_eq!(receipt.movement.comment, "rent");

    assert_eq!(
        service.my_account(&bob).await.unwrap().balance,
        money("30.00")
    );
}

#[tokio::test]
async fn transfer_failures_use_product_messages() {
    let service = service();
    let (alice, alice_number) = funded(&service, "20.00").await;
    let (_, bob_number) = funded(&service, "0").await;

    let err = service
        .transfer(&alice, transfer_to(&bob_number, "20.01"))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Not enough money on balance.");

    let err = service
        .transfer(&alice, transfer_to(&alice_number, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "You can't send money to your own account.");

    let unknown = uuid_string();
    let err = service
        .transfer(&alice, transfer_to(&unknown, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::ReceiverNotFound);
    assert_eq!(err.message(), "Account of receiver does not exist.");

    service.block(&admin(), &bob_number).await.unwrap();
    let err = service
        .transfer(&alice, transfer_to(&bob_number, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Account of receiver is inactive or blocked.");

    assert_eq!(
        service.my_account(&alice).await.unwrap().balance,
        money("20.00")
    );
}

#[tokio::test]
async fn missing_receiver_is_reported_before_funds() {
    let service = service();
    let (alice, _) = funded(&service, "0").await;

    let err = service
        .transfer(&alice, transfer_to(&uuid_string(), "500.00"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::ReceiverNotFound);
}

#[tokio::test]
async fn malformed_input_is_rejected_before_the_ledger() {
    let service = service();
    let (alice, alice_number) = funded(&service, "50.00").await;

    let err = service
        .transfer(&alice, transfer_to("not-a-number", "1.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    let err = service
        .transfer(&alice, transfer_to(&alice_number, "1.001"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidAmount(_)));

    let err = service
        .withdraw(
            &alice,
            WithdrawalRequest {
                amount: "9.99".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_amount");

    let err = service
        .pay_merchant(
            &alice,
            MerchantPaymentRequest {
                merchant: "   ".to_string(),
                amount: "1.00".to_string(),
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn blocked_sender_cannot_debit_but_can_deposit() {
    let service = service();
    let (alice, alice_number) = funded(&service, "50.00").await;
    service.block(&admin(), &alice_number).await.unwrap();

    let err = service
        .pay_merchant(
            &alice,
            MerchantPaymentRequest {
                merchant: "Grocer".to_string(),
                amount: "5.00".to_string(),
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::SenderBlocked);
    assert_eq!(err.status(), 403);

    let receipt = service
        .deposit(
            &alice,
            DepositRequest {
                amount: "10".to_string(),
                comment: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.account.balance, money("60.00"));
}

#[tokio::test]
async fn history_shows_both_sides_newest_first() {
    let service = service();
    let (alice, alice_number) = funded(&service, "100.00").await;
    let (bob, bob_number) = funded(&service, "0").await;

    service
        .transfer(&alice, transfer_to(&bob_number, "25.00"))
        .await
        .unwrap();
    service
        .pay_merchant(
            &alice,
            MerchantPaymentRequest {
                merchant: " Coffee Shop ".to_string(),
                amount: "4.50".to_string(),
                comment: Some("latte".to_string()),
            },
        )
        .await
        .unwrap();

    let page = service
        .history(&alice, HistoryQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert!(!page.has_more);
    let kinds: Vec<_> = page.items.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MovementKind::MerchantDebit,
            MovementKind::Transfer,
            MovementKind::Deposit
        ]
    );
    assert_eq!(page.items[0].merchant.as_deref(), Some("Coffee Shop"));
    assert_eq!(page.items[2].direction, Direction::In);

    let bob_page = service
        .history(
            &bob,
            HistoryQuery {
                kind: Some("transfer".to_string()),
                ..HistoryQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(bob_page.total, 1);
    let incoming = &bob_page.items[0];
    assert_eq!(incoming.direction, Direction::In);
    assert_eq!(incoming.amount, money("25.00"));
    assert_eq!(incoming.counterparty.unwrap().to_string(), alice_number);

    let err = service
        .history(
            &bob,
            HistoryQuery {
                kind: Some("refund".to_string()),
                ..HistoryQuery::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn history_paginates() {
    let service = service();
    let (alice, _) = funded(&service, "100.00").await;
    for _ in 0..4 {
        service
            .withdraw(
                &alice,
                WithdrawalRequest {
                    amount: "10".to_string(),
                },
            )
            .await
            .unwrap();
    }

    let page = service
        .history(
            &alice,
            HistoryQuery {
                kind: None,
                limit: Some(2),
                offset: Some(0),
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);
}

#[tokio::test]
async fn status_changes_require_admin() {
    let service = service();
    let (alice, alice_number) = funded(&service, "0").await;

    assert_eq!(
        service.block(&alice, &alice_number).await.unwrap_err(),
        ApiError::Forbidden
    );
    assert_eq!(
        service
            .list_accounts(&alice, None, Pagination::default())
            .await
            .unwrap_err(),
        ApiError::Forbidden
    );

    let view = service.deactivate(&admin(), &alice_number).await.unwrap();
    assert_eq!(view.status, AccountStatus::Inactive);

    assert_eq!(
        service
            .activate(&admin(), &uuid_string())
            .await
            .unwrap_err(),
        ApiError::AccountNotFound
    );
}

#[tokio::test]
async fn eligible_receivers_exclude_own_and_inactive() {
    let service = service();
    let (alice, alice_number) = funded(&service, "0").await;
    let (_, bob_number) = funded(&service, "0").await;
    let (_, carol_number) = funded(&service, "0").await;
    service.deactivate(&admin(), &carol_number).await.unwrap();

    let receivers: Vec<String> = service
        .eligible_receivers(&alice, Pagination::default())
        .await
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(receivers, vec![bob_number]);
    assert!(!receivers.contains(&alice_number));

    let active = service
        .list_accounts(&admin(), Some(AccountStatus::Active), Pagination::default())
        .await
        .unwrap();
    assert_eq!(active.len(), 2);
}

#[tokio::test]
async fn accounts_with_history_cannot_be_closed() {
    let service = service();
    let (_, alice_number) = funded(&service, "10").await;
    let (bob, bob_number) = funded(&service, "0").await;

    assert_eq!(
        service
            .close_account(&admin(), &alice_number)
            .await
            .unwrap_err(),
        ApiError::AccountReferenced
    );

    service.close_account(&admin(), &bob_number).await.unwrap();
    assert_eq!(service.my_account(&bob).await.unwrap_err(), ApiError::NoAccount);
}

#[tokio::test]
async fn balance_can_be_shown_in_other_currency() {
    let rates = FixedRates::new([("USD".to_string(), "40".parse::<Decimal>().unwrap())]);
    let service = service().with_rates(Arc::new(rates));
    let (alice, _) = funded(&service, "100.00").await;

    let converted = service.balance_in(&alice, "usd").await.unwrap();
    assert_eq!(converted.currency, "USD");
    assert_eq!(converted.amount, "2.50".parse::<Decimal>().unwrap());

    let err = service.balance_in(&alice, "EUR").await.unwrap_err();
    assert_eq!(err, ApiError::RateUnavailable("EUR".to_string()));
    assert_eq!(err.status(), 503);
}

#[tokio::test]
async fn balance_conversion_needs_a_rate_source() {
    let service = service();
    let (alice, _) = funded(&service, "10").await;

    assert!(matches!(
        service.balance_in(&alice, "USD").await,
        Err(ApiError::RateUnavailable(_))
    ));
}

fn profile_request() -> ProfileRequest {
    ProfileRequest {
        birthday: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap(),
        address: "New York".to_string(),
        passport: "OP2345TY".to_string(),
        phone_number: "+380645789165".to_string(),
    }
}

#[tokio::test]
async fn customer_profile_is_created_once() {
    let service = service();
    let caller = CallerContext::customer(HolderId::new());

    assert_eq!(service.my_profile(&caller).await.unwrap_err(), ApiError::NoProfile);

    let created = service.create_profile(&caller, profile_request()).await.unwrap();
    assert_eq!(created.address, "New York");
    assert_eq!(service.my_profile(&caller).await.unwrap(), created);

    assert_eq!(
        service
            .create_profile(&caller, profile_request())
            .await
            .unwrap_err(),
        ApiError::ProfileExists
    );
}

#[tokio::test]
async fn profile_fields_are_validated() {
    let service = service();
    let caller = CallerContext::customer(HolderId::new());

    let mut long_address = profile_request();
    long_address.address = "a".repeat(256);
    let mut long_passport = profile_request();
    long_passport.passport = "P".repeat(21);
    let mut bad_phone = profile_request();
    bad_phone.phone_number = "+38064578916".to_string();

    for request in [long_address, long_passport, bad_phone] {
        let err = service.create_profile(&caller, request).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)), "{err:?}");
        assert_eq!(err.status(), 400);
    }
    assert_eq!(service.my_profile(&caller).await.unwrap_err(), ApiError::NoProfile);
}

#[tokio::test]
async fn profile_update_changes_only_given_fields() {
    let service = service();
    let caller = CallerContext::customer(HolderId::new());

    let missing = service
        .update_profile(&caller, ProfileUpdate::default())
        .await
        .unwrap_err();
    assert_eq!(missing, ApiError::NoProfile);

    let created = service.create_profile(&caller, profile_request()).await.unwrap();
    let updated = service
        .update_profile(
            &caller,
            ProfileUpdate {
                address: Some("Caroline".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.address, "Caroline");
    assert_eq!(updated.passport, created.passport);
    assert_eq!(updated.uid, created.uid);

    let rejected = service
        .update_profile(
            &caller,
            ProfileUpdate {
                phone_number: Some("12345".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(rejected, ApiError::InvalidRequest(_)));
    assert_eq!(service.my_profile(&caller).await.unwrap(), updated);
}

#[tokio::test]
async fn profiles_are_private_to_their_holder() {
    let service = service();
    let alice = CallerContext::customer(HolderId::new());
    let bob = CallerContext::customer(HolderId::new());

    service.create_profile(&alice, profile_request()).await.unwrap();
    assert_eq!(service.my_profile(&bob).await.unwrap_err(), ApiError::NoProfile);
    service.create_profile(&bob, profile_request()).await.unwrap();
}

fn uuid_string() -> String {
    HolderId::new().to_string()
}

/// Shares data with an in-memory store but fails every lookup by internal id.
struct BrokenLookups {
    inner: InMemoryLedgerStore,
}

#[async_trait]
impl LedgerStore for BrokenLookups {
    type Unit = InMemoryUnit;

    async fn create_account(&self, holder: HolderId) -> Result<Account, StoreError> {
        self.inner.create_account(holder).await
    }

    async fn get_account(&self, _id: AccountId) -> Result<Option<Account>, StoreError> {
        Err(StoreError::Backend("read replica down".to_string()))
    }

    async fn find_by_public_id(
        &self,
        public_id: PublicAccountId,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.find_by_public_id(public_id).await
    }

    async fn find_by_holder(&self, holder: HolderId) -> Result<Option<Account>, StoreError> {
        self.inner.find_by_holder(holder).await
    }

    async fn list_accounts(
        &self,
        filter: AccountFilter,
        pagination: Pagination,
    ) -> Result<Vec<Account>, StoreError> {
        self.inner.list_accounts(filter, pagination).await
    }

    async fn set_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, StoreError> {
        self.inner.set_status(id, status).await
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        self.inner.delete_account(id).await
    }

    async fn begin(&self, ids: &[AccountId]) -> Result<InMemoryUnit, StoreError> {
        self.inner.begin(ids).await
    }

    async fn movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        self.inner.movements(filter, pagination).await
    }
}

#[tokio::test]
async fn committed_transfer_is_reported_even_when_lookups_fail() {
    let store = InMemoryLedgerStore::new();
    let setup = BankingService::new(LedgerEngine::new(store.clone()));
    let (alice, _) = funded(&setup, "300.00").await;
    let (bob, bob_number) = funded(&setup, "0").await;

    let broken = BankingService::new(LedgerEngine::new(BrokenLookups { inner: store }));
    let receipt = broken
        .transfer(&alice, transfer_to(&bob_number, "100.00"))
        .await
        .unwrap();
    assert_eq!(receipt.account.balance, money("200.00"));
    assert_eq!(receipt.movement.counterparty.unwrap().to_string(), bob_number);

    let receipt = broken
        .withdraw(
            &alice,
            WithdrawalRequest {
                amount: "50".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.account.balance, money("150.00"));

    assert_eq!(setup.my_account(&alice).await.unwrap().balance, money("150.00"));
    assert_eq!(setup.my_account(&bob).await.unwrap().balance, money("100.00"));
}
