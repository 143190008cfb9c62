//! Postgres-backed account store and movement log.
//!
//! ## Locking
//!
//! [`PostgresLedgerStore::begin`] opens a transaction and runs
//! `SELECT ... WHERE id = ANY($1) ORDER BY id FOR UPDATE`, so row locks are
//! always taken in ascending id order. Balance writes in
//! [`PostgresUnit::commit`] are additionally guarded by the balance read under
//! the lock.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `40001` | `Conflict` | Serialization failure |
//! | `40P01` | `Conflict` | Deadlock detected |
//! | `55P03` | `Conflict` | Lock not available |
//! | `57014` | `Conflict` | Statement timeout while waiting for a lock |
//! | `23505` | `Conflict` / `HolderHasAccount` / `HolderHasProfile` | Unique violation |
//! | `23503` | `AccountReferenced` (delete) / `Backend` | Foreign key violation |
//! | Any other | `Backend` | Check violations, network errors, pool closed |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use bank_core::{AccountId, CustomerId, HolderId, Money, MovementId, PublicAccountId};
use bank_ledger::{
    Account, AccountSet, AccountStatus, CustomerProfile, DepositRecord, MerchantDebitRecord,
    Movement, MovementKind, Posting, ProfileDetails, TransferRecord, WithdrawalRecord,
};

use crate::config::LedgerConfig;
use crate::error::StoreError;
use crate::store::query::{AccountFilter, MovementFilter, MovementPage, Pagination};
use crate::store::r#trait::{CustomerStore, LedgerStore, UnitOfWork};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

const ACCOUNT_COLUMNS: &str = "id, public_id, holder_id, balance, status, created_at";

const PROFILE_COLUMNS: &str =
    "uid, holder_id, birthday, address, passport, phone_number, created_at";

/// Every movement table folded into one shape.
const MOVEMENTS_CTE: &str = r#"
    WITH movements AS (
        SELECT 'transfer'::text AS kind, id, source_id AS account_id,
               destination_id, NULL::text AS merchant, amount, comment, created_at
        FROM transfers
        UNION ALL
        SELECT 'merchant_debit'::text, id, account_id,
               NULL::uuid, merchant::text, amount, comment, created_at
        FROM merchant_debits
        UNION ALL
        SELECT 'deposit'::text, id, account_id,
               NULL::uuid, NULL::text, amount, comment, created_at
        FROM deposits
        UNION ALL
        SELECT 'withdrawal'::text, id, account_id,
               NULL::uuid, NULL::text, amount, ''::text, created_at
        FROM withdrawals
    )
"#;

const MOVEMENTS_WHERE: &str = r#"
    WHERE ($1::uuid IS NULL OR account_id = $1 OR destination_id = $1)
      AND ($2::text IS NULL OR kind = $2)
"#;

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Open a connection pool from `config`. Requires `database_url`.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let url = config
            .require_database_url()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, config.statement_timeout))
    }

    /// Create the ledger tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_account(
        &self,
        operation: &str,
        column: &str,
        value: Uuid,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|row| decode_account(&row)).transpose()
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Unit = PostgresUnit;

    #[instrument(skip(self), err)]
    async fn create_account(&self, holder: HolderId) -> Result<Account, StoreError> {
        let account = Account::open(holder, Utc::now());
        sqlx::query(
            r#"
            INSERT INTO accounts (id, public_id, holder_id, balance, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*account.id().as_uuid())
        .bind(*account.public_id().as_uuid())
        .bind(*account.holder_id().as_uuid())
        .bind(account.balance().amount())
        .bind(account.status().as_str())
        .bind(account.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if constraint_of(&e) == Some("accounts_holder_unique") {
                StoreError::HolderHasAccount(holder)
            } else {
                map_sqlx_error("create_account", e)
            }
        })?;

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.fetch_account("get_account", "id", *id.as_uuid()).await
    }

    async fn find_by_public_id(
        &self,
        public_id: PublicAccountId,
    ) -> Result<Option<Account>, StoreError> {
        self.fetch_account("find_by_public_id", "public_id", *public_id.as_uuid())
            .await
    }

    async fn find_by_holder(&self, holder: HolderId) -> Result<Option<Account>, StoreError> {
        self.fetch_account("find_by_holder", "holder_id", *holder.as_uuid())
            .await
    }

    #[instrument(skip(self), err)]
    async fn list_accounts(
        &self,
        filter: AccountFilter,
        pagination: Pagination,
    ) -> Result<Vec<Account>, StoreError> {
        let sql = format!(
            r#"
            SELECT {ACCOUNT_COLUMNS} FROM accounts
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_accounts", e))?;

        rows.iter().map(decode_account).collect()
    }

    #[instrument(skip(self), err)]
    async fn set_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, StoreError> {
        let sql = format!("UPDATE accounts SET status = $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_status", e))?
            .ok_or(StoreError::AccountNotFound(id))?;
        decode_account(&row)
    }

    #[instrument(skip(self), err)]
    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if sqlstate(&e).as_deref() == Some("23503") {
                    StoreError::AccountReferenced(id)
                } else {
                    map_sqlx_error("delete_account", e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self, ids), fields(accounts = ids.len()), err)]
    async fn begin(&self, ids: &[AccountId]) -> Result<PostgresUnit, StoreError> {
        let mut ordered: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        ordered.sort();
        ordered.dedup();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET does not take bind parameters.
        let timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("statement_timeout", e))?;

        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(&ordered)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_accounts", e))?;

        let accounts = rows.iter().map(decode_account).collect::<Result<Vec<_>, _>>()?;
        Ok(PostgresUnit {
            tx,
            snapshot: AccountSet::new(accounts),
        })
    }

    #[instrument(skip(self), err)]
    async fn movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let account = filter.account.map(|id| *id.as_uuid());
        let kind = filter.kind.map(|k| k.as_str());

        // Count and page read one snapshot so `total` matches the rows.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_read", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin_read", e))?;

        let count_sql =
            format!("{MOVEMENTS_CTE} SELECT COUNT(*) AS total FROM movements {MOVEMENTS_WHERE}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(account)
            .bind(kind)
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let page_sql = format!(
            "{MOVEMENTS_CTE} SELECT * FROM movements {MOVEMENTS_WHERE} \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&page_sql)
            .bind(account)
            .bind(kind)
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("query_movements", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("end_read", e))?;

        let mut movements = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = MovementRow::from_row(row).map_err(|e| {
                StoreError::Backend(format!("failed to deserialize movement row: {e}"))
            })?;
            movements.push(Movement::try_from(row)?);
        }

        Ok(MovementPage::new(movements, total.max(0) as u64, pagination))
    }
}

#[async_trait]
impl CustomerStore for PostgresLedgerStore {
    #[instrument(skip(self, profile), fields(holder_id = %profile.holder_id()), err)]
    async fn create_profile(&self, profile: CustomerProfile) -> Result<CustomerProfile, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO customers (uid, holder_id, birthday, address, passport, phone_number, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*profile.uid().as_uuid())
        .bind(*profile.holder_id().as_uuid())
        .bind(profile.birthday())
        .bind(profile.address())
        .bind(profile.passport())
        .bind(profile.phone_number())
        .bind(profile.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if constraint_of(&e) == Some("customers_holder_unique") {
                StoreError::HolderHasProfile(profile.holder_id())
            } else {
                map_sqlx_error("create_profile", e)
            }
        })?;

        Ok(profile)
    }

    async fn get_profile(&self, holder: HolderId) -> Result<Option<CustomerProfile>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM customers WHERE holder_id = $1");
        let row = sqlx::query(&sql)
            .bind(*holder.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_profile", e))?;
        row.map(|row| decode_profile(&row)).transpose()
    }

    #[instrument(skip(self, profile), fields(holder_id = %profile.holder_id()), err)]
    async fn update_profile(
        &self,
        profile: CustomerProfile,
    ) -> Result<CustomerProfile, StoreError> {
        let sql = format!(
            r#"
            UPDATE customers
            SET birthday = $2, address = $3, passport = $4, phone_number = $5
            WHERE holder_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(*profile.holder_id().as_uuid())
            .bind(profile.birthday())
            .bind(profile.address())
            .bind(profile.passport())
            .bind(profile.phone_number())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_profile", e))?
            .ok_or(StoreError::ProfileNotFound(profile.holder_id()))?;
        decode_profile(&row)
    }
}

/// Open transaction holding `FOR UPDATE` locks on the unit's accounts.
///
/// Dropping it without committing rolls the transaction back.
#[derive(Debug)]
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
    snapshot: AccountSet,
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    fn accounts(&self) -> &AccountSet {
        &self.snapshot
    }

    #[instrument(skip_all, fields(movement_id = %posting.movement.id(), kind = %posting.movement.kind()), err)]
    async fn commit(mut self, posting: Posting) -> Result<Vec<Account>, StoreError> {
        for update in &posting.updates {
            let result =
                sqlx::query("UPDATE accounts SET balance = $1 WHERE id = $2 AND balance = $3")
                    .bind(update.after.amount())
                    .bind(*update.account.as_uuid())
                    .bind(update.before.amount())
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| map_sqlx_error("update_balance", e))?;
            if result.rows_affected() != 1 {
                return Err(StoreError::Conflict(format!(
                    "balance of account {} changed under the lock",
                    update.account
                )));
            }
        }

        insert_movement(&mut self.tx, &posting.movement).await?;

        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let mut accounts = self.snapshot;
        accounts.apply(&posting);
        Ok(accounts
            .into_accounts()
            .into_iter()
            .filter(|a| posting.update_for(a.id()).is_some())
            .collect())
    }
}

async fn insert_movement(
    tx: &mut Transaction<'static, Postgres>,
    movement: &Movement,
) -> Result<(), StoreError> {
    let query = match movement {
        Movement::Transfer(r) => sqlx::query(
            r#"
            INSERT INTO transfers (id, source_id, destination_id, amount, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*r.id.as_uuid())
        .bind(*r.source.as_uuid())
        .bind(*r.destination.as_uuid())
        .bind(r.amount.amount())
        .bind(r.comment.as_str())
        .bind(r.created_at),
        Movement::MerchantDebit(r) => sqlx::query(
            r#"
            INSERT INTO merchant_debits (id, account_id, merchant, amount, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*r.id.as_uuid())
        .bind(*r.account.as_uuid())
        .bind(r.merchant.as_str())
        .bind(r.amount.amount())
        .bind(r.comment.as_str())
        .bind(r.created_at),
        Movement::Deposit(r) => sqlx::query(
            r#"
            INSERT INTO deposits (id, account_id, amount, comment, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*r.id.as_uuid())
        .bind(*r.account.as_uuid())
        .bind(r.amount.amount())
        .bind(r.comment.as_str())
        .bind(r.created_at),
        Movement::Withdrawal(r) => sqlx::query(
            r#"
            INSERT INTO withdrawals (id, account_id, amount, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(*r.id.as_uuid())
        .bind(*r.account.as_uuid())
        .bind(r.amount.amount())
        .bind(r.created_at),
    };

    query
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

fn decode_money(value: Decimal) -> Result<Money, StoreError> {
    Money::new(value).map_err(|e| StoreError::Backend(format!("stored amount {value} is invalid: {e}")))
}

#[derive(Debug)]
struct AccountRow {
    id: Uuid,
    public_id: Uuid,
    holder_id: Uuid,
    balance: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            holder_id: row.try_get("holder_id")?,
            balance: row.try_get("balance")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AccountStatus>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Account::restore(
            AccountId::from_uuid(row.id),
            PublicAccountId::from_uuid(row.public_id),
            HolderId::from_uuid(row.holder_id),
            decode_money(row.balance)?,
            status,
            row.created_at,
        ))
    }
}

fn decode_account(row: &PgRow) -> Result<Account, StoreError> {
    let row = AccountRow::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize account row: {e}")))?;
    Account::try_from(row)
}

#[derive(Debug)]
struct ProfileRow {
    uid: Uuid,
    holder_id: Uuid,
    birthday: NaiveDate,
    address: String,
    passport: String,
    phone_number: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProfileRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProfileRow {
            uid: row.try_get("uid")?,
            holder_id: row.try_get("holder_id")?,
            birthday: row.try_get("birthday")?,
            address: row.try_get("address")?,
            passport: row.try_get("passport")?,
            phone_number: row.try_get("phone_number")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<ProfileRow> for CustomerProfile {
    fn from(row: ProfileRow) -> Self {
        CustomerProfile::restore(
            CustomerId::from_uuid(row.uid),
            HolderId::from_uuid(row.holder_id),
            ProfileDetails {
                birthday: row.birthday,
                address: row.address,
                passport: row.passport,
                phone_number: row.phone_number,
            },
            row.created_at,
        )
    }
}

fn decode_profile(row: &PgRow) -> Result<CustomerProfile, StoreError> {
    ProfileRow::from_row(row)
        .map(CustomerProfile::from)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize customer row: {e}")))
}

#[derive(Debug)]
struct MovementRow {
    kind: String,
    id: Uuid,
    account_id: Uuid,
    destination_id: Option<Uuid>,
    merchant: Option<String>,
    amount: Decimal,
    comment: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            kind: row.try_get("kind")?,
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            destination_id: row.try_get("destination_id")?,
            merchant: row.try_get("merchant")?,
            amount: row.try_get("amount")?,
            comment: row.try_get("comment")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let id = MovementId::from_uuid(row.id);
        let account = AccountId::from_uuid(row.account_id);
        let amount = decode_money(row.amount)?;

        let movement = match row.kind.as_str() {
            k if k == MovementKind::Transfer.as_str() => {
                let destination = row.destination_id.ok_or_else(|| {
                    StoreError::Backend(format!("transfer {id} has no destination"))
                })?;
                Movement::Transfer(TransferRecord {
                    id,
                    source: account,
                    destination: AccountId::from_uuid(destination),
                    amount,
                    created_at: row.created_at,
                    comment: row.comment,
                })
            }
            k if k == MovementKind::MerchantDebit.as_str() => {
                Movement::MerchantDebit(MerchantDebitRecord {
                    id,
                    account,
                    merchant: row.merchant.unwrap_or_default(),
                    amount,
                    created_at: row.created_at,
                    comment: row.comment,
                })
            }
            k if k == MovementKind::Deposit.as_str() => Movement::Deposit(DepositRecord {
                id,
                account,
                amount,
                created_at: row.created_at,
                comment: row.comment,
            }),
            k if k == MovementKind::Withdrawal.as_str() => {
                Movement::Withdrawal(WithdrawalRecord {
                    id,
                    account,
                    amount,
                    created_at: row.created_at,
                })
            }
            other => {
                return Err(StoreError::Backend(format!(
                    "unknown movement kind '{other}'"
                )));
            }
        };
        Ok(movement)
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn constraint_of(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // Serialization failure, deadlock, lock not available, lock wait
                // cut short by statement_timeout, unique violation.
                Some("40001" | "40P01" | "55P03" | "57014" | "23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
