//! Operator command line for the bank ledger.
//!
//! Every command runs against the Postgres store named by `DATABASE_URL` and
//! acts as the holder given with `--holder`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

use bank_api::dto::{
    DepositRequest, HistoryQuery, MerchantPaymentRequest, ProfileRequest, ProfileUpdate,
    TransferRequest, WithdrawalRequest,
};
use bank_api::{ApiError, BankingService, CallerContext, FixedRates};
use bank_core::HolderId;
use bank_infra::{LedgerConfig, LedgerEngine, Pagination, PostgresLedgerStore};
use bank_ledger::AccountStatus;
use bank_observability::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "bank", version, about = "Personal bank ledger")]
struct Cli {
    /// Holder id the command acts for.
    #[arg(long, global = true)]
    holder: Option<HolderId>,

    /// Act with administrator rights.
    #[arg(long, global = true)]
    admin: bool,

    /// Log output: json or pretty.
    #[arg(long, global = true, default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the ledger tables.
    Migrate,
    /// Open an account for the holder.
    OpenAccount,
    /// Show the holder's account.
    Account,
    Deposit {
        amount: String,
        #[arg(long)]
        comment: Option<String>,
    },
    Withdraw {
        amount: String,
    },
    /// Send money to another account by its public number.
    Transfer {
        to: String,
        amount: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Pay a merchant from the holder's account.
    Pay {
        merchant: String,
        amount: String,
        #[arg(long)]
        comment: Option<String>,
    },
    History {
        /// transfer, merchant_debit, deposit or withdrawal.
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Accounts that can receive transfers.
    Receivers {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show the balance converted at the given rate.
    Balance {
        currency: String,
        /// Price of one unit of `currency` in ledger currency.
        #[arg(long)]
        rate: Decimal,
    },
    /// Change an account's status (admin).
    SetStatus {
        number: String,
        status: AccountStatus,
    },
    /// List accounts (admin).
    Accounts {
        #[arg(long)]
        status: Option<AccountStatus>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Delete an account without history (admin).
    CloseAccount { number: String },
    /// Store the holder's customer profile.
    CreateProfile {
        /// YYYY-MM-DD.
        #[arg(long)]
        birthday: NaiveDate,
        #[arg(long)]
        address: String,
        #[arg(long)]
        passport: String,
        /// +380 followed by nine digits.
        #[arg(long)]
        phone: String,
    },
    /// Show the holder's customer profile.
    Profile,
    /// Change some fields of the holder's customer profile.
    UpdateProfile {
        #[arg(long)]
        birthday: Option<NaiveDate>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        passport: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    bank_observability::init_with(cli.log_format);

    let config = LedgerConfig::from_env().context("invalid configuration")?;
    let store = PostgresLedgerStore::connect(&config)
        .await
        .context("connecting to the ledger database")?;

    if let Command::Migrate = cli.command {
        store.migrate().await.context("applying ledger schema")?;
        tracing::info!("ledger schema applied");
        return Ok(ExitCode::SUCCESS);
    }

    let holder = cli.holder.context("--holder is required")?;
    let caller = if cli.admin {
        CallerContext::admin(holder)
    } else {
        CallerContext::customer(holder)
    };
    let mut service = BankingService::new(LedgerEngine::with_config(store, &config));
    if let Command::Balance { currency, rate } = &cli.command {
        service = service.with_rates(Arc::new(FixedRates::new([(currency.clone(), *rate)])));
    }

    match run(&service, &caller, cli.command).await {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if let ApiError::Internal(detail) = &err {
                tracing::error!(error = %detail, "command failed");
            }
            eprintln!("{}", serde_json::to_string_pretty(&err.body())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(
    service: &BankingService<PostgresLedgerStore>,
    caller: &CallerContext,
    command: Command,
) -> Result<String, ApiError> {
    match command {
        Command::Migrate => Ok(String::new()),
        Command::OpenAccount => render(&service.open_account(caller).await?),
        Command::Account => render(&service.my_account(caller).await?),
        Command::Deposit { amount, comment } => render(
            &service
                .deposit(caller, DepositRequest { amount, comment })
                .await?,
        ),
        Command::Withdraw { amount } => {
            render(&service.withdraw(caller, WithdrawalRequest { amount }).await?)
        }
        Command::Transfer {
            to,
            amount,
            comment,
        } => render(
            &service
                .transfer(
                    caller,
                    TransferRequest {
                        to,
                        amount,
                        comment,
                    },
                )
                .await?,
        ),
        Command::Pay {
            merchant,
            amount,
            comment,
        } => render(
            &service
                .pay_merchant(
                    caller,
                    MerchantPaymentRequest {
                        merchant,
                        amount,
                        comment,
                    },
                )
                .await?,
        ),
        Command::History {
            kind,
            limit,
            offset,
        } => render(
            &service
                .history(
                    caller,
                    HistoryQuery {
                        kind,
                        limit,
                        offset,
                    },
                )
                .await?,
        ),
        Command::Receivers { limit } => render(
            &service
                .eligible_receivers(caller, Pagination::new(limit, None))
                .await?,
        ),
        Command::Balance { currency, .. } => render(&service.balance_in(caller, &currency).await?),
        Command::SetStatus { number, status } => {
            render(&service.set_status(caller, &number, status).await?)
        }
        Command::Accounts {
            status,
            limit,
            offset,
        } => render(
            &service
                .list_accounts(caller, status, Pagination::new(limit, offset))
                .await?,
        ),
        Command::CloseAccount { number } => {
            service.close_account(caller, &number).await?;
            render(&serde_json::json!({ "closed": number }))
        }
        Command::CreateProfile {
            birthday,
            address,
            passport,
            phone,
        } => render(
            &service
                .create_profile(
                    caller,
                    ProfileRequest {
                        birthday,
                        address,
                        passport,
                        phone_number: phone,
                    },
                )
                .await?,
        ),
        Command::Profile => render(&service.my_profile(caller).await?),
        Command::UpdateProfile {
            birthday,
            address,
            passport,
            phone,
        } => render(
            &service
                .update_profile(
                    caller,
                    ProfileUpdate {
                        birthday,
                        address,
                        passport,
                        phone_number: phone,
                    },
                )
                .await?,
        ),
    }
}

fn render<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(|e| ApiError::Internal(e.to_string()))
}
