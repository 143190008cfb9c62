//! Ledger module (accounts, customer profiles, movement records,
//! balance-changing rules).
//!
//! Pure domain logic only: no IO, no locking, no persistence concerns. The
//! infrastructure layer loads locked account snapshots, calls [`decide`] and
//! persists the resulting [`Posting`] as one atomic unit.

pub mod account;
pub mod command;
pub mod customer;
pub mod movement;
pub mod rules;

pub use account::{Account, AccountStatus};
pub use command::{
    DepositCommand, LedgerCommand, MerchantDebitCommand, TransferCommand, WithdrawalCommand,
};
pub use customer::{CustomerProfile, ProfileChanges, ProfileDetails};
pub use movement::{
    DepositRecord, MerchantDebitRecord, Movement, MovementKind, TransferRecord, WithdrawalRecord,
};
pub use rules::{AccountSet, BalanceUpdate, LedgerPolicy, Posting, RuleViolation, decide};
