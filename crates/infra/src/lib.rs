//! Infrastructure layer: account store, movement log, ledger engine, config.

pub mod config;
pub mod engine;
pub mod error;
pub mod store;


pub use config::{ConfigError, LedgerConfig};
pub use engine::{Committed, LedgerEngine};
pub use error::{LedgerError, StoreError};
pub use store::{
    AccountFilter, CustomerStore, InMemoryLedgerStore, LedgerStore, MovementFilter, MovementPage,
    Pagination, PostgresLedgerStore, UnitOfWork,
};
