//! Account store and movement log boundary.
//!
//! Two backends implement the same traits: an in-memory store for tests and
//! development, and a Postgres store for production.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::{AccountFilter, MovementFilter, MovementPage, Pagination};
pub use r#trait::{CustomerStore, LedgerStore, UnitOfWork};
