//! Access boundary of the bank ledger.
//!
//! Everything a caller-facing surface (HTTP, CLI, RPC) needs: caller identity,
//! request validation, receiver resolution by public id, stable error codes and
//! serialisable views. Holds no transport of its own.

pub mod context;
pub mod dto;
pub mod errors;
pub mod rates;
pub mod service;
pub mod validate;

pub use context::{CallerContext, Role};
pub use errors::{ApiError, ErrorBody};
pub use rates::{ConvertedBalance, FixedRates, RateError, RateLookup};
pub use service::BankingService;
