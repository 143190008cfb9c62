//! Building blocks shared by every bank crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the fixed-point `Money` value and the base error model.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, CustomerId, HolderId, MovementId, PublicAccountId};
pub use money::Money;
