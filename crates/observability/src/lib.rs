//! Process-wide logging setup shared by the ledger binaries.

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Subscriber construction (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, ParseLogFormatError, env_filter, init as init_with};
