//! Configuration loading and representation.
//!
//! Everything comes from environment variables; unset variables fall back to
//! development defaults.

use std::time::Duration;

use thiserror::Error;

use bank_ledger::LedgerPolicy;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "BANK_DB_MAX_CONNECTIONS";
pub const MAX_CONFLICT_RETRIES: &str = "BANK_MAX_CONFLICT_RETRIES";
pub const REJECT_BLOCKED_SENDER: &str = "BANK_REJECT_BLOCKED_SENDER";
pub const STATEMENT_TIMEOUT_MS: &str = "BANK_STATEMENT_TIMEOUT_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Postgres connection string. `None` means "use the in-memory store".
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// How many times the engine re-runs an operation after a data store conflict.
    pub max_conflict_retries: u32,
    /// Upper bound on any single statement, lock waits included.
    pub statement_timeout: Duration,
    pub policy: LedgerPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            max_conflict_retries: 3,
            statement_timeout: Duration::from_millis(5_000),
            policy: LedgerPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup(DATABASE_URL).filter(|url| !url.trim().is_empty());
        let max_connections =
            parse_or(&lookup, MAX_CONNECTIONS, defaults.max_connections, parse_positive)?;
        let max_conflict_retries = parse_or(
            &lookup,
            MAX_CONFLICT_RETRIES,
            defaults.max_conflict_retries,
            |raw| raw.parse::<u32>().map_err(|e| e.to_string()),
        )?;
        let statement_timeout_ms = parse_or(
            &lookup,
            STATEMENT_TIMEOUT_MS,
            defaults.statement_timeout.as_millis() as u64,
            |raw| {
                let ms = raw.parse::<u64>().map_err(|e| e.to_string())?;
                if ms == 0 {
                    return Err("must be greater than zero".to_string());
                }
                Ok(ms)
            },
        )?;
        let reject_blocked_sender = parse_or(
            &lookup,
            REJECT_BLOCKED_SENDER,
            defaults.policy.reject_blocked_sender,
            parse_bool,
        )?;

        Ok(Self {
            database_url,
            max_connections,
            max_conflict_retries,
            statement_timeout: Duration::from_millis(statement_timeout_ms),
            policy: LedgerPolicy {
                reject_blocked_sender,
            },
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing(DATABASE_URL))
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => parse(raw.trim()).map_err(|reason| ConfigError::Invalid {
            key,
            value: raw,
            reason,
        }),
    }
}

fn parse_positive(raw: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}
