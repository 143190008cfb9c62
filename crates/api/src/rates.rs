//! Display-only currency conversion.
//!
//! Balances are kept in a single ledger currency. A [`RateLookup`] lets a
//! surface show a balance in another currency; ledger arithmetic never uses it.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use bank_core::Money;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("no rate for {0}")]
    Unknown(String),

    #[error("rate source failed: {0}")]
    Source(String),
}

/// Source of exchange rates, typically a cached external feed.
#[async_trait]
pub trait RateLookup: Send + Sync {
    /// Price of one unit of `currency`, in ledger currency.
    async fn rate(&self, currency: &str) -> Result<Decimal, RateError>;
}

/// Rates held in memory, e.g. a snapshot loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct FixedRates {
    rates: HashMap<String, Decimal>,
}

impl FixedRates {
    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.to_uppercase(), rate))
                .collect(),
        }
    }
}

#[async_trait]
impl RateLookup for FixedRates {
    async fn rate(&self, currency: &str) -> Result<Decimal, RateError> {
        let code = currency.trim().to_uppercase();
        self.rates
            .get(&code)
            .copied()
            .ok_or(RateError::Unknown(code))
    }
}

/// A balance expressed in another currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedBalance {
    pub currency: String,
    pub rate: Decimal,
    /// Ledger balance the conversion started from.
    pub balance: Money,
    /// `balance / rate`, rounded half away from zero to two places.
    pub amount: Decimal,
}

impl ConvertedBalance {
    pub fn convert(balance: Money, currency: &str, rate: Decimal) -> Result<Self, RateError> {
        if rate <= Decimal::ZERO {
            return Err(RateError::Source(format!("non-positive rate {rate}")));
        }
        let amount = (balance.amount() / rate)
            .round_dp_with_strategy(Money::SCALE, RoundingStrategy::MidpointAwayFromZero);
        Ok(Self {
            currency: currency.trim().to_uppercase(),
            rate,
            balance,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn fixed_rates_are_case_insensitive() {
        let rates = FixedRates::new([("usd".to_string(), dec("27.50"))]);
        assert_eq!(rates.rate("USD").await.unwrap(), dec("27.50"));
        assert_eq!(
            rates.rate("eur").await,
            Err(RateError::Unknown("EUR".to_string()))
        );
    }

    #[test]
    fn converts_and_rounds() {
        let converted =
            ConvertedBalance::convert("100.00".parse().unwrap(), "usd", dec("3")).unwrap();
        assert_eq!(converted.currency, "USD");
        assert_eq!(converted.amount, dec("33.33"));

        assert!(ConvertedBalance::convert(Money::ZERO, "usd", Decimal::ZERO).is_err());
    }
}
