//! Request field validation.

use core::str::FromStr;

use bank_core::{Money, PublicAccountId};
use bank_ledger::MovementKind;
use bank_ledger::command::{MAX_MERCHANT_LEN, MIN_CASH_MINOR_UNITS, MIN_TRANSFER_MINOR_UNITS};

use crate::errors::ApiError;

/// Longest comment stored with a movement.
pub const MAX_COMMENT_LEN: usize = 1_000;

/// Smallest amount accepted for `kind`.
pub fn minimum_amount(kind: MovementKind) -> Money {
    let minor = match kind {
        MovementKind::Transfer | MovementKind::MerchantDebit => MIN_TRANSFER_MINOR_UNITS,
        MovementKind::Deposit | MovementKind::Withdrawal => MIN_CASH_MINOR_UNITS,
    };
    Money::from_minor_units(minor).unwrap_or_default()
}

/// Parse a decimal amount string for an operation of `kind`.
///
/// Accepts at most two decimal places and enforces the per-kind minimum.
pub fn parse_amount(raw: &str, kind: MovementKind) -> Result<Money, ApiError> {
    let amount = Money::from_str(raw.trim()).map_err(|_| {
        ApiError::InvalidAmount(
            "Amount must be a positive number with at most two decimal places.".to_string(),
        )
    })?;

    let minimum = minimum_amount(kind);
    if amount < minimum {
        return Err(ApiError::InvalidAmount(format!(
            "Amount must be at least {minimum}."
        )));
    }
    Ok(amount)
}

pub fn parse_public_id(raw: &str) -> Result<PublicAccountId, ApiError> {
    PublicAccountId::from_str(raw)
        .map_err(|_| ApiError::InvalidRequest("Account number is malformed.".to_string()))
}

pub fn merchant(raw: &str) -> Result<String, ApiError> {
    let merchant = raw.trim();
    if merchant.is_empty() {
        return Err(ApiError::InvalidRequest("Merchant is required.".to_string()));
    }
    if merchant.chars().count() > MAX_MERCHANT_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "Merchant must be at most {MAX_MERCHANT_LEN} characters."
        )));
    }
    Ok(merchant.to_string())
}

pub fn comment(raw: Option<&str>) -> Result<String, ApiError> {
    let comment = raw.map(str::trim).unwrap_or_default();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::InvalidRequest(format!(
            "Comment must be at most {MAX_COMMENT_LEN} characters."
        )));
    }
    Ok(comment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_need_two_decimals_at_most() {
        assert_eq!(
            parse_amount(" 12.50 ", MovementKind::Transfer).unwrap(),
            "12.50".parse::<Money>().unwrap()
        );
        assert!(matches!(
            parse_amount("12.505", MovementKind::Transfer),
            Err(ApiError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_amount("-5", MovementKind::Transfer),
            Err(ApiError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_amount("ten", MovementKind::Deposit),
            Err(ApiError::InvalidAmount(_))
        ));
    }

    #[test]
    fn minimums_depend_on_kind() {
        assert!(parse_amount("0.01", MovementKind::MerchantDebit).is_ok());
        assert!(parse_amount("0.00", MovementKind::Transfer).is_err());
        assert!(parse_amount("9.99", MovementKind::Withdrawal).is_err());
        assert!(parse_amount("10", MovementKind::Deposit).is_ok());
    }

    #[test]
    fn merchant_and_comment_are_trimmed() {
        assert_eq!(merchant("  Grocer ").unwrap(), "Grocer");
        assert!(merchant(" ").is_err());
        assert_eq!(comment(None).unwrap(), "");
        assert!(comment(Some(&"x".repeat(MAX_COMMENT_LEN + 1))).is_err());
    }
}
