//! Customer profile: personal data the bank keeps about an account holder.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bank_core::{CustomerId, DomainError, DomainResult, HolderId};

pub const MAX_ADDRESS_LEN: usize = 255;
pub const MAX_PASSPORT_LEN: usize = 20;
/// `+380` followed by nine digits.
pub const PHONE_NUMBER_LEN: usize = 13;

const PHONE_PREFIX: &str = "+380";

/// Validated profile fields, as supplied on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub birthday: NaiveDate,
    pub address: String,
    pub passport: String,
    pub phone_number: String,
}

/// Partial change; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanges {
    pub birthday: Option<NaiveDate>,
    pub address: Option<String>,
    pub passport: Option<String>,
    pub phone_number: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.birthday.is_none()
            && self.address.is_none()
            && self.passport.is_none()
            && self.phone_number.is_none()
    }
}

/// One per holder. The holder and `uid` never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    uid: CustomerId,
    holder_id: HolderId,
    birthday: NaiveDate,
    address: String,
    passport: String,
    phone_number: String,
    created_at: DateTime<Utc>,
}

impl CustomerProfile {
    pub fn create(
        holder_id: HolderId,
        details: ProfileDetails,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            uid: CustomerId::new(),
            holder_id,
            birthday: details.birthday,
            address: address(&details.address)?,
            passport: passport(&details.passport)?,
            phone_number: phone_number(&details.phone_number)?,
            created_at,
        })
    }

    /// Rebuild a profile from persisted state.
    pub fn restore(
        uid: CustomerId,
        holder_id: HolderId,
        details: ProfileDetails,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uid,
            holder_id,
            birthday: details.birthday,
            address: details.address,
            passport: details.passport,
            phone_number: details.phone_number,
            created_at,
        }
    }

    /// Apply `changes`, validating each supplied field. On error the
    /// profile is left untouched.
    pub fn apply(&mut self, changes: ProfileChanges) -> DomainResult<()> {
        let address = changes.address.as_deref().map(address).transpose()?;
        let passport = changes.passport.as_deref().map(passport).transpose()?;
        let phone = changes.phone_number.as_deref().map(phone_number).transpose()?;

        if let Some(birthday) = changes.birthday {
            self.birthday = birthday;
        }
        if let Some(address) = address {
            self.address = address;
        }
        if let Some(passport) = passport {
            self.passport = passport;
        }
        if let Some(phone) = phone {
            self.phone_number = phone;
        }
        Ok(())
    }

    pub fn uid(&self) -> CustomerId {
        self.uid
    }

    pub fn holder_id(&self) -> HolderId {
        self.holder_id
    }

    pub fn birthday(&self) -> NaiveDate {
        self.birthday
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn passport(&self) -> &str {
        &self.passport
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The editable fields.
    pub fn details(&self) -> ProfileDetails {
        ProfileDetails {
            birthday: self.birthday,
            address: self.address.clone(),
            passport: self.passport.clone(),
            phone_number: self.phone_number.clone(),
        }
    }
}

fn required(field: &str, raw: &str, max: usize) -> DomainResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn address(raw: &str) -> DomainResult<String> {
    required("address", raw, MAX_ADDRESS_LEN)
}

fn passport(raw: &str) -> DomainResult<String> {
    required("passport", raw, MAX_PASSPORT_LEN)
}

fn phone_number(raw: &str) -> DomainResult<String> {
    let phone = raw.trim();
    let valid = phone.len() == PHONE_NUMBER_LEN
        && phone
            .strip_prefix(PHONE_PREFIX)
            .is_some_and(|rest| rest.bytes().all(|b| b.is_ascii_digit()));
    if !valid {
        return Err(DomainError::validation(
            "phone number must be entered in the format: +380999999999",
        ));
    }
    Ok(phone.to_string())
}
