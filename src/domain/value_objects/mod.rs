//! Value Objects for checkout

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest quantity a single cart or order line may carry.
pub const MAX_LINE_QUANTITY: u32 = 99;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self { Self(value) }
            pub const fn value(self) -> i64 { self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

id_type!(
    /// Purchasable variant, owned by the catalog.
    VariantId
);
id_type!(CartId);
id_type!(CartItemId);
id_type!(OrderId);
id_type!(OrderLineId);

/// Caller identity. Always a positive integer, validated upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct UserId(i64);

impl UserId {
    pub fn new(value: i64) -> Result<Self, UserIdError> {
        if value <= 0 { return Err(UserIdError::NotPositive(value)); }
        Ok(Self(value))
    }
    pub const fn value(self) -> i64 { self.0 }
}

impl TryFrom<i64> for UserId {
    type Error = UserIdError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self { id.0 }
}

impl FromStr for UserId {
    type Err = UserIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().parse::<i64>().map_err(|_| UserIdError::Malformed)?;
        Self::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserIdError {
    #[error("user id must be a positive integer, got {0}")]
    NotPositive(i64),
    #[error("user id must be a positive integer")]
    Malformed,
}

/// Money value object in integer minor currency units (cents).
///
/// Currency is carried next to amounts (on the order) rather than inside
/// them, since the core never converts between currencies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(amount: i64) -> Result<Self, MoneyError> {
        if amount < 0 { return Err(MoneyError::Negative(amount)); }
        Ok(Self(amount))
    }
    pub const fn minor_units(self) -> i64 { self.0 }
    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(other.0).map(Money).ok_or(MoneyError::Overflow)
    }
    pub fn checked_mul(self, qty: Quantity) -> Result<Money, MoneyError> {
        self.0.checked_mul(i64::from(qty.value())).map(Money).ok_or(MoneyError::Overflow)
    }
}

impl TryFrom<i64> for Money {
    type Error = MoneyError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Self::from_minor(value) }
}

impl From<Money> for i64 {
    fn from(m: Money) -> Self { m.0 }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount cannot be negative: {0}")]
    Negative(i64),
    #[error("amount overflow")]
    Overflow,
}

/// ISO-4217 style currency code: three ASCII letters, stored uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(value: impl AsRef<str>) -> Result<Self, CurrencyError> {
        let value = value.as_ref().trim();
        if value.len() != 3 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyError::Invalid(value.to_string()));
        }
        Ok(Self(value.to_ascii_uppercase()))
    }
    pub fn usd() -> Self { Self("USD".to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl Default for CurrencyCode { fn default() -> Self { Self::usd() } }

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CurrencyCode> for String {
    fn from(c: CurrencyCode) -> Self { c.0 }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("currency must be a 3-letter code, got {0:?}")]
    Invalid(String),
}

/// Line quantity, always within `1..=MAX_LINE_QUANTITY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > MAX_LINE_QUANTITY { return Err(QuantityError::AboveLimit { requested: value, limit: MAX_LINE_QUANTITY }); }
        Ok(Self(value))
    }
    pub const fn value(self) -> u32 { self.0 }
    pub fn checked_add(self, other: Quantity) -> Result<Self, QuantityError> {
        Self::new(self.0.saturating_add(other.0))
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let value = u32::try_from(value).map_err(|_| QuantityError::Zero)?;
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl From<Quantity> for i32 {
    // MAX_LINE_QUANTITY fits comfortably in i32
    fn from(q: Quantity) -> Self { q.0 as i32 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
    #[error("quantity {requested} exceeds the per-line limit of {limit}")]
    AboveLimit { requested: u32, limit: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id() {
        assert_eq!("42".parse::<UserId>().unwrap().value(), 42);
        assert_eq!("0".parse::<UserId>(), Err(UserIdError::NotPositive(0)));
        assert_eq!("abc".parse::<UserId>(), Err(UserIdError::Malformed));
    }

    #[test]
    fn test_money_arithmetic() {
        let price = Money::from_minor(1999).unwrap();
        let qty = Quantity::new(3).unwrap();
        assert_eq!(price.checked_mul(qty).unwrap().minor_units(), 5997);
        assert_eq!(price.checked_add(Money::from_minor(1).unwrap()).unwrap().minor_units(), 2000);
        assert_eq!(Money::from_minor(-1), Err(MoneyError::Negative(-1)));
        assert_eq!(Money::from_minor(i64::MAX).unwrap().checked_mul(qty), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_currency_code() {
        assert_eq!(CurrencyCode::new("eur").unwrap().as_str(), "EUR");
        assert!(CurrencyCode::new("EURO").is_err());
        assert!(CurrencyCode::new("U$D").is_err());
    }

    #[test]
    fn test_quantity_limits() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert!(Quantity::new(99).is_ok());
        let a = Quantity::new(60).unwrap();
        let b = Quantity::new(40).unwrap();
        assert_eq!(a.checked_add(b), Err(QuantityError::AboveLimit { requested: 100, limit: 99 }));
        assert_eq!(Quantity::try_from(-3i32), Err(QuantityError::Zero));
    }
}
