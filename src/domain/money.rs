//! Money type
//!
//! Domain primitive for monetary values: a fixed-point decimal amount tagged
//! with a three-letter currency code. Values are validated at construction
//! time, so an invalid amount or currency cannot exist in the system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Largest amount or balance: 12 integer digits, 8 fractional digits
const MAX_AMOUNT_UNITS: i128 = 99_999_999_999_999_999_999;

fn max_amount() -> Decimal {
    Decimal::from_i128_with_scale(MAX_AMOUNT_UNITS, MAX_SCALE)
}

/// Maximum decimal places (8)
pub const MAX_SCALE: u32 = 8;

/// Errors raised while validating money input.
///
/// These are malformed-input errors and never reach persistence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount must not be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount exceeds maximum allowed value (999999999999.99999999)")]
    Overflow,

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),
}

// =========================================================================
// Currency
// =========================================================================

/// ISO-4217 style currency code: exactly three uppercase ASCII letters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, AmountError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(AmountError::InvalidCurrency(code.to_string()));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.as_str().to_string()
    }
}

// =========================================================================
// Money
// =========================================================================

/// Money represents a non-negative decimal amount in a single currency.
///
/// # Invariants
/// - Amount is never negative
/// - Maximum 8 decimal places
/// - Arithmetic is only defined between values of the same currency
///
/// # Example
/// ```
/// use wallet_ledger::domain::Money;
///
/// let price = Money::parse("19.99", "USD").unwrap();
/// assert_eq!(price.format(), "19.99");
/// assert_eq!(price.currency().as_str(), "USD");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr", into = "MoneyRepr")]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Create a Money value from an already-parsed decimal.
    ///
    /// # Errors
    /// - `AmountError::Negative` if the value is below zero
    /// - `AmountError::TooManyDecimals` if more than 8 decimal places
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, AmountError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(AmountError::Negative(amount));
        }

        if amount.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(amount.scale()));
        }

        Ok(Self { amount, currency })
    }

    /// Zero in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Parse a canonical decimal string and currency code.
    ///
    /// Accepts `digits` or `digits.digits` with at most 8 fractional digits.
    /// Signs, exponents, whitespace and empty parts are rejected.
    pub fn parse(amount: &str, currency: &str) -> Result<Self, AmountError> {
        let currency = Currency::parse(currency)?;
        let amount = parse_decimal(amount)?;
        Money::new(amount, currency)
    }

    /// Canonical decimal string, preserving the scale the value was built with.
    pub fn format(&self) -> String {
        self.amount.to_string()
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Require a strictly positive amount (operation amounts must move something).
    pub fn ensure_positive(&self) -> Result<(), AmountError> {
        if self.amount.is_zero() {
            return Err(AmountError::NotPositive(self.amount));
        }
        Ok(())
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                found: other.currency,
            });
        }
        Ok(())
    }

    /// Add two values of the same currency.
    ///
    /// The result is held to the same ceiling as parsed input.
    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .filter(|sum| *sum <= max_amount())
            .ok_or(DomainError::AmountOverflow)?;
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }

    /// Subtract `other`, refusing to go below zero.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        if other.amount > self.amount {
            return Err(DomainError::NegativeResult {
                minuend: self.amount,
                subtrahend: other.amount,
            });
        }
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency,
        })
    }

    /// Compare two values of the same currency.
    pub fn compare(&self, other: &Money) -> Result<Ordering, DomainError> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Check if this value covers `other` (same currency required).
    pub fn is_sufficient_for(&self, other: &Money) -> Result<bool, DomainError> {
        Ok(self.compare(other)? != Ordering::Less)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Strict decimal parsing shared by `Money::parse` and request DTOs.
pub fn parse_decimal(s: &str) -> Result<Decimal, AmountError> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (s, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }

    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::InvalidFormat(s.to_string()));
        }
        if frac.len() > MAX_SCALE as usize {
            return Err(AmountError::TooManyDecimals(frac.len() as u32));
        }
    }

    let value = Decimal::from_str(s).map_err(|_| AmountError::Overflow)?;
    if value > max_amount() {
        return Err(AmountError::Overflow);
    }

    Ok(value)
}

/// Wire representation: amount as a string to avoid float round-trips
#[derive(Serialize, Deserialize)]
struct MoneyRepr {
    amount: String,
    currency: Currency,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = AmountError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Money::new(parse_decimal(&repr.amount)?, repr.currency)
    }
}

impl From<Money> for MoneyRepr {
    fn from(money: Money) -> Self {
        MoneyRepr {
            amount: money.format(),
            currency: money.currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd(amount: &str) -> Money {
        Money::parse(amount, "USD").unwrap()
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("USD").unwrap().as_str(), "USD");
        assert!(matches!(Currency::parse("usd"), Err(AmountError::InvalidCurrency(_))));
        assert!(matches!(Currency::parse("US"), Err(AmountError::InvalidCurrency(_))));
        assert!(matches!(Currency::parse("USDT"), Err(AmountError::InvalidCurrency(_))));
        assert!(matches!(Currency::parse("U5D"), Err(AmountError::InvalidCurrency(_))));
    }

    #[test]
    fn test_format_parse_round_trip() {
        for s in ["0", "0.00", "100.00", "1.5", "12345.12345678", "7"] {
            assert_eq!(usd(s).format(), s);
        }
    }

    #[test]
    fn test_parse_rejects_bad_syntax() {
        for s in ["", "+1.00", "-1.00", "1e5", "1.", ".5", " 1", "1 ", "1,00", "abc", "1.2.3"] {
            assert!(
                matches!(Money::parse(s, "USD"), Err(AmountError::InvalidFormat(_))),
                "expected InvalidFormat for {:?}",
                s
            );
        }
    }

    #[test]
    fn test_parse_rejects_too_many_decimals() {
        let result = Money::parse("0.123456789", "USD");
        assert!(matches!(result, Err(AmountError::TooManyDecimals(9))));
        assert!(Money::parse("0.12345678", "USD").is_ok());
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(matches!(
            Money::parse("1000000000000", "USD"),
            Err(AmountError::Overflow)
        ));
        assert!(Money::parse("999999999999.99999999", "USD").is_ok());
    }

    #[test]
    fn test_add_rejects_sum_above_ceiling() {
        let top = usd("999999999999.99999999");
        assert_eq!(top.checked_add(&usd("0")).unwrap(), top);
        assert!(matches!(
            top.checked_add(&usd("0.00000001")),
            Err(DomainError::AmountOverflow)
        ));
        assert!(matches!(
            usd("600000000000").checked_add(&usd("600000000000")),
            Err(DomainError::AmountOverflow)
        ));
    }

    #[test]
    fn test_new_rejects_negative() {
        let currency = Currency::parse("USD").unwrap();
        assert!(matches!(
            Money::new(dec!(-0.01), currency),
            Err(AmountError::Negative(_))
        ));
    }

    #[test]
    fn test_ensure_positive() {
        assert!(matches!(
            usd("0.00").ensure_positive(),
            Err(AmountError::NotPositive(_))
        ));
        assert!(usd("0.01").ensure_positive().is_ok());
    }

    #[test]
    fn test_add_and_subtract() {
        let sum = usd("100.00").checked_add(&usd("50.5")).unwrap();
        assert_eq!(sum.amount(), dec!(150.50));

        let diff = sum.checked_sub(&usd("150.5")).unwrap();
        assert!(diff.is_zero());
    }

    #[test]
    fn test_subtract_negative_result() {
        let result = usd("10").checked_sub(&usd("10.01"));
        assert!(matches!(result, Err(DomainError::NegativeResult { .. })));
    }

    #[test]
    fn test_currency_mismatch() {
        let eur = Money::parse("1", "EUR").unwrap();
        assert!(matches!(
            usd("1").checked_add(&eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
        assert!(matches!(
            usd("1").checked_sub(&eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
        assert!(matches!(
            usd("1").compare(&eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_compare() {
        assert_eq!(usd("2").compare(&usd("10")).unwrap(), Ordering::Less);
        assert_eq!(usd("2.00").compare(&usd("2")).unwrap(), Ordering::Equal);
        assert!(usd("2").is_sufficient_for(&usd("2.00")).unwrap());
    }

    #[test]
    fn test_money_serialization() {
        let money = usd("42.10");
        let json = serde_json::to_value(money).unwrap();
        assert_eq!(json, serde_json::json!({"amount": "42.10", "currency": "USD"}));

        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, money);

        let bad: Result<Money, _> =
            serde_json::from_value(serde_json::json!({"amount": "1e3", "currency": "USD"}));
        assert!(bad.is_err());
    }
}
