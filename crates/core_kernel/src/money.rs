//! Money types with precise decimal arithmetic
//!
//! This module provides a type-safe representation of monetary values
//! using rust_decimal for precise calculations without floating-point errors.
//! Floating point only appears in the two explicit boundary conversions
//! (`to_f64_lossy` / `from_f64_rounded`) used when talking to the forecasting
//! collaborator.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    PLN,
    EUR,
    USD,
    GBP,
    CHF,
    CZK,
    JPY,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Returns the smallest representable amount (one minor unit)
    pub fn minor_unit(&self) -> Decimal {
        Decimal::new(1, self.decimal_places())
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::PLN => "PLN",
            Currency::EUR => "EUR",
            Currency::USD => "USD",
            Currency::GBP => "GBP",
            Currency::CHF => "CHF",
            Currency::CZK => "CZK",
            Currency::JPY => "JPY",
        }
    }

    /// Parses an ISO 4217 code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "PLN" => Some(Currency::PLN),
            "EUR" => Some(Currency::EUR),
            "USD" => Some(Currency::USD),
            "GBP" => Some(Currency::GBP),
            "CHF" => Some(Currency::CHF),
            "CZK" => Some(Currency::CZK),
            "JPY" => Some(Currency::JPY),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::PLN
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount with associated currency
///
/// Amounts are stored with 4 decimal places internally so intermediate
/// ratio calculations keep precision; everything that gets persisted as a
/// bill share or loan balance is rounded to the currency's minor unit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(4),
            currency,
        }
    }

    /// Creates Money from an integer amount in minor units (e.g., grosze, cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self::new(Decimal::new(minor_units, currency.decimal_places()), currency)
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: dec!(0),
            currency,
        }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    /// Rounds to the currency's minor unit using banker's rounding
    /// (round half to even)
    pub fn round_to_currency(&self) -> Self {
        Self {
            amount: self.amount.round_dp_with_strategy(
                self.currency.decimal_places(),
                RoundingStrategy::MidpointNearestEven,
            ),
            currency: self.currency,
        }
    }

    /// Returns true when the amount carries no digits below the minor unit
    pub fn is_whole_minor_units(&self) -> bool {
        self.round_to_currency().amount == self.amount
    }

    /// Returns the amount expressed in minor units, after rounding to the currency
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        let dp = self.currency.decimal_places();
        let scaled = self.round_to_currency().amount * Decimal::new(10_i64.pow(dp), 0);
        scaled.trunc().to_i64().ok_or(MoneyError::Overflow)
    }

    /// Checked addition that returns an error on currency mismatch
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Self::new(self.amount + other.amount, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Self::new(self.amount - other.amount, self.currency))
    }

    /// Multiplies by a scalar (e.g., a percentage share)
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.amount * factor, self.currency)
    }

    /// Sums an iterator of amounts, all of which must be in `currency`
    pub fn sum<'a>(
        currency: Currency,
        items: impl IntoIterator<Item = &'a Money>,
    ) -> Result<Money, MoneyError> {
        items
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }

    /// Allocates the money into n equal parts, handling remainders
    ///
    /// The remainder is distributed one minor unit at a time among the
    /// first allocations, so the parts always sum to the original amount.
    pub fn allocate(&self, n: u32) -> Result<Vec<Money>, MoneyError> {
        if n == 0 {
            return Err(MoneyError::InvalidAmount("Cannot allocate to zero parts".to_string()));
        }
        self.allocate_by_weights(&vec![Decimal::ONE; n as usize])
    }

    /// Allocates money proportionally to the given weights
    ///
    /// Each share is floored to the minor unit, then the leftover minor units
    /// go one at a time to the first entries in input order. Callers that need
    /// a particular tie-break order sort their inputs before calling.
    pub fn allocate_by_weights(&self, weights: &[Decimal]) -> Result<Vec<Money>, MoneyError> {
        if weights.is_empty() {
            return Err(MoneyError::InvalidAmount("Empty weights".to_string()));
        }
        if weights.iter().any(|w| w.is_sign_negative() && !w.is_zero()) {
            return Err(MoneyError::InvalidAmount("Negative weight".to_string()));
        }

        let total_weight: Decimal = weights.iter().sum();
        if total_weight.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }

        let total_minor = self.to_minor_units()?;
        let magnitude = Decimal::from(total_minor.unsigned_abs());

        let mut shares = Vec::with_capacity(weights.len());
        let mut assigned: i64 = 0;
        for weight in weights {
            let share = (magnitude * *weight / total_weight)
                .floor()
                .to_i64()
                .ok_or(MoneyError::Overflow)?;
            assigned += share;
            shares.push(share);
        }

        let remainder = total_minor.abs() - assigned;
        for share in shares.iter_mut().take(remainder as usize) {
            *share += 1;
        }

        let sign = if total_minor < 0 { -1 } else { 1 };
        Ok(shares
            .into_iter()
            .map(|minor| Money::from_minor(sign * minor, self.currency))
            .collect())
    }

    /// Converts to a float for the forecasting boundary. One-way: never feed
    /// the result back into ledger arithmetic.
    pub fn to_f64_lossy(&self) -> f64 {
        self.amount.to_f64().unwrap_or_default()
    }

    /// Builds a rounded Money value from a float returned by the forecasting
    /// collaborator.
    pub fn from_f64_rounded(value: f64, currency: Currency) -> Result<Self, MoneyError> {
        let amount = Decimal::from_f64(value)
            .ok_or_else(|| MoneyError::InvalidAmount(format!("not a finite amount: {}", value)))?;
        Ok(Self::new(amount, currency).round_to_currency())
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

impl PartialOrd for Money {
    /// Amounts in different currencies are incomparable
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{:.dp$} {}",
            self.amount,
            self.currency.code(),
            dp = dp as usize
        )
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(&other)
            .expect("Currency mismatch in Money::add")
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(&other)
            .expect("Currency mismatch in Money::sub")
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount, self.currency)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        self.multiply(factor)
    }
}

/// A share expressed as a ratio (e.g. 0.25 for a quarter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal value (e.g., 0.05 for 5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g., 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Creates a rate from a fraction; None when the denominator is zero
    pub fn from_fraction(numerator: u32, denominator: u32) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        Some(Self {
            value: Decimal::from(numerator) / Decimal::from(denominator),
        })
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Applies this rate to a money amount and rounds the result to the
    /// currency's minor unit
    pub fn apply(&self, money: &Money) -> Money {
        money.multiply(self.value).round_to_currency()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(10050, Currency::PLN);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_currency_mismatch() {
        let pln = Money::new(dec!(100.00), Currency::PLN);
        let eur = Money::new(dec!(100.00), Currency::EUR);

        let result = pln.checked_add(&eur);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
        assert_eq!(pln.partial_cmp(&eur), None);
    }

    #[test]
    fn test_round_to_currency_is_bankers() {
        assert_eq!(Money::new(dec!(0.125), Currency::PLN).round_to_currency().amount(), dec!(0.12));
        assert_eq!(Money::new(dec!(0.135), Currency::PLN).round_to_currency().amount(), dec!(0.14));
    }

    #[test]
    fn test_allocate_by_weights_gives_remainder_to_first_entries() {
        let m = Money::new(dec!(10.00), Currency::PLN);
        let parts = m.allocate_by_weights(&[dec!(1), dec!(1), dec!(1)]).unwrap();

        assert_eq!(parts[0].amount(), dec!(3.34));
        assert_eq!(parts[1].amount(), dec!(3.33));
        assert_eq!(parts[2].amount(), dec!(3.33));
    }

    #[test]
    fn test_allocate_by_weights_rejects_zero_total() {
        let m = Money::new(dec!(10.00), Currency::PLN);
        assert_eq!(
            m.allocate_by_weights(&[dec!(0), dec!(0)]),
            Err(MoneyError::DivisionByZero)
        );
    }

    #[test]
    fn test_rate_application() {
        let rate = Rate::from_percentage(dec!(33.3333));
        let amount = Money::new(dec!(100.00), Currency::PLN);

        assert_eq!(rate.apply(&amount).amount(), dec!(33.33));
    }
}
