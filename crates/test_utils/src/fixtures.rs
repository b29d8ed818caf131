//! Pre-built Test Fixtures
//!
//! Deterministic household data for unit and integration tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{BillingPeriod, Currency, Money, Timezone, UserId};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn pln_100() -> Money {
        Money::new(dec!(100.00), Currency::PLN)
    }

    /// A total that does not divide evenly by three
    pub fn pln_indivisible() -> Money {
        Money::new(dec!(100.01), Currency::PLN)
    }

    pub fn pln_zero() -> Money {
        Money::zero(Currency::PLN)
    }

    /// For currency mismatch tests
    pub fn eur_100() -> Money {
        Money::new(dec!(100.00), Currency::EUR)
    }

    pub fn pln(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::PLN)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
    }

    /// Midday UTC; the same calendar day in every European zone
    pub fn noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .expect("valid fixture instant")
    }

    /// March 2024, the standard period for a single bill
    pub fn march_2024() -> BillingPeriod {
        Self::month(2024, 3)
    }

    /// A whole calendar month
    pub fn month(year: i32, month: u32) -> BillingPeriod {
        let start = Self::date(year, month, 1);
        let end = start
            .checked_add_months(chrono::Months::new(1))
            .and_then(|d| d.pred_opt())
            .expect("valid fixture month");
        BillingPeriod::new(start, end).expect("valid fixture period")
    }

    pub fn warsaw() -> Timezone {
        Timezone::parse("Europe/Warsaw").expect("known timezone")
    }
}

/// Deterministic household members
pub struct IdFixtures;

impl IdFixtures {
    pub fn alice() -> UserId {
        UserId::from_uuid(Uuid::parse_str("00000000-0000-4000-8000-00000000000a").expect("valid uuid"))
    }

    pub fn bob() -> UserId {
        UserId::from_uuid(Uuid::parse_str("00000000-0000-4000-8000-00000000000b").expect("valid uuid"))
    }

    pub fn carol() -> UserId {
        UserId::from_uuid(Uuid::parse_str("00000000-0000-4000-8000-00000000000c").expect("valid uuid"))
    }

    /// Alice, Bob, and Carol in ascending id order
    pub fn household() -> Vec<UserId> {
        vec![Self::alice(), Self::bob(), Self::carol()]
    }
}
