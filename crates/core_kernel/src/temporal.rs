//! Calendar handling for billing periods and recurring schedules
//!
//! This module provides:
//! - `Timezone`: the household's local zone, used to turn an instant into a calendar date
//! - `BillingPeriod`: an inclusive date range a bill covers
//! - `Frequency`: monthly/quarterly/yearly recurrence with day-of-month pinning
//!
//! Day-of-month policy: when the requested day does not exist in the target
//! month (e.g. 31 in April) the date is clamped to the month's last day.
//! The requested day is kept by the caller, so the following advance pins
//! back to it (Mar 31 -> Apr 30 -> May 31).

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timezone wrapper for the household's local calendar
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Tz::from_str(&s)
            .map(Timezone)
            .map_err(|_| serde::de::Error::custom(format!("Invalid timezone: {}", s)))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA zone name such as "Europe/Warsaw"
    pub fn parse(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| TemporalError::UnknownTimezone(name.to_string()))
    }

    /// Returns the local calendar date of a UTC instant
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.0).date_naive()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} is after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Day of month {0} is outside 1..=31")]
    InvalidDayOfMonth(u32),

    #[error("Date out of supported range")]
    OutOfRange,

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Unknown frequency: {0}")]
    UnknownFrequency(String),
}

/// Inclusive date range covered by a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl BillingPeriod {
    /// Creates a period; start may equal end but never follow it
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Checks whether a date falls within the period (inclusive)
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Checks whether two periods share at least one day
    pub fn overlaps(&self, other: &BillingPeriod) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// How often a recurring bill is generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Number of calendar months in one unit of this frequency
    pub fn months(&self) -> u32 {
        match self {
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
            Frequency::Yearly => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Moves one frequency unit forward from `from` and pins the result to
    /// `day_of_month`, clamped to the target month's last day.
    pub fn advance(&self, from: NaiveDate, day_of_month: u32) -> Result<NaiveDate, TemporalError> {
        let shifted = from
            .checked_add_months(Months::new(self.months()))
            .ok_or(TemporalError::OutOfRange)?;
        pin_day_of_month(shifted, day_of_month)
    }

    /// The billing period that ends on `due`: one frequency unit back, inclusive
    /// of both ends. Month arithmetic clamps to the last valid day.
    pub fn period_ending(&self, due: NaiveDate) -> Result<BillingPeriod, TemporalError> {
        let start = due
            .checked_sub_months(Months::new(self.months()))
            .ok_or(TemporalError::OutOfRange)?;
        BillingPeriod::new(start, due)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(TemporalError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Number of days in the given month
pub fn days_in_month(year: i32, month: u32) -> Result<u32, TemporalError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(TemporalError::OutOfRange)?;
    let next_first = first
        .checked_add_months(Months::new(1))
        .ok_or(TemporalError::OutOfRange)?;
    Ok(next_first.signed_duration_since(first).num_days() as u32)
}

/// Replaces the day of `date` with `day_of_month`, clamped to the month's length
pub fn pin_day_of_month(date: NaiveDate, day_of_month: u32) -> Result<NaiveDate, TemporalError> {
    if !(1..=31).contains(&day_of_month) {
        return Err(TemporalError::InvalidDayOfMonth(day_of_month));
    }
    let last = days_in_month(date.year(), date.month())?;
    NaiveDate::from_ymd_opt(date.year(), date.month(), day_of_month.min(last))
        .ok_or(TemporalError::OutOfRange)
}
