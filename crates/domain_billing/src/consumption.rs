//! Metered consumption readings
//!
//! Readings are append-only. A correction is a new reading; the latest one
//! per user wins when shares are derived from consumption.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{BillId, ConsumptionId, UserId};

use crate::error::BillingError;

/// Who entered the reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionSource {
    User,
    Admin,
}

impl ConsumptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionSource::User => "user",
            ConsumptionSource::Admin => "admin",
        }
    }
}

/// A single user's usage against a bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumption {
    pub id: ConsumptionId,
    pub bill_id: BillId,
    pub user_id: UserId,
    pub units: Decimal,
    /// Raw meter reading the units were derived from, if any
    pub meter_value: Option<Decimal>,
    pub source: ConsumptionSource,
    pub recorded_at: DateTime<Utc>,
}

impl Consumption {
    pub fn new(
        bill_id: BillId,
        user_id: UserId,
        units: Decimal,
        source: ConsumptionSource,
    ) -> Result<Self, BillingError> {
        if units.is_sign_negative() && !units.is_zero() {
            return Err(BillingError::validation(format!(
                "consumption units must not be negative, got {}",
                units
            )));
        }
        Ok(Self {
            id: ConsumptionId::new_v7(),
            bill_id,
            user_id,
            units,
            meter_value: None,
            source,
            recorded_at: Utc::now(),
        })
    }

    pub fn with_meter_value(mut self, meter_value: Decimal) -> Self {
        self.meter_value = Some(meter_value);
        self
    }

    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = at;
        self
    }
}

/// Units per user, taking the most recent reading of each user
///
/// Readings with equal timestamps resolve to the one appearing later in
/// the slice.
pub fn latest_units_per_user(readings: &[Consumption]) -> BTreeMap<UserId, Decimal> {
    let mut latest: BTreeMap<UserId, &Consumption> = BTreeMap::new();
    for reading in readings {
        match latest.get(&reading.user_id) {
            Some(current) if current.recorded_at > reading.recorded_at => {}
            _ => {
                latest.insert(reading.user_id, reading);
            }
        }
    }
    latest.into_iter().map(|(user, c)| (user, c.units)).collect()
}
