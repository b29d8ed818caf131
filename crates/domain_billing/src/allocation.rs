//! Allocation calculator
//!
//! Splits a bill's total between users and groups. For every method the
//! resulting shares add up to the bill total exactly: shares are floored to
//! the currency's minor unit and the leftover minor units are handed out one
//! at a time in subject order (users before groups, then ascending id).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use core_kernel::{AllocationId, BillId, Money, Subject, DEFAULT_GROUP_WEIGHT};

use crate::bill::Bill;
use crate::error::BillingError;

/// How a bill total is split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// By metered units
    Proportional,
    /// Same share for everyone
    Equal,
    /// By weight; subjects without a weight count as 1.0
    Weight,
    /// Caller supplies every share
    Override,
}

impl AllocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMethod::Proportional => "proportional",
            AllocationMethod::Equal => "equal",
            AllocationMethod::Weight => "weight",
            AllocationMethod::Override => "override",
        }
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationMethod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proportional" => Ok(AllocationMethod::Proportional),
            "equal" => Ok(AllocationMethod::Equal),
            "weight" => Ok(AllocationMethod::Weight),
            "override" => Ok(AllocationMethod::Override),
            other => Err(BillingError::validation(format!("unknown allocation method: {}", other))),
        }
    }
}

/// One subject taking part in a split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationInput {
    pub subject: Subject,
    /// Consumed units; required for proportional splits
    pub units: Option<Decimal>,
    /// Relative weight for weighted splits
    pub weight: Option<Decimal>,
    /// Exact share for override splits
    pub amount: Option<Money>,
}

impl AllocationInput {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            units: None,
            weight: None,
            amount: None,
        }
    }

    pub fn with_units(mut self, units: Decimal) -> Self {
        self.units = Some(units);
        self
    }

    pub fn with_weight(mut self, weight: Decimal) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// A subject's computed share, before it is attached to a bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationShare {
    pub subject: Subject,
    pub amount: Money,
    pub units: Decimal,
}

/// A subject's persisted share of a bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub bill_id: BillId,
    pub subject: Subject,
    pub amount: Money,
    pub units: Decimal,
    pub method: AllocationMethod,
    pub created_at: DateTime<Utc>,
}

impl Allocation {
    pub fn from_share(bill_id: BillId, method: AllocationMethod, share: AllocationShare) -> Self {
        Self {
            id: AllocationId::new_v7(),
            bill_id,
            subject: share.subject,
            amount: share.amount,
            units: share.units,
            method,
            created_at: Utc::now(),
        }
    }
}

/// Splits `total` between `inputs` according to `method`
///
/// The output is ordered by subject. Either every share is produced or an
/// error is returned; there are no partial results.
///
/// # Errors
///
/// * `Validation` - no subjects, duplicate subjects, missing or negative
///   units/weights/amounts, zero unit or weight total
/// * `AllocationMismatch` - override shares do not sum to `total`
pub fn calculate(
    total: Money,
    inputs: &[AllocationInput],
    method: AllocationMethod,
) -> Result<Vec<AllocationShare>, BillingError> {
    if inputs.is_empty() {
        return Err(BillingError::validation("at least one subject is required"));
    }
    if total.is_negative() {
        return Err(BillingError::validation(format!("cannot allocate a negative total {}", total)));
    }

    let mut sorted: Vec<&AllocationInput> = inputs.iter().collect();
    sorted.sort_by_key(|input| input.subject);

    let mut seen = BTreeSet::new();
    for input in &sorted {
        if !seen.insert(input.subject) {
            return Err(BillingError::validation(format!(
                "subject {} appears more than once",
                input.subject
            )));
        }
        if let Some(units) = input.units {
            ensure_not_negative("units", input.subject, units)?;
        }
    }

    let amounts = match method {
        AllocationMethod::Equal => total.allocate(sorted.len() as u32)?,
        AllocationMethod::Proportional => {
            let units = sorted
                .iter()
                .map(|input| {
                    input.units.ok_or_else(|| {
                        BillingError::validation(format!(
                            "subject {} has no units for a proportional split",
                            input.subject
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            split_by(total, &units, "units")?
        }
        AllocationMethod::Weight => {
            let weights = sorted
                .iter()
                .map(|input| {
                    let weight = input.weight.unwrap_or(DEFAULT_GROUP_WEIGHT);
                    ensure_not_negative("weight", input.subject, weight)?;
                    Ok(weight)
                })
                .collect::<Result<Vec<_>, BillingError>>()?;
            split_by(total, &weights, "weights")?
        }
        AllocationMethod::Override => override_amounts(total, &sorted)?,
    };

    Ok(sorted
        .into_iter()
        .zip(amounts)
        .map(|(input, amount)| AllocationShare {
            subject: input.subject,
            amount,
            units: input.units.unwrap_or(Decimal::ZERO),
        })
        .collect())
}

/// Computes allocations for a bill and attaches them to it
pub fn allocate_bill(
    bill: &Bill,
    inputs: &[AllocationInput],
    method: AllocationMethod,
) -> Result<Vec<Allocation>, BillingError> {
    Ok(calculate(bill.total_amount, inputs, method)?
        .into_iter()
        .map(|share| Allocation::from_share(bill.id, method, share))
        .collect())
}

fn split_by(total: Money, weights: &[Decimal], what: &str) -> Result<Vec<Money>, BillingError> {
    let sum: Decimal = weights.iter().sum();
    if sum.is_zero() {
        return Err(BillingError::validation(format!("{} sum to zero; nothing to split by", what)));
    }
    Ok(total.allocate_by_weights(weights)?)
}

fn override_amounts(total: Money, inputs: &[&AllocationInput]) -> Result<Vec<Money>, BillingError> {
    let mut amounts = Vec::with_capacity(inputs.len());
    for input in inputs {
        let amount = input.amount.ok_or_else(|| {
            BillingError::validation(format!("subject {} has no override amount", input.subject))
        })?;
        if amount.is_negative() {
            return Err(BillingError::validation(format!(
                "override amount for {} must not be negative, got {}",
                input.subject, amount
            )));
        }
        if !amount.is_whole_minor_units() {
            return Err(BillingError::validation(format!(
                "override amount for {} has more precision than {} allows, got {}",
                input.subject,
                amount.currency(),
                amount.amount()
            )));
        }
        amounts.push(amount);
    }

    let sum = Money::sum(total.currency(), &amounts)?;
    if sum != total {
        return Err(BillingError::amount_mismatch(total, sum));
    }
    Ok(amounts)
}

fn ensure_not_negative(what: &str, subject: Subject, value: Decimal) -> Result<(), BillingError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(BillingError::validation(format!(
            "{} for {} must not be negative, got {}",
            what, subject, value
        )));
    }
    Ok(())
}
