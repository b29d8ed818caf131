//! Bills and their lifecycle
//!
//! A bill moves strictly forward: `Draft -> Posted -> Closed`. Consumptions
//! and allocations may only change while the bill is a draft; once closed,
//! nothing about the bill changes again.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{BillId, BillingPeriod, Money, TemplateId};

use crate::error::BillingError;

/// What the bill is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillKind {
    Electricity,
    Gas,
    Internet,
    /// Shared household budget (groceries, cleaning supplies, ...)
    Shared,
    /// Anything else; described by the bill's custom type
    Other,
}

impl BillKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillKind::Electricity => "electricity",
            BillKind::Gas => "gas",
            BillKind::Internet => "internet",
            BillKind::Shared => "shared",
            BillKind::Other => "other",
        }
    }

    /// Utilities are metered and carry units
    pub fn is_metered(&self) -> bool {
        matches!(self, BillKind::Electricity | BillKind::Gas)
    }
}

impl fmt::Display for BillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "electricity" => Ok(BillKind::Electricity),
            "gas" => Ok(BillKind::Gas),
            "internet" => Ok(BillKind::Internet),
            "shared" => Ok(BillKind::Shared),
            "other" => Ok(BillKind::Other),
            other => Err(BillingError::validation(format!("unknown bill type: {}", other))),
        }
    }
}

/// Lifecycle status of a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    /// Being prepared; consumptions and allocations may change
    Draft,
    /// Shares are final and visible to the household
    Posted,
    /// Settled; read-only from here on
    Closed,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Draft => "draft",
            BillStatus::Posted => "posted",
            BillStatus::Closed => "closed",
        }
    }

    /// Only the two forward steps are legal
    pub fn can_transition_to(&self, target: BillStatus) -> bool {
        matches!(
            (self, target),
            (BillStatus::Draft, BillStatus::Posted) | (BillStatus::Posted, BillStatus::Closed)
        )
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A utility or shared expense for a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub kind: BillKind,
    /// Free-form label, used for `BillKind::Other`
    pub custom_type: Option<String>,
    pub period: BillingPeriod,
    pub total_amount: Money,
    /// Metered units (kWh, m³); absent for unmetered bills
    pub total_units: Option<Decimal>,
    pub status: BillStatus,
    pub payment_deadline: Option<NaiveDate>,
    /// Set when the bill was spawned by a recurring template
    pub recurring_template_id: Option<TemplateId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// Creates a draft bill
    ///
    /// # Errors
    ///
    /// * the total is negative or carries digits below the currency's minor unit
    /// * the units are negative
    pub fn new(
        kind: BillKind,
        period: BillingPeriod,
        total_amount: Money,
        total_units: Option<Decimal>,
    ) -> Result<Self, BillingError> {
        if total_amount.is_negative() {
            return Err(BillingError::validation(format!(
                "total amount must not be negative, got {}",
                total_amount
            )));
        }
        if !total_amount.is_whole_minor_units() {
            return Err(BillingError::validation(format!(
                "total amount {} has more precision than {} allows",
                total_amount.amount(),
                total_amount.currency()
            )));
        }
        if let Some(units) = total_units {
            if units.is_sign_negative() && !units.is_zero() {
                return Err(BillingError::validation(format!(
                    "total units must not be negative, got {}",
                    units
                )));
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: BillId::new_v7(),
            kind,
            custom_type: None,
            period,
            total_amount,
            total_units,
            status: BillStatus::Draft,
            payment_deadline: None,
            recurring_template_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_custom_type(mut self, custom_type: impl Into<String>) -> Self {
        self.custom_type = Some(custom_type.into());
        self
    }

    pub fn with_payment_deadline(mut self, deadline: NaiveDate) -> Self {
        self.payment_deadline = Some(deadline);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.recurring_template_id = Some(template_id);
        self
    }

    pub fn is_draft(&self) -> bool {
        self.status == BillStatus::Draft
    }

    /// Fails unless consumptions and allocations may still change
    pub fn ensure_mutable(&self, operation: &'static str) -> Result<(), BillingError> {
        match self.status {
            BillStatus::Draft => Ok(()),
            BillStatus::Posted => Err(BillingError::InvalidState {
                bill_id: self.id,
                status: self.status,
                operation,
            }),
            BillStatus::Closed => Err(BillingError::Immutable(self.id)),
        }
    }

    /// Checks that the bill may move to `target`
    pub fn ensure_transition(&self, target: BillStatus) -> Result<(), BillingError> {
        if self.status.can_transition_to(target) {
            return Ok(());
        }
        let operation = match target {
            BillStatus::Posted => "post",
            BillStatus::Closed => "close",
            BillStatus::Draft => "reopen",
        };
        Err(BillingError::InvalidState {
            bill_id: self.id,
            status: self.status,
            operation,
        })
    }
}

/// Filter for listing bills; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub kind: Option<BillKind>,
    pub statuses: Vec<BillStatus>,
    /// Bills whose period starts on or after this date
    pub period_from: Option<NaiveDate>,
    /// Bills whose period starts on or before this date
    pub period_to: Option<NaiveDate>,
    pub recurring_template_id: Option<TemplateId>,
}

impl BillFilter {
    pub fn by_kind(kind: BillKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = BillStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.period_from = Some(from);
        self.period_to = Some(to);
        self
    }

    /// In-memory predicate matching the SQL the Postgres adapter builds
    pub fn matches(&self, bill: &Bill) -> bool {
        if let Some(kind) = self.kind {
            if bill.kind != kind {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&bill.status) {
            return false;
        }
        if let Some(from) = self.period_from {
            if bill.period.start() < from {
                return false;
            }
        }
        if let Some(to) = self.period_to {
            if bill.period.start() > to {
                return false;
            }
        }
        if let Some(template_id) = self.recurring_template_id {
            if bill.recurring_template_id != Some(template_id) {
                return false;
            }
        }
        true
    }
}
