//! Loans and repayments
//!
//! A loan's status is derived from what has been repaid; it is only ever set
//! directly at creation (`Open`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{LoanId, LoanPaymentId, Money, UserId};

use crate::error::LoanError;

/// Settlement status of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Nothing repaid yet
    Open,
    /// Partly repaid
    Partial,
    /// Fully repaid
    Settled,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Open => "open",
            LoanStatus::Partial => "partial",
            LoanStatus::Settled => "settled",
        }
    }

    /// Status implied by a repaid total
    pub fn derive(amount: &Money, paid: &Money) -> Self {
        if paid >= amount {
            LoanStatus::Settled
        } else if paid.is_positive() {
            LoanStatus::Partial
        } else {
            LoanStatus::Open
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Money one user lent another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub lender_id: UserId,
    pub borrower_id: UserId,
    pub amount: Money,
    /// Sum of all payments; the version checked when a payment is applied
    pub total_paid: Money,
    pub status: LoanStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Creates an open loan
    ///
    /// # Errors
    ///
    /// * lender and borrower are the same user
    /// * amount is not positive or is finer than the currency's minor unit
    pub fn new(
        lender_id: UserId,
        borrower_id: UserId,
        amount: Money,
        note: Option<String>,
    ) -> Result<Self, LoanError> {
        if lender_id == borrower_id {
            return Err(LoanError::SameParty(lender_id));
        }
        ensure_payable_amount(&amount, "loan amount")?;

        let now = Utc::now();
        Ok(Self {
            id: LoanId::new_v7(),
            lender_id,
            borrower_id,
            amount,
            total_paid: Money::zero(amount.currency()),
            status: LoanStatus::Open,
            note,
            created_at: now,
            updated_at: now,
        })
    }

    /// What the borrower still owes
    pub fn remaining(&self) -> Money {
        let remaining = self.amount - self.total_paid;
        if remaining.is_negative() {
            Money::zero(self.amount.currency())
        } else {
            remaining
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status == LoanStatus::Settled
    }

    /// Checks a repayment against the loan as currently read
    ///
    /// A settled loan has nothing remaining, so any payment against it fails
    /// with `ExceedsBalance`. Returns the new repaid total and status. The caller persists them
    /// conditionally on `total_paid` being unchanged.
    pub fn plan_payment(&self, amount: &Money) -> Result<PaymentPlan, LoanError> {
        if amount.currency() != self.amount.currency() {
            return Err(LoanError::validation(format!(
                "payment is in {}, loan is in {}",
                amount.currency(),
                self.amount.currency()
            )));
        }
        ensure_payable_amount(amount, "payment amount")?;

        let remaining = if self.is_settled() {
            Money::zero(self.amount.currency())
        } else {
            self.remaining()
        };
        if *amount > remaining {
            return Err(LoanError::ExceedsBalance {
                loan_id: self.id,
                amount: amount.to_string(),
                remaining: remaining.to_string(),
            });
        }

        let new_total_paid = self.total_paid.checked_add(amount)?;
        Ok(PaymentPlan {
            expected_total_paid: self.total_paid,
            new_total_paid,
            new_status: LoanStatus::derive(&self.amount, &new_total_paid),
        })
    }
}

/// Outcome of a checked repayment, applied only if `expected_total_paid`
/// still matches storage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaymentPlan {
    pub expected_total_paid: Money,
    pub new_total_paid: Money,
    pub new_status: LoanStatus,
}

/// A single repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanPayment {
    pub id: LoanPaymentId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoanPayment {
    pub fn new(loan_id: LoanId, amount: Money, paid_at: DateTime<Utc>, note: Option<String>) -> Self {
        Self {
            id: LoanPaymentId::new_v7(),
            loan_id,
            amount,
            paid_at,
            note,
            created_at: Utc::now(),
        }
    }
}

/// Filter for listing loans; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    /// Loans where this user is lender or borrower
    pub involving: Option<UserId>,
    /// Skip settled loans
    pub unsettled_only: bool,
}

impl LoanFilter {
    pub fn unsettled() -> Self {
        Self {
            involving: None,
            unsettled_only: true,
        }
    }

    pub fn involving(user: UserId) -> Self {
        Self {
            involving: Some(user),
            unsettled_only: false,
        }
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        if self.unsettled_only && loan.is_settled() {
            return false;
        }
        match self.involving {
            Some(user) => loan.lender_id == user || loan.borrower_id == user,
            None => true,
        }
    }
}

fn ensure_payable_amount(amount: &Money, what: &str) -> Result<(), LoanError> {
    if !amount.is_positive() {
        return Err(LoanError::validation(format!("{} must be positive, got {}", what, amount)));
    }
    if !amount.is_whole_minor_units() {
        return Err(LoanError::validation(format!(
            "{} {} has more precision than {} allows",
            what,
            amount.amount(),
            amount.currency()
        )));
    }
    Ok(())
}
