//! Billing domain errors

use thiserror::Error;

use core_kernel::{
    BillId, ErrorKind, Money, MoneyError, PortError, TemplateId, TemporalError,
};

use crate::bill::BillStatus;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Input failed a shape or range check
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the bill's current status
    #[error("Bill {bill_id} is {status}; cannot {operation}")]
    InvalidState {
        bill_id: BillId,
        status: BillStatus,
        operation: &'static str,
    },

    /// Bill is closed
    #[error("Bill {0} is closed and can no longer change")]
    Immutable(BillId),

    /// Bill not found
    #[error("Bill not found: {0}")]
    BillNotFound(BillId),

    /// Recurring template not found
    #[error("Recurring template not found: {0}")]
    TemplateNotFound(TemplateId),

    /// Concurrent writers kept changing the template
    #[error("Recurring template {template_id} changed concurrently {attempts} times; not written")]
    TemplateContention {
        template_id: TemplateId,
        attempts: u32,
    },

    /// A user or group referenced by an allocation is unknown
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    /// Shares do not add up to what they split
    #[error("Allocation mismatch: expected {expected}, got {actual}")]
    AllocationMismatch {
        expected: String,
        actual: String,
    },

    /// Not enough history to ask for a forecast
    #[error("Insufficient data for {target} forecast: {points} data points, need at least {required}")]
    InsufficientData {
        target: String,
        points: usize,
        required: usize,
    },

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    /// Storage or collaborator failure
    #[error("Port error: {0}")]
    Port(#[from] PortError),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn amount_mismatch(expected: Money, actual: Money) -> Self {
        BillingError::AllocationMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Maps the error onto the engine-wide taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::Validation(_)
            | BillingError::Money(_)
            | BillingError::Temporal(_) => ErrorKind::Validation,
            BillingError::InvalidState { .. } | BillingError::TemplateContention { .. } => {
                ErrorKind::InvalidState
            }
            BillingError::Immutable(_) => ErrorKind::Immutable,
            BillingError::BillNotFound(_)
            | BillingError::TemplateNotFound(_)
            | BillingError::SubjectNotFound(_) => ErrorKind::NotFound,
            BillingError::AllocationMismatch { .. } => ErrorKind::AllocationMismatch,
            BillingError::InsufficientData { .. } => ErrorKind::InsufficientData,
            BillingError::Port(e) => match e {
                PortError::NotFound { .. } => ErrorKind::NotFound,
                PortError::Validation { .. } => ErrorKind::Validation,
                PortError::Conflict { .. } => ErrorKind::InvalidState,
                _ => ErrorKind::Infrastructure,
            },
        }
    }
}
