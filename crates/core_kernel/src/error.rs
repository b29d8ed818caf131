//! Core error types used across the system

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::MoneyError;
use crate::temporal::TemporalError;

/// Classification shared by every domain error
///
/// Callers (HTTP layers, schedulers) branch on the kind rather than on the
/// concrete error enum of each domain crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or range
    Validation,
    /// Operation not legal for the current lifecycle state
    InvalidState,
    /// Target record is closed and can no longer change
    Immutable,
    /// Referenced entity is absent
    NotFound,
    /// Shares do not add up to the total they split
    AllocationMismatch,
    /// Payment larger than what is still owed
    ExceedsBalance,
    /// Not enough history to build a forecast request
    InsufficientData,
    /// Storage or collaborator failure
    Infrastructure,
}

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CoreError::InvalidStateTransition(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Money(_) | CoreError::Temporal(_) | CoreError::Validation(_) => {
                ErrorKind::Validation
            }
            CoreError::InvalidStateTransition(_) => ErrorKind::InvalidState,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Configuration(_) => ErrorKind::Infrastructure,
        }
    }
}
