//! Loan domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, LoanId, MoneyError, PortError, UserId};

/// Errors that can occur in the loan domain
#[derive(Debug, Error)]
pub enum LoanError {
    /// Input failed a shape or range check
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lender and borrower are the same user
    #[error("User {0} cannot lend to themselves")]
    SameParty(UserId),

    /// Loan not found
    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    /// A lender or borrower is unknown to the directory
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Payment is larger than what is still owed
    #[error("Payment of {amount} exceeds remaining balance {remaining} on loan {loan_id}")]
    ExceedsBalance {
        loan_id: LoanId,
        amount: String,
        remaining: String,
    },

    /// Concurrent payments kept changing the loan
    #[error("Loan {loan_id} changed concurrently {attempts} times; payment not applied")]
    Contention {
        loan_id: LoanId,
        attempts: u32,
    },

    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Storage or collaborator failure
    #[error("Port error: {0}")]
    Port(#[from] PortError),
}

impl LoanError {
    pub fn validation(message: impl Into<String>) -> Self {
        LoanError::Validation(message.into())
    }

    /// Maps the error onto the engine-wide taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoanError::Validation(_) | LoanError::SameParty(_) | LoanError::Money(_) => {
                ErrorKind::Validation
            }
            LoanError::LoanNotFound(_) | LoanError::UserNotFound(_) => ErrorKind::NotFound,
            LoanError::Contention { .. } => ErrorKind::InvalidState,
            LoanError::ExceedsBalance { .. } => ErrorKind::ExceedsBalance,
            LoanError::Port(e) => match e {
                PortError::NotFound { .. } => ErrorKind::NotFound,
                PortError::Validation { .. } => ErrorKind::Validation,
                PortError::Conflict { .. } => ErrorKind::InvalidState,
                _ => ErrorKind::Infrastructure,
            },
        }
    }
}
