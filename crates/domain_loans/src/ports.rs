//! Loan Domain Ports
//!
//! `LoanPort` is the storage boundary for loans and their repayments.
//! Payments are applied with a check-and-set on the loan's repaid total, so
//! two concurrent payments can never both pass the balance check.

use async_trait::async_trait;

use core_kernel::{DomainPort, HealthCheckable, LoanId, Money, PortError};

use crate::loan::{Loan, LoanFilter, LoanPayment, LoanStatus};

#[async_trait]
pub trait LoanPort: DomainPort + HealthCheckable {
    async fn insert_loan(&self, loan: &Loan) -> Result<(), PortError>;

    /// Returns the loan, or `PortError::NotFound`
    async fn get_loan(&self, id: LoanId) -> Result<Loan, PortError>;

    /// Loans matching the filter, oldest first
    async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, PortError>;

    /// Payments against a loan, oldest first
    async fn list_payments(&self, loan_id: LoanId) -> Result<Vec<LoanPayment>, PortError>;

    /// Stores the payment and moves the loan to `new_total_paid`/`new_status`
    /// in one step
    ///
    /// Fails with `Conflict` and writes nothing if the stored total paid is no
    /// longer `expected_total_paid`.
    async fn apply_payment(
        &self,
        payment: &LoanPayment,
        expected_total_paid: Money,
        new_total_paid: Money,
        new_status: LoanStatus,
    ) -> Result<Loan, PortError>;
}

/// In-memory adapter
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use core_kernel::HealthCheckResult;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct State {
        loans: HashMap<LoanId, Loan>,
        payments: Vec<LoanPayment>,
    }

    #[derive(Debug, Default)]
    pub struct MockLoanPort {
        state: RwLock<State>,
    }

    impl MockLoanPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of payments stored across all loans
        pub async fn payment_count(&self) -> usize {
            self.state.read().await.payments.len()
        }
    }

    impl DomainPort for MockLoanPort {}

    #[async_trait]
    impl HealthCheckable for MockLoanPort {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("mock-loan-port")
        }
    }

    #[async_trait]
    impl LoanPort for MockLoanPort {
        async fn insert_loan(&self, loan: &Loan) -> Result<(), PortError> {
            self.state.write().await.loans.insert(loan.id, loan.clone());
            Ok(())
        }

        async fn get_loan(&self, id: LoanId) -> Result<Loan, PortError> {
            self.state
                .read()
                .await
                .loans
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Loan", id))
        }

        async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, PortError> {
            let state = self.state.read().await;
            let mut loans: Vec<Loan> = state
                .loans
                .values()
                .filter(|l| filter.matches(l))
                .cloned()
                .collect();
            loans.sort_by_key(|l| (l.created_at, l.id));
            Ok(loans)
        }

        async fn list_payments(&self, loan_id: LoanId) -> Result<Vec<LoanPayment>, PortError> {
            let state = self.state.read().await;
            let mut payments: Vec<_> = state
                .payments
                .iter()
                .filter(|p| p.loan_id == loan_id)
                .cloned()
                .collect();
            payments.sort_by_key(|p| p.paid_at);
            Ok(payments)
        }

        async fn apply_payment(
            &self,
            payment: &LoanPayment,
            expected_total_paid: Money,
            new_total_paid: Money,
            new_status: LoanStatus,
        ) -> Result<Loan, PortError> {
            let mut state = self.state.write().await;
            let loan = state
                .loans
                .get_mut(&payment.loan_id)
                .ok_or_else(|| PortError::not_found("Loan", payment.loan_id))?;
            if loan.total_paid != expected_total_paid {
                return Err(PortError::conflict(format!(
                    "loan {} total paid is {}, expected {}",
                    loan.id, loan.total_paid, expected_total_paid
                )));
            }
            loan.total_paid = new_total_paid;
            loan.status = new_status;
            loan.updated_at = Utc::now();
            let updated = loan.clone();
            state.payments.push(payment.clone());
            Ok(updated)
        }
    }
}
