//! PostgreSQL Loan Adapter

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    DomainPort, HealthCheckResult, HealthCheckable, LoanId, LoanPaymentId, Money, PortError, UserId,
};
use domain_loans::{Loan, LoanFilter, LoanPayment, LoanPort, LoanStatus};

use super::{money, ping};
use crate::error::DatabaseError;
use crate::repositories::loans::{DbLoanStatus, LoanPaymentRow, LoanRepository, LoanRow};

/// PostgreSQL-backed `LoanPort`
#[derive(Debug, Clone)]
pub struct PostgresLoanAdapter {
    repository: LoanRepository,
    pool: PgPool,
}

impl PostgresLoanAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: LoanRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresLoanAdapter {}

#[async_trait]
impl HealthCheckable for PostgresLoanAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-loan-adapter").await
    }
}

#[async_trait]
impl LoanPort for PostgresLoanAdapter {
    #[instrument(skip_all, fields(loan_id = %loan.id))]
    async fn insert_loan(&self, loan: &Loan) -> Result<(), PortError> {
        let row = LoanRow {
            loan_id: *loan.id.as_uuid(),
            lender_id: *loan.lender_id.as_uuid(),
            borrower_id: *loan.borrower_id.as_uuid(),
            amount: loan.amount.amount(),
            currency: loan.amount.currency().code().to_string(),
            total_paid: loan.total_paid.amount(),
            status: status_to_db(loan.status),
            note: loan.note.clone(),
            created_at: loan.created_at,
            updated_at: loan.updated_at,
        };
        Ok(self.repository.insert_loan(&row).await?)
    }

    async fn get_loan(&self, id: LoanId) -> Result<Loan, PortError> {
        let row = self.repository.get_loan(*id.as_uuid()).await?;
        Ok(row_to_loan(row)?)
    }

    #[instrument(skip(self))]
    async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, PortError> {
        let rows = self
            .repository
            .list_loans(filter.involving.map(|id| *id.as_uuid()), filter.unsettled_only)
            .await?;
        Ok(rows.into_iter().map(row_to_loan).collect::<Result<_, _>>()?)
    }

    async fn list_payments(&self, loan_id: LoanId) -> Result<Vec<LoanPayment>, PortError> {
        let rows = self.repository.list_payments(*loan_id.as_uuid()).await?;
        Ok(rows.into_iter().map(row_to_payment).collect::<Result<_, _>>()?)
    }

    #[instrument(skip_all, fields(loan_id = %payment.loan_id, amount = %payment.amount))]
    async fn apply_payment(
        &self,
        payment: &LoanPayment,
        expected_total_paid: Money,
        new_total_paid: Money,
        new_status: LoanStatus,
    ) -> Result<Loan, PortError> {
        let row = LoanPaymentRow {
            payment_id: *payment.id.as_uuid(),
            loan_id: *payment.loan_id.as_uuid(),
            amount: payment.amount.amount(),
            currency: payment.amount.currency().code().to_string(),
            paid_at: payment.paid_at,
            note: payment.note.clone(),
            created_at: payment.created_at,
        };
        let updated = self
            .repository
            .apply_payment(
                &row,
                expected_total_paid.amount(),
                new_total_paid.amount(),
                status_to_db(new_status),
            )
            .await?;
        Ok(row_to_loan(updated)?)
    }
}

fn status_to_db(status: LoanStatus) -> DbLoanStatus {
    match status {
        LoanStatus::Open => DbLoanStatus::Open,
        LoanStatus::Partial => DbLoanStatus::Partial,
        LoanStatus::Settled => DbLoanStatus::Settled,
    }
}

fn status_from_db(status: DbLoanStatus) -> LoanStatus {
    match status {
        DbLoanStatus::Open => LoanStatus::Open,
        DbLoanStatus::Partial => LoanStatus::Partial,
        DbLoanStatus::Settled => LoanStatus::Settled,
    }
}

fn row_to_loan(row: LoanRow) -> Result<Loan, DatabaseError> {
    Ok(Loan {
        id: LoanId::from_uuid(row.loan_id),
        lender_id: UserId::from_uuid(row.lender_id),
        borrower_id: UserId::from_uuid(row.borrower_id),
        amount: money(row.amount, &row.currency)?,
        total_paid: money(row.total_paid, &row.currency)?,
        status: status_from_db(row.status),
        note: row.note,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_payment(row: LoanPaymentRow) -> Result<LoanPayment, DatabaseError> {
    Ok(LoanPayment {
        id: LoanPaymentId::from_uuid(row.payment_id),
        loan_id: LoanId::from_uuid(row.loan_id),
        amount: money(row.amount, &row.currency)?,
        paid_at: row.paid_at,
        note: row.note,
        created_at: row.created_at,
    })
}
