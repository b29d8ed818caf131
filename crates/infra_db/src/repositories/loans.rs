//! Loan repository implementation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

const LOAN_COLUMNS: &str =
    "loan_id, lender_id, borrower_id, amount, currency, total_paid, status, note, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct LoanRepository {
    pool: PgPool,
}

impl LoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_loan(&self, row: &LoanRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                loan_id, lender_id, borrower_id, amount, currency, total_paid,
                status, note, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.loan_id)
        .bind(row.lender_id)
        .bind(row.borrower_id)
        .bind(row.amount)
        .bind(&row.currency)
        .bind(row.total_paid)
        .bind(row.status)
        .bind(&row.note)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_loan(&self, loan_id: Uuid) -> Result<LoanRow, DatabaseError> {
        sqlx::query_as::<_, LoanRow>(&format!("SELECT {} FROM loans WHERE loan_id = $1", LOAN_COLUMNS))
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Loan", loan_id))
    }

    /// Loans where `involving` is either party (if set), oldest first
    pub async fn list_loans(
        &self,
        involving: Option<Uuid>,
        unsettled_only: bool,
    ) -> Result<Vec<LoanRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM loans
            WHERE ($1::uuid IS NULL OR lender_id = $1 OR borrower_id = $1)
              AND (NOT $2 OR status <> 'settled')
            ORDER BY created_at, loan_id
            "#,
            LOAN_COLUMNS
        );
        let rows = sqlx::query_as::<_, LoanRow>(&sql)
            .bind(involving)
            .bind(unsettled_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn list_payments(&self, loan_id: Uuid) -> Result<Vec<LoanPaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, LoanPaymentRow>(
            r#"
            SELECT payment_id, loan_id, amount, currency, paid_at, note, created_at
            FROM loan_payments
            WHERE loan_id = $1
            ORDER BY paid_at, payment_id
            "#,
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Check-and-set on `total_paid`, then the payment insert, in one
    /// transaction
    pub async fn apply_payment(
        &self,
        payment: &LoanPaymentRow,
        expected_total_paid: Decimal,
        new_total_paid: Decimal,
        new_status: DbLoanStatus,
    ) -> Result<LoanRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE loans SET total_paid = $3, status = $4, updated_at = $5
            WHERE loan_id = $1 AND total_paid = $2
            RETURNING {}
            "#,
            LOAN_COLUMNS
        );
        let updated = sqlx::query_as::<_, LoanRow>(&sql)
            .bind(payment.loan_id)
            .bind(expected_total_paid)
            .bind(new_total_paid)
            .bind(new_status)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(loan) = updated else {
            tx.rollback().await?;
            let current = self.get_loan(payment.loan_id).await?;
            return Err(DatabaseError::Conflict(format!(
                "loan {} total paid is {}, expected {}",
                payment.loan_id, current.total_paid, expected_total_paid
            )));
        };

        sqlx::query(
            r#"
            INSERT INTO loan_payments (payment_id, loan_id, amount, currency, paid_at, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.loan_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.paid_at)
        .bind(&payment.note)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(loan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "loan_status", rename_all = "snake_case")]
pub enum DbLoanStatus {
    Open,
    Partial,
    Settled,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoanRow {
    pub loan_id: Uuid,
    pub lender_id: Uuid,
    pub borrower_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub total_paid: Decimal,
    pub status: DbLoanStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoanPaymentRow {
    pub payment_id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
