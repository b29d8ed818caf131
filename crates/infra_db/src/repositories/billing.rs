//! Billing repository implementation
//!
//! SQL for bills, consumptions, allocations, recurring templates and
//! predictions. Rows here mirror the tables one to one; turning them into
//! domain values is the adapter's job.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;

const BILL_COLUMNS: &str = "bill_id, kind, custom_type, period_start, period_end, total_amount, \
    currency, total_units, status, payment_deadline, recurring_template_id, notes, created_at, updated_at";

const TEMPLATE_COLUMNS: &str = "template_id, custom_type, frequency, day_of_month, amount, currency, \
    allocations, notes, next_due_date, last_generated_at, is_active, created_at, updated_at";

/// Repository for bills and everything hanging off them
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Bills
    // ========================================================================

    pub async fn insert_bill(&self, bill: &BillRow) -> Result<(), DatabaseError> {
        insert_bill(&mut *self.pool.acquire().await?, bill).await
    }

    pub async fn get_bill(&self, bill_id: Uuid) -> Result<BillRow, DatabaseError> {
        sqlx::query_as::<_, BillRow>(&format!("SELECT {} FROM bills WHERE bill_id = $1", BILL_COLUMNS))
            .bind(bill_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Bill", bill_id))
    }

    /// Bills matching every set criterion, oldest period first
    ///
    /// `period_from`/`period_to` bound the period start, inclusive.
    pub async fn list_bills(&self, filter: &BillQuery) -> Result<Vec<BillRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM bills
            WHERE ($1::bill_kind IS NULL OR kind = $1)
              AND (cardinality($2::bill_status[]) = 0 OR status = ANY($2))
              AND ($3::date IS NULL OR period_start >= $3)
              AND ($4::date IS NULL OR period_start <= $4)
              AND ($5::uuid IS NULL OR recurring_template_id = $5)
            ORDER BY period_start, created_at
            "#,
            BILL_COLUMNS
        );
        let rows = sqlx::query_as::<_, BillRow>(&sql)
            .bind(filter.kind)
            .bind(&filter.statuses)
            .bind(filter.period_from)
            .bind(filter.period_to)
            .bind(filter.recurring_template_id)
            .fetch_all(&self.pool)
            .await?;
        debug!(count = rows.len(), "bills listed");
        Ok(rows)
    }

    /// Moves a bill from `from` to `to` only if it is still in `from`
    pub async fn transition_status(
        &self,
        bill_id: Uuid,
        from: DbBillStatus,
        to: DbBillStatus,
    ) -> Result<BillRow, DatabaseError> {
        let sql = format!(
            "UPDATE bills SET status = $3, updated_at = $4 WHERE bill_id = $1 AND status = $2 RETURNING {}",
            BILL_COLUMNS
        );
        let updated = sqlx::query_as::<_, BillRow>(&sql)
            .bind(bill_id)
            .bind(from)
            .bind(to)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Ok(row),
            None => {
                let current = self.get_bill(bill_id).await?;
                Err(DatabaseError::Conflict(format!(
                    "bill {} is {:?}, expected {:?}",
                    bill_id, current.status, from
                )))
            }
        }
    }

    // ========================================================================
    // Consumptions and allocations
    // ========================================================================

    /// Inserts a reading while holding the bill's row lock
    pub async fn insert_consumption(&self, row: &ConsumptionRow) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        lock_draft_bill(&mut tx, row.bill_id).await?;

        sqlx::query(
            r#"
            INSERT INTO consumptions (
                consumption_id, bill_id, user_id, units, meter_value, source, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.consumption_id)
        .bind(row.bill_id)
        .bind(row.user_id)
        .bind(row.units)
        .bind(row.meter_value)
        .bind(row.source)
        .bind(row.recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_consumptions(&self, bill_id: Uuid) -> Result<Vec<ConsumptionRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ConsumptionRow>(
            r#"
            SELECT consumption_id, bill_id, user_id, units, meter_value, source, recorded_at
            FROM consumptions
            WHERE bill_id = $1
            ORDER BY recorded_at, consumption_id
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Deletes the bill's allocations and inserts `rows` in one transaction
    pub async fn replace_allocations(
        &self,
        bill_id: Uuid,
        rows: &[AllocationRow],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        lock_draft_bill(&mut tx, bill_id).await?;

        sqlx::query("DELETE FROM allocations WHERE bill_id = $1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            insert_allocation(&mut tx, row).await?;
        }

        tx.commit().await?;
        debug!(bill_id = %bill_id, count = rows.len(), "allocations replaced");
        Ok(())
    }

    pub async fn list_allocations(&self, bill_id: Uuid) -> Result<Vec<AllocationRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT allocation_id, bill_id, subject_type, subject_id, amount, currency, units, method, created_at
            FROM allocations
            WHERE bill_id = $1
            ORDER BY subject_type, subject_id
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ========================================================================
    // Recurring templates
    // ========================================================================

    pub async fn insert_template(&self, row: &TemplateRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO recurring_bill_templates (
                template_id, custom_type, frequency, day_of_month, amount, currency,
                allocations, notes, next_due_date, last_generated_at, is_active,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(row.template_id)
        .bind(&row.custom_type)
        .bind(row.frequency)
        .bind(row.day_of_month)
        .bind(row.amount)
        .bind(&row.currency)
        .bind(&row.allocations)
        .bind(&row.notes)
        .bind(row.next_due_date)
        .bind(row.last_generated_at)
        .bind(row.is_active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<TemplateRow, DatabaseError> {
        sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM recurring_bill_templates WHERE template_id = $1",
            TEMPLATE_COLUMNS
        ))
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("RecurringBillTemplate", template_id))
    }

    pub async fn list_templates(&self, active_only: bool) -> Result<Vec<TemplateRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM recurring_bill_templates WHERE (NOT $1 OR is_active) ORDER BY created_at",
            TEMPLATE_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Overwrites a template that is still at `expected`
    pub async fn update_template(
        &self,
        row: &TemplateRow,
        expected: &TemplateVersionRow,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE recurring_bill_templates SET
                custom_type = $2, frequency = $3, day_of_month = $4, amount = $5,
                currency = $6, allocations = $7, notes = $8, next_due_date = $9,
                last_generated_at = $10, is_active = $11, updated_at = $12
            WHERE template_id = $1
              AND next_due_date = $13 AND is_active = $14 AND updated_at = $15
            "#,
        )
        .bind(row.template_id)
        .bind(&row.custom_type)
        .bind(row.frequency)
        .bind(row.day_of_month)
        .bind(row.amount)
        .bind(&row.currency)
        .bind(&row.allocations)
        .bind(&row.notes)
        .bind(row.next_due_date)
        .bind(row.last_generated_at)
        .bind(row.is_active)
        .bind(row.updated_at)
        .bind(expected.next_due_date)
        .bind(expected.is_active)
        .bind(expected.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.get_template(row.template_id).await?;
            return Err(DatabaseError::Conflict(format!(
                "template {} changed since it was read",
                row.template_id
            )));
        }
        Ok(())
    }

    pub async fn list_due_templates(&self, today: NaiveDate) -> Result<Vec<TemplateRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            SELECT {}
            FROM recurring_bill_templates
            WHERE is_active AND next_due_date <= $1
            ORDER BY next_due_date, template_id
            "#,
            TEMPLATE_COLUMNS
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Advances the template and stores the generated bill in one transaction
    ///
    /// The advance only matches while the template is active and still due on
    /// `expected_due_date`; a concurrent sweep that got there first leaves
    /// nothing to update and the whole generation is rolled back.
    pub async fn commit_generation(&self, generation: &GenerationRows) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let advanced = sqlx::query(
            r#"
            UPDATE recurring_bill_templates
            SET next_due_date = $2, last_generated_at = $3, updated_at = $3
            WHERE template_id = $1 AND is_active AND next_due_date = $4
            "#,
        )
        .bind(generation.template_id)
        .bind(generation.next_due_date)
        .bind(generation.generated_at)
        .bind(generation.expected_due_date)
        .execute(&mut *tx)
        .await?;

        if advanced.rows_affected() == 0 {
            tx.rollback().await?;
            self.get_template(generation.template_id).await?;
            return Err(DatabaseError::Conflict(format!(
                "template {} already advanced past {}",
                generation.template_id, generation.expected_due_date
            )));
        }

        insert_bill(&mut *tx, &generation.bill).await?;
        for row in &generation.allocations {
            insert_allocation(&mut tx, row).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Predictions
    // ========================================================================

    pub async fn insert_prediction(&self, row: &PredictionRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO predictions (
                prediction_id, target, period_start, period_end, horizon_months,
                predicted_units, predicted_amount, currency, model_name, model_version,
                created_from, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(row.prediction_id)
        .bind(row.target)
        .bind(row.period_start)
        .bind(row.period_end)
        .bind(row.horizon_months)
        .bind(row.predicted_units)
        .bind(row.predicted_amount)
        .bind(&row.currency)
        .bind(&row.model_name)
        .bind(&row.model_version)
        .bind(&row.created_from)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_predictions(
        &self,
        target: Option<DbForecastTarget>,
    ) -> Result<Vec<PredictionRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT prediction_id, target, period_start, period_end, horizon_months,
                   predicted_units, predicted_amount, currency, model_name, model_version,
                   created_from, created_at
            FROM predictions
            WHERE ($1::forecast_target IS NULL OR target = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(target)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Locks the bill row for the rest of the transaction and checks it is a draft
async fn lock_draft_bill(tx: &mut Transaction<'_, Postgres>, bill_id: Uuid) -> Result<(), DatabaseError> {
    let status: Option<DbBillStatus> =
        sqlx::query_scalar("SELECT status FROM bills WHERE bill_id = $1 FOR UPDATE")
            .bind(bill_id)
            .fetch_optional(&mut **tx)
            .await?;

    match status {
        None => Err(DatabaseError::not_found("Bill", bill_id)),
        Some(DbBillStatus::Draft) => Ok(()),
        Some(other) => Err(DatabaseError::Conflict(format!("bill {} is {:?}", bill_id, other))),
    }
}

async fn insert_bill(conn: &mut sqlx::PgConnection, bill: &BillRow) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO bills (
            bill_id, kind, custom_type, period_start, period_end, total_amount, currency,
            total_units, status, payment_deadline, recurring_template_id, notes,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(bill.bill_id)
    .bind(bill.kind)
    .bind(&bill.custom_type)
    .bind(bill.period_start)
    .bind(bill.period_end)
    .bind(bill.total_amount)
    .bind(&bill.currency)
    .bind(bill.total_units)
    .bind(bill.status)
    .bind(bill.payment_deadline)
    .bind(bill.recurring_template_id)
    .bind(&bill.notes)
    .bind(bill.created_at)
    .bind(bill.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_allocation(
    tx: &mut Transaction<'_, Postgres>,
    row: &AllocationRow,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO allocations (
            allocation_id, bill_id, subject_type, subject_id, amount, currency, units, method, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(row.allocation_id)
    .bind(row.bill_id)
    .bind(row.subject_type)
    .bind(row.subject_id)
    .bind(row.amount)
    .bind(&row.currency)
    .bind(row.units)
    .bind(row.method)
    .bind(row.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ============================================================================
// Database enum types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "bill_kind", rename_all = "snake_case")]
pub enum DbBillKind {
    Electricity,
    Gas,
    Internet,
    Shared,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "bill_status", rename_all = "snake_case")]
pub enum DbBillStatus {
    Draft,
    Posted,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "consumption_source", rename_all = "snake_case")]
pub enum DbConsumptionSource {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "allocation_method", rename_all = "snake_case")]
pub enum DbAllocationMethod {
    Proportional,
    Equal,
    Weight,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "subject_type", rename_all = "snake_case")]
pub enum DbSubjectType {
    User,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "bill_frequency", rename_all = "snake_case")]
pub enum DbFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "forecast_target", rename_all = "snake_case")]
pub enum DbForecastTarget {
    Electricity,
    Gas,
    SharedBudget,
}

// ============================================================================
// Rows
// ============================================================================

/// Filter arguments for `list_bills`
#[derive(Debug, Clone, Default)]
pub struct BillQuery {
    pub kind: Option<DbBillKind>,
    pub statuses: Vec<DbBillStatus>,
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub recurring_template_id: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BillRow {
    pub bill_id: Uuid,
    pub kind: DbBillKind,
    pub custom_type: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_amount: Decimal,
    pub currency: String,
    pub total_units: Option<Decimal>,
    pub status: DbBillStatus,
    pub payment_deadline: Option<NaiveDate>,
    pub recurring_template_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConsumptionRow {
    pub consumption_id: Uuid,
    pub bill_id: Uuid,
    pub user_id: Uuid,
    pub units: Decimal,
    pub meter_value: Option<Decimal>,
    pub source: DbConsumptionSource,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AllocationRow {
    pub allocation_id: Uuid,
    pub bill_id: Uuid,
    pub subject_type: DbSubjectType,
    pub subject_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub units: Decimal,
    pub method: DbAllocationMethod,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateRow {
    pub template_id: Uuid,
    pub custom_type: String,
    pub frequency: DbFrequency,
    pub day_of_month: i32,
    pub amount: Decimal,
    pub currency: String,
    /// Serialized template allocations
    pub allocations: serde_json::Value,
    pub notes: Option<String>,
    pub next_due_date: NaiveDate,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PredictionRow {
    pub prediction_id: Uuid,
    pub target: DbForecastTarget,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub horizon_months: i32,
    pub predicted_units: Decimal,
    pub predicted_amount: Decimal,
    pub currency: String,
    pub model_name: String,
    pub model_version: String,
    pub created_from: String,
    pub created_at: DateTime<Utc>,
}

/// Template columns an update is conditioned on
#[derive(Debug, Clone, Copy)]
pub struct TemplateVersionRow {
    pub next_due_date: NaiveDate,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Everything `commit_generation` writes
#[derive(Debug, Clone)]
pub struct GenerationRows {
    pub template_id: Uuid,
    pub expected_due_date: NaiveDate,
    pub next_due_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub bill: BillRow,
    pub allocations: Vec<AllocationRow>,
}
