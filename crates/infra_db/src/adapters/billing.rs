//! PostgreSQL Billing Adapter
//!
//! Implements `BillingPort` over `BillingRepository`. Conditional writes
//! surface as `PortError::Conflict`, which the billing services turn into
//! lifecycle errors.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    AllocationId, BillId, BillingPeriod, ConsumptionId, DomainPort, Frequency, HealthCheckResult,
    HealthCheckable, PortError, PredictionId, Subject, SubjectType, TemplateId, UserId,
};
use domain_billing::{
    Allocation, AllocationMethod, Bill, BillFilter, BillGeneration, BillKind, BillStatus,
    BillingPort, Consumption, ConsumptionSource, ForecastTarget, Prediction,
    RecurringBillTemplate, TemplateAllocation, TemplateVersion,
};

use super::{money, ping};
use crate::error::DatabaseError;
use crate::repositories::billing::{
    AllocationRow, BillQuery, BillRow, BillingRepository, ConsumptionRow, DbAllocationMethod,
    DbBillKind, DbBillStatus, DbConsumptionSource, DbForecastTarget, DbFrequency, DbSubjectType,
    GenerationRows, PredictionRow, TemplateRow, TemplateVersionRow,
};

/// PostgreSQL-backed `BillingPort`
#[derive(Debug, Clone)]
pub struct PostgresBillingAdapter {
    repository: BillingRepository,
    pool: PgPool,
}

impl PostgresBillingAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &BillingRepository {
        &self.repository
    }
}

impl DomainPort for PostgresBillingAdapter {}

#[async_trait]
impl HealthCheckable for PostgresBillingAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-billing-adapter").await
    }
}

#[async_trait]
impl BillingPort for PostgresBillingAdapter {
    #[instrument(skip_all, fields(bill_id = %bill.id))]
    async fn insert_bill(&self, bill: &Bill) -> Result<(), PortError> {
        Ok(self.repository.insert_bill(&bill_to_row(bill)).await?)
    }

    #[instrument(skip(self), fields(bill_id = %id))]
    async fn get_bill(&self, id: BillId) -> Result<Bill, PortError> {
        let row = self.repository.get_bill(*id.as_uuid()).await?;
        Ok(row_to_bill(row)?)
    }

    #[instrument(skip(self))]
    async fn list_bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, PortError> {
        let query = BillQuery {
            kind: filter.kind.map(bill_kind_to_db),
            statuses: filter.statuses.iter().copied().map(bill_status_to_db).collect(),
            period_from: filter.period_from,
            period_to: filter.period_to,
            recurring_template_id: filter.recurring_template_id.map(|id| *id.as_uuid()),
        };
        let rows = self.repository.list_bills(&query).await?;
        Ok(rows.into_iter().map(row_to_bill).collect::<Result<_, _>>()?)
    }

    #[instrument(skip_all, fields(bill_id = %id, from = %from, to = %to))]
    async fn transition_bill_status(
        &self,
        id: BillId,
        from: BillStatus,
        to: BillStatus,
    ) -> Result<Bill, PortError> {
        let row = self
            .repository
            .transition_status(*id.as_uuid(), bill_status_to_db(from), bill_status_to_db(to))
            .await?;
        debug!("bill status updated");
        Ok(row_to_bill(row)?)
    }

    async fn insert_consumption(&self, consumption: &Consumption) -> Result<(), PortError> {
        let row = ConsumptionRow {
            consumption_id: *consumption.id.as_uuid(),
            bill_id: *consumption.bill_id.as_uuid(),
            user_id: *consumption.user_id.as_uuid(),
            units: consumption.units,
            meter_value: consumption.meter_value,
            source: match consumption.source {
                ConsumptionSource::User => DbConsumptionSource::User,
                ConsumptionSource::Admin => DbConsumptionSource::Admin,
            },
            recorded_at: consumption.recorded_at,
        };
        Ok(self.repository.insert_consumption(&row).await?)
    }

    async fn list_consumptions(&self, bill_id: BillId) -> Result<Vec<Consumption>, PortError> {
        let rows = self.repository.list_consumptions(*bill_id.as_uuid()).await?;
        Ok(rows
            .into_iter()
            .map(|row| Consumption {
                id: ConsumptionId::from_uuid(row.consumption_id),
                bill_id: BillId::from_uuid(row.bill_id),
                user_id: UserId::from_uuid(row.user_id),
                units: row.units,
                meter_value: row.meter_value,
                source: match row.source {
                    DbConsumptionSource::User => ConsumptionSource::User,
                    DbConsumptionSource::Admin => ConsumptionSource::Admin,
                },
                recorded_at: row.recorded_at,
            })
            .collect())
    }

    #[instrument(skip_all, fields(bill_id = %bill_id, count = allocations.len()))]
    async fn replace_allocations(
        &self,
        bill_id: BillId,
        allocations: &[Allocation],
    ) -> Result<(), PortError> {
        let rows: Vec<AllocationRow> = allocations.iter().map(allocation_to_row).collect();
        Ok(self.repository.replace_allocations(*bill_id.as_uuid(), &rows).await?)
    }

    async fn list_allocations(&self, bill_id: BillId) -> Result<Vec<Allocation>, PortError> {
        let rows = self.repository.list_allocations(*bill_id.as_uuid()).await?;
        let mut allocations = rows
            .into_iter()
            .map(row_to_allocation)
            .collect::<Result<Vec<_>, _>>()?;
        allocations.sort_by_key(|a| a.subject);
        Ok(allocations)
    }

    #[instrument(skip_all, fields(template_id = %template.id))]
    async fn insert_template(&self, template: &RecurringBillTemplate) -> Result<(), PortError> {
        Ok(self.repository.insert_template(&template_to_row(template)?).await?)
    }

    async fn get_template(&self, id: TemplateId) -> Result<RecurringBillTemplate, PortError> {
        let row = self.repository.get_template(*id.as_uuid()).await?;
        Ok(row_to_template(row)?)
    }

    async fn list_templates(&self, active_only: bool) -> Result<Vec<RecurringBillTemplate>, PortError> {
        let rows = self.repository.list_templates(active_only).await?;
        Ok(rows.into_iter().map(row_to_template).collect::<Result<_, _>>()?)
    }

    #[instrument(skip_all, fields(template_id = %template.id))]
    async fn update_template(
        &self,
        template: &RecurringBillTemplate,
        expected: &TemplateVersion,
    ) -> Result<(), PortError> {
        let expected = TemplateVersionRow {
            next_due_date: expected.next_due_date,
            is_active: expected.is_active,
            updated_at: expected.updated_at,
        };
        Ok(self
            .repository
            .update_template(&template_to_row(template)?, &expected)
            .await?)
    }

    #[instrument(skip(self))]
    async fn list_due_templates(&self, today: NaiveDate) -> Result<Vec<RecurringBillTemplate>, PortError> {
        let rows = self.repository.list_due_templates(today).await?;
        debug!(due = rows.len(), "due templates loaded");
        Ok(rows.into_iter().map(row_to_template).collect::<Result<_, _>>()?)
    }

    #[instrument(skip_all, fields(template_id = %generation.template_id, due = %generation.expected_due_date))]
    async fn commit_generation(&self, generation: &BillGeneration) -> Result<(), PortError> {
        let rows = GenerationRows {
            template_id: *generation.template_id.as_uuid(),
            expected_due_date: generation.expected_due_date,
            next_due_date: generation.next_due_date,
            generated_at: generation.generated_at,
            bill: bill_to_row(&generation.bill),
            allocations: generation.allocations.iter().map(allocation_to_row).collect(),
        };
        Ok(self.repository.commit_generation(&rows).await?)
    }

    async fn insert_prediction(&self, prediction: &Prediction) -> Result<(), PortError> {
        let row = PredictionRow {
            prediction_id: *prediction.id.as_uuid(),
            target: forecast_target_to_db(prediction.target),
            period_start: prediction.period_start,
            period_end: prediction.period_end,
            horizon_months: to_i32(prediction.horizon_months, "horizon_months")?,
            predicted_units: prediction.predicted_units,
            predicted_amount: prediction.predicted_amount.amount(),
            currency: prediction.predicted_amount.currency().code().to_string(),
            model_name: prediction.model_name.clone(),
            model_version: prediction.model_version.clone(),
            created_from: prediction.created_from.clone(),
            created_at: prediction.created_at,
        };
        Ok(self.repository.insert_prediction(&row).await?)
    }

    async fn list_predictions(
        &self,
        target: Option<ForecastTarget>,
    ) -> Result<Vec<Prediction>, PortError> {
        let rows = self
            .repository
            .list_predictions(target.map(forecast_target_to_db))
            .await?;
        Ok(rows.into_iter().map(row_to_prediction).collect::<Result<_, _>>()?)
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn bill_kind_to_db(kind: BillKind) -> DbBillKind {
    match kind {
        BillKind::Electricity => DbBillKind::Electricity,
        BillKind::Gas => DbBillKind::Gas,
        BillKind::Internet => DbBillKind::Internet,
        BillKind::Shared => DbBillKind::Shared,
        BillKind::Other => DbBillKind::Other,
    }
}

fn bill_kind_from_db(kind: DbBillKind) -> BillKind {
    match kind {
        DbBillKind::Electricity => BillKind::Electricity,
        DbBillKind::Gas => BillKind::Gas,
        DbBillKind::Internet => BillKind::Internet,
        DbBillKind::Shared => BillKind::Shared,
        DbBillKind::Other => BillKind::Other,
    }
}

fn bill_status_to_db(status: BillStatus) -> DbBillStatus {
    match status {
        BillStatus::Draft => DbBillStatus::Draft,
        BillStatus::Posted => DbBillStatus::Posted,
        BillStatus::Closed => DbBillStatus::Closed,
    }
}

fn bill_status_from_db(status: DbBillStatus) -> BillStatus {
    match status {
        DbBillStatus::Draft => BillStatus::Draft,
        DbBillStatus::Posted => BillStatus::Posted,
        DbBillStatus::Closed => BillStatus::Closed,
    }
}

fn method_to_db(method: AllocationMethod) -> DbAllocationMethod {
    match method {
        AllocationMethod::Proportional => DbAllocationMethod::Proportional,
        AllocationMethod::Equal => DbAllocationMethod::Equal,
        AllocationMethod::Weight => DbAllocationMethod::Weight,
        AllocationMethod::Override => DbAllocationMethod::Override,
    }
}

fn method_from_db(method: DbAllocationMethod) -> AllocationMethod {
    match method {
        DbAllocationMethod::Proportional => AllocationMethod::Proportional,
        DbAllocationMethod::Equal => AllocationMethod::Equal,
        DbAllocationMethod::Weight => AllocationMethod::Weight,
        DbAllocationMethod::Override => AllocationMethod::Override,
    }
}

fn frequency_to_db(frequency: Frequency) -> DbFrequency {
    match frequency {
        Frequency::Monthly => DbFrequency::Monthly,
        Frequency::Quarterly => DbFrequency::Quarterly,
        Frequency::Yearly => DbFrequency::Yearly,
    }
}

fn frequency_from_db(frequency: DbFrequency) -> Frequency {
    match frequency {
        DbFrequency::Monthly => Frequency::Monthly,
        DbFrequency::Quarterly => Frequency::Quarterly,
        DbFrequency::Yearly => Frequency::Yearly,
    }
}

fn forecast_target_to_db(target: ForecastTarget) -> DbForecastTarget {
    match target {
        ForecastTarget::Electricity => DbForecastTarget::Electricity,
        ForecastTarget::Gas => DbForecastTarget::Gas,
        ForecastTarget::SharedBudget => DbForecastTarget::SharedBudget,
    }
}

fn forecast_target_from_db(target: DbForecastTarget) -> ForecastTarget {
    match target {
        DbForecastTarget::Electricity => ForecastTarget::Electricity,
        DbForecastTarget::Gas => ForecastTarget::Gas,
        DbForecastTarget::SharedBudget => ForecastTarget::SharedBudget,
    }
}

fn to_i32(value: u32, column: &str) -> Result<i32, DatabaseError> {
    i32::try_from(value).map_err(|_| DatabaseError::corrupt(format!("{} out of range: {}", column, value)))
}

fn to_u32(value: i32, column: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::corrupt(format!("{} out of range: {}", column, value)))
}

fn bill_to_row(bill: &Bill) -> BillRow {
    BillRow {
        bill_id: *bill.id.as_uuid(),
        kind: bill_kind_to_db(bill.kind),
        custom_type: bill.custom_type.clone(),
        period_start: bill.period.start(),
        period_end: bill.period.end(),
        total_amount: bill.total_amount.amount(),
        currency: bill.total_amount.currency().code().to_string(),
        total_units: bill.total_units,
        status: bill_status_to_db(bill.status),
        payment_deadline: bill.payment_deadline,
        recurring_template_id: bill.recurring_template_id.map(|id| *id.as_uuid()),
        notes: bill.notes.clone(),
        created_at: bill.created_at,
        updated_at: bill.updated_at,
    }
}

fn row_to_bill(row: BillRow) -> Result<Bill, DatabaseError> {
    let period = BillingPeriod::new(row.period_start, row.period_end)
        .map_err(|e| DatabaseError::corrupt(format!("bill {}: {}", row.bill_id, e)))?;
    Ok(Bill {
        id: BillId::from_uuid(row.bill_id),
        kind: bill_kind_from_db(row.kind),
        custom_type: row.custom_type,
        period,
        total_amount: money(row.total_amount, &row.currency)?,
        total_units: row.total_units,
        status: bill_status_from_db(row.status),
        payment_deadline: row.payment_deadline,
        recurring_template_id: row.recurring_template_id.map(TemplateId::from_uuid),
        notes: row.notes,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn allocation_to_row(allocation: &Allocation) -> AllocationRow {
    AllocationRow {
        allocation_id: *allocation.id.as_uuid(),
        bill_id: *allocation.bill_id.as_uuid(),
        subject_type: match allocation.subject.subject_type() {
            SubjectType::User => DbSubjectType::User,
            SubjectType::Group => DbSubjectType::Group,
        },
        subject_id: allocation.subject.uuid(),
        amount: allocation.amount.amount(),
        currency: allocation.amount.currency().code().to_string(),
        units: allocation.units,
        method: method_to_db(allocation.method),
        created_at: allocation.created_at,
    }
}

fn row_to_allocation(row: AllocationRow) -> Result<Allocation, DatabaseError> {
    let subject_type = match row.subject_type {
        DbSubjectType::User => SubjectType::User,
        DbSubjectType::Group => SubjectType::Group,
    };
    Ok(Allocation {
        id: AllocationId::from_uuid(row.allocation_id),
        bill_id: BillId::from_uuid(row.bill_id),
        subject: Subject::from_parts(subject_type, row.subject_id),
        amount: money(row.amount, &row.currency)?,
        units: row.units,
        method: method_from_db(row.method),
        created_at: row.created_at,
    })
}

fn template_to_row(template: &RecurringBillTemplate) -> Result<TemplateRow, DatabaseError> {
    let allocations = serde_json::to_value(&template.allocations)
        .map_err(|e| DatabaseError::corrupt(format!("template {}: {}", template.id, e)))?;
    Ok(TemplateRow {
        template_id: *template.id.as_uuid(),
        custom_type: template.custom_type.clone(),
        frequency: frequency_to_db(template.frequency),
        day_of_month: to_i32(template.day_of_month, "day_of_month")?,
        amount: template.amount.amount(),
        currency: template.amount.currency().code().to_string(),
        allocations,
        notes: template.notes.clone(),
        next_due_date: template.next_due_date,
        last_generated_at: template.last_generated_at,
        is_active: template.is_active,
        created_at: template.created_at,
        updated_at: template.updated_at,
    })
}

fn row_to_template(row: TemplateRow) -> Result<RecurringBillTemplate, DatabaseError> {
    let allocations: Vec<TemplateAllocation> = serde_json::from_value(row.allocations)
        .map_err(|e| DatabaseError::corrupt(format!("template {}: {}", row.template_id, e)))?;
    Ok(RecurringBillTemplate {
        id: TemplateId::from_uuid(row.template_id),
        custom_type: row.custom_type,
        frequency: frequency_from_db(row.frequency),
        day_of_month: to_u32(row.day_of_month, "day_of_month")?,
        amount: money(row.amount, &row.currency)?,
        allocations,
        notes: row.notes,
        next_due_date: row.next_due_date,
        last_generated_at: row.last_generated_at,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_prediction(row: PredictionRow) -> Result<Prediction, DatabaseError> {
    Ok(Prediction {
        id: PredictionId::from_uuid(row.prediction_id),
        target: forecast_target_from_db(row.target),
        period_start: row.period_start,
        period_end: row.period_end,
        horizon_months: to_u32(row.horizon_months, "horizon_months")?,
        predicted_units: row.predicted_units,
        predicted_amount: money(row.predicted_amount, &row.currency)?,
        model_name: row.model_name,
        model_version: row.model_version,
        created_from: row.created_from,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    #[test]
    fn test_bill_row_round_trip_keeps_lifecycle_fields() {
        let period = BillingPeriod::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();
        let bill = Bill::new(BillKind::Other, period, Money::new(dec!(120.50), Currency::PLN), None)
            .unwrap()
            .with_custom_type("water")
            .with_template(TemplateId::new());

        let back = row_to_bill(bill_to_row(&bill)).unwrap();
        assert_eq!(back, bill);
    }

    #[test]
    fn test_group_allocation_keeps_subject_type() {
        let allocation = Allocation {
            id: AllocationId::new(),
            bill_id: BillId::new(),
            subject: Subject::Group(core_kernel::GroupId::new()),
            amount: Money::new(dec!(10), Currency::PLN),
            units: dec!(0),
            method: AllocationMethod::Override,
            created_at: chrono::Utc::now(),
        };
        let back = row_to_allocation(allocation_to_row(&allocation)).unwrap();
        assert_eq!(back.subject, allocation.subject);
    }

    #[test]
    fn test_unknown_currency_is_corrupt_row() {
        let err = money(dec!(1), "XXX").unwrap_err();
        assert!(matches!(err, DatabaseError::CorruptRow(_)));
    }
}
