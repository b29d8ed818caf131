//! Billing Domain Ports
//!
//! `BillingPort` is everything the billing services need from storage. The
//! Postgres adapter lives in `infra_db`; an in-memory adapter is available
//! behind the `mock` feature.
//!
//! Writes that depend on a bill's or template's current state are
//! conditional: they only apply when the stored state still matches what the
//! caller read, and otherwise fail with `PortError::Conflict` without
//! changing anything.

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{BillId, DomainPort, HealthCheckable, PortError, TemplateId};

use crate::allocation::Allocation;
use crate::bill::{Bill, BillFilter, BillStatus};
use crate::consumption::Consumption;
use crate::forecast::{ForecastTarget, Prediction};
use crate::recurring::{BillGeneration, RecurringBillTemplate, TemplateVersion};

#[async_trait]
pub trait BillingPort: DomainPort + HealthCheckable {
    // ========================================================================
    // Bills
    // ========================================================================

    async fn insert_bill(&self, bill: &Bill) -> Result<(), PortError>;

    /// Returns the bill, or `PortError::NotFound`
    async fn get_bill(&self, id: BillId) -> Result<Bill, PortError>;

    /// Bills matching the filter, oldest period first
    async fn list_bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, PortError>;

    /// Moves a bill from `from` to `to`
    ///
    /// Fails with `Conflict` if the stored status is no longer `from`.
    async fn transition_bill_status(
        &self,
        id: BillId,
        from: BillStatus,
        to: BillStatus,
    ) -> Result<Bill, PortError>;

    // ========================================================================
    // Consumptions and allocations
    // ========================================================================

    /// Stores a reading; `Conflict` unless the bill is still a draft
    async fn insert_consumption(&self, consumption: &Consumption) -> Result<(), PortError>;

    /// Readings for a bill in the order they were recorded
    async fn list_consumptions(&self, bill_id: BillId) -> Result<Vec<Consumption>, PortError>;

    /// Replaces the bill's whole allocation set in one step
    ///
    /// `Conflict` unless the bill is still a draft.
    async fn replace_allocations(
        &self,
        bill_id: BillId,
        allocations: &[Allocation],
    ) -> Result<(), PortError>;

    async fn list_allocations(&self, bill_id: BillId) -> Result<Vec<Allocation>, PortError>;

    // ========================================================================
    // Recurring templates
    // ========================================================================

    async fn insert_template(&self, template: &RecurringBillTemplate) -> Result<(), PortError>;

    async fn get_template(&self, id: TemplateId) -> Result<RecurringBillTemplate, PortError>;

    async fn list_templates(&self, active_only: bool) -> Result<Vec<RecurringBillTemplate>, PortError>;

    /// Overwrites the stored template if it is still at `expected`
    ///
    /// `Conflict` when a sweep, deactivation or other update moved the
    /// template since it was read; nothing is written in that case.
    async fn update_template(
        &self,
        template: &RecurringBillTemplate,
        expected: &TemplateVersion,
    ) -> Result<(), PortError>;

    /// Active templates with `next_due_date <= today`
    async fn list_due_templates(&self, today: NaiveDate) -> Result<Vec<RecurringBillTemplate>, PortError>;

    /// Writes the generated bill, its allocations and the template advance
    /// as one unit
    ///
    /// `Conflict` if the template is inactive or its due date is no longer
    /// `generation.expected_due_date`; nothing is written in that case.
    async fn commit_generation(&self, generation: &BillGeneration) -> Result<(), PortError>;

    // ========================================================================
    // Predictions
    // ========================================================================

    async fn insert_prediction(&self, prediction: &Prediction) -> Result<(), PortError>;

    /// Stored predictions, newest first
    async fn list_predictions(
        &self,
        target: Option<ForecastTarget>,
    ) -> Result<Vec<Prediction>, PortError>;
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
        bills: HashMap<BillId, Bill>,
        consumptions: Vec<Consumption>,
        allocations: HashMap<BillId, Vec<Allocation>>,
        templates: HashMap<TemplateId, RecurringBillTemplate>,
        predictions: Vec<Prediction>,
    }

    impl State {
        fn draft_bill(&self, id: BillId) -> Result<&Bill, PortError> {
            let bill = self.bills.get(&id).ok_or_else(|| PortError::not_found("Bill", id))?;
            if bill.status != BillStatus::Draft {
                return Err(PortError::conflict(format!("bill {} is {}", id, bill.status)));
            }
            Ok(bill)
        }
    }

    /// One lock over all tables, so multi-table writes are atomic
    #[derive(Debug, Default)]
    pub struct MockBillingPort {
        state: RwLock<State>,
    }

    impl MockBillingPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of bills stored, for assertions
        pub async fn bill_count(&self) -> usize {
            self.state.read().await.bills.len()
        }
    }

    impl DomainPort for MockBillingPort {}

    #[async_trait]
    impl HealthCheckable for MockBillingPort {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("mock-billing-port")
        }
    }

    #[async_trait]
    impl BillingPort for MockBillingPort {
        async fn insert_bill(&self, bill: &Bill) -> Result<(), PortError> {
            self.state.write().await.bills.insert(bill.id, bill.clone());
            Ok(())
        }

        async fn get_bill(&self, id: BillId) -> Result<Bill, PortError> {
            self.state
                .read()
                .await
                .bills
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Bill", id))
        }

        async fn list_bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, PortError> {
            let state = self.state.read().await;
            let mut bills: Vec<Bill> = state
                .bills
                .values()
                .filter(|b| filter.matches(b))
                .cloned()
                .collect();
            bills.sort_by_key(|b| (b.period.start(), b.created_at));
            Ok(bills)
        }

        async fn transition_bill_status(
            &self,
            id: BillId,
            from: BillStatus,
            to: BillStatus,
        ) -> Result<Bill, PortError> {
            let mut state = self.state.write().await;
            let bill = state
                .bills
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("Bill", id))?;
            if bill.status != from {
                return Err(PortError::conflict(format!(
                    "bill {} is {}, expected {}",
                    id, bill.status, from
                )));
            }
            bill.status = to;
            bill.updated_at = Utc::now();
            Ok(bill.clone())
        }

        async fn insert_consumption(&self, consumption: &Consumption) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            state.draft_bill(consumption.bill_id)?;
            state.consumptions.push(consumption.clone());
            Ok(())
        }

        async fn list_consumptions(&self, bill_id: BillId) -> Result<Vec<Consumption>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .consumptions
                .iter()
                .filter(|c| c.bill_id == bill_id)
                .cloned()
                .collect())
        }

        async fn replace_allocations(
            &self,
            bill_id: BillId,
            allocations: &[Allocation],
        ) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            state.draft_bill(bill_id)?;
            state.allocations.insert(bill_id, allocations.to_vec());
            Ok(())
        }

        async fn list_allocations(&self, bill_id: BillId) -> Result<Vec<Allocation>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .allocations
                .get(&bill_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn insert_template(&self, template: &RecurringBillTemplate) -> Result<(), PortError> {
            self.state
                .write()
                .await
                .templates
                .insert(template.id, template.clone());
            Ok(())
        }

        async fn get_template(&self, id: TemplateId) -> Result<RecurringBillTemplate, PortError> {
            self.state
                .read()
                .await
                .templates
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("RecurringBillTemplate", id))
        }

        async fn list_templates(&self, active_only: bool) -> Result<Vec<RecurringBillTemplate>, PortError> {
            let state = self.state.read().await;
            let mut templates: Vec<_> = state
                .templates
                .values()
                .filter(|t| !active_only || t.is_active)
                .cloned()
                .collect();
            templates.sort_by_key(|t| t.created_at);
            Ok(templates)
        }

        async fn update_template(
            &self,
            template: &RecurringBillTemplate,
            expected: &TemplateVersion,
        ) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            let stored = state
                .templates
                .get_mut(&template.id)
                .ok_or_else(|| PortError::not_found("RecurringBillTemplate", template.id))?;
            if stored.version() != *expected {
                return Err(PortError::conflict(format!(
                    "template {} changed since it was read",
                    template.id
                )));
            }
            *stored = template.clone();
            Ok(())
        }

        async fn list_due_templates(&self, today: NaiveDate) -> Result<Vec<RecurringBillTemplate>, PortError> {
            let state = self.state.read().await;
            let mut due: Vec<_> = state
                .templates
                .values()
                .filter(|t| t.is_due(today))
                .cloned()
                .collect();
            due.sort_by_key(|t| (t.next_due_date, t.id));
            Ok(due)
        }

        async fn commit_generation(&self, generation: &BillGeneration) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            let template = state
                .templates
                .get_mut(&generation.template_id)
                .ok_or_else(|| PortError::not_found("RecurringBillTemplate", generation.template_id))?;
            if !template.is_active || template.next_due_date != generation.expected_due_date {
                return Err(PortError::conflict(format!(
                    "template {} already advanced past {}",
                    generation.template_id, generation.expected_due_date
                )));
            }
            template.next_due_date = generation.next_due_date;
            template.last_generated_at = Some(generation.generated_at);
            template.updated_at = generation.generated_at;

            let bill = generation.bill.clone();
            state.allocations.insert(bill.id, generation.allocations.clone());
            state.bills.insert(bill.id, bill);
            Ok(())
        }

        async fn insert_prediction(&self, prediction: &Prediction) -> Result<(), PortError> {
            self.state.write().await.predictions.push(prediction.clone());
            Ok(())
        }

        async fn list_predictions(
            &self,
            target: Option<ForecastTarget>,
        ) -> Result<Vec<Prediction>, PortError> {
            let state = self.state.read().await;
            let mut predictions: Vec<_> = state
                .predictions
                .iter()
                .filter(|p| target.map_or(true, |t| p.target == t))
                .cloned()
                .collect();
            predictions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(predictions)
        }
    }
}
