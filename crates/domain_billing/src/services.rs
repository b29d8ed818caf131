//! Billing domain services
//!
//! Services hold the lifecycle rules and talk to storage through
//! `BillingPort`. They never write a partial result: every operation either
//! commits fully through a single port call or returns an error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    BillId, Currency, DirectoryPort, PortError, Subject, TemplateId, Timezone, UserId,
};

use crate::allocation::{allocate_bill, Allocation, AllocationInput, AllocationMethod};
use crate::bill::{Bill, BillFilter, BillStatus};
use crate::consumption::{latest_units_per_user, Consumption, ConsumptionSource};
use crate::error::BillingError;
use crate::forecast::{build_request, summarize_response, ForecastPort, ForecastRequest, ForecastTarget, Prediction};
use crate::ports::BillingPort;
use crate::recurring::{NewTemplate, RecurringBillTemplate, TemplateUpdate};

/// How many times a template write is re-applied after losing a race
pub const MAX_TEMPLATE_WRITE_ATTEMPTS: u32 = 5;

fn bill_lookup(id: BillId) -> impl FnOnce(PortError) -> BillingError {
    move |e| match e {
        PortError::NotFound { .. } => BillingError::BillNotFound(id),
        other => BillingError::Port(other),
    }
}

fn template_lookup(id: TemplateId) -> impl FnOnce(PortError) -> BillingError {
    move |e| match e {
        PortError::NotFound { .. } => BillingError::TemplateNotFound(id),
        other => BillingError::Port(other),
    }
}

fn ensure_currency(expected: Currency, actual: Currency) -> Result<(), BillingError> {
    if expected != actual {
        return Err(BillingError::validation(format!(
            "amount is in {}, household currency is {}",
            actual, expected
        )));
    }
    Ok(())
}

/// Bills, consumptions and allocations
pub struct BillingService {
    port: Arc<dyn BillingPort>,
    directory: Arc<dyn DirectoryPort>,
    currency: Currency,
}

impl BillingService {
    pub fn new(port: Arc<dyn BillingPort>, directory: Arc<dyn DirectoryPort>, currency: Currency) -> Self {
        Self { port, directory, currency }
    }

    /// Stores a new draft bill
    #[instrument(skip(self, bill), fields(bill_id = %bill.id, kind = %bill.kind))]
    pub async fn create_bill(&self, bill: Bill) -> Result<Bill, BillingError> {
        ensure_currency(self.currency, bill.total_amount.currency())?;
        if bill.status != BillStatus::Draft {
            return Err(BillingError::validation("new bills must start as drafts"));
        }
        self.port.insert_bill(&bill).await?;
        info!(amount = %bill.total_amount, period = %bill.period, "bill created");
        Ok(bill)
    }

    pub async fn get_bill(&self, id: BillId) -> Result<Bill, BillingError> {
        self.port.get_bill(id).await.map_err(bill_lookup(id))
    }

    pub async fn list_bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, BillingError> {
        Ok(self.port.list_bills(filter).await?)
    }

    /// Records a user's reading against a draft bill
    #[instrument(skip_all, fields(bill_id = %bill_id, user_id = %user_id))]
    pub async fn record_consumption(
        &self,
        bill_id: BillId,
        user_id: UserId,
        units: Decimal,
        meter_value: Option<Decimal>,
        source: ConsumptionSource,
    ) -> Result<Consumption, BillingError> {
        const OPERATION: &str = "record consumption";

        let bill = self.get_bill(bill_id).await?;
        bill.ensure_mutable(OPERATION)?;
        self.require_subject(Subject::User(user_id)).await?;

        let mut consumption = Consumption::new(bill_id, user_id, units, source)?;
        if let Some(meter_value) = meter_value {
            consumption = consumption.with_meter_value(meter_value);
        }

        match self.port.insert_consumption(&consumption).await {
            Ok(()) => {
                debug!(units = %units, "consumption recorded");
                Ok(consumption)
            }
            Err(PortError::Conflict { .. }) => Err(self.mutation_refused(bill_id, OPERATION).await),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_consumptions(&self, bill_id: BillId) -> Result<Vec<Consumption>, BillingError> {
        self.get_bill(bill_id).await?;
        Ok(self.port.list_consumptions(bill_id).await?)
    }

    /// Computes and stores the bill's allocations, replacing any previous set
    ///
    /// Group subjects without an explicit weight take their directory weight
    /// in weighted splits.
    #[instrument(skip_all, fields(bill_id = %bill_id, method = %method, subjects = inputs.len()))]
    pub async fn compute_allocations(
        &self,
        bill_id: BillId,
        inputs: Vec<AllocationInput>,
        method: AllocationMethod,
    ) -> Result<Vec<Allocation>, BillingError> {
        const OPERATION: &str = "allocate";

        let bill = self.get_bill(bill_id).await?;
        bill.ensure_mutable(OPERATION)?;

        let mut resolved = Vec::with_capacity(inputs.len());
        for mut input in inputs {
            let weight = self.require_subject(input.subject).await?;
            if method == AllocationMethod::Weight && input.weight.is_none() {
                input.weight = weight;
            }
            if let Some(amount) = input.amount {
                ensure_currency(self.currency, amount.currency())?;
            }
            resolved.push(input);
        }

        let allocations = allocate_bill(&bill, &resolved, method)?;
        match self.port.replace_allocations(bill_id, &allocations).await {
            Ok(()) => {
                info!(count = allocations.len(), "allocations computed");
                Ok(allocations)
            }
            Err(PortError::Conflict { .. }) => Err(self.mutation_refused(bill_id, OPERATION).await),
            Err(e) => Err(e.into()),
        }
    }

    /// Allocates by the latest reading of every user who recorded one
    pub async fn allocate_from_consumptions(
        &self,
        bill_id: BillId,
        method: AllocationMethod,
    ) -> Result<Vec<Allocation>, BillingError> {
        if method == AllocationMethod::Override {
            return Err(BillingError::validation(
                "override amounts cannot be derived from consumption",
            ));
        }

        let readings = self.list_consumptions(bill_id).await?;
        let latest = latest_units_per_user(&readings);
        if latest.is_empty() {
            return Err(BillingError::validation(format!(
                "bill {} has no consumption recorded",
                bill_id
            )));
        }

        let inputs = latest
            .into_iter()
            .map(|(user, units)| AllocationInput::new(Subject::User(user)).with_units(units))
            .collect();
        self.compute_allocations(bill_id, inputs, method).await
    }

    pub async fn list_allocations(&self, bill_id: BillId) -> Result<Vec<Allocation>, BillingError> {
        self.get_bill(bill_id).await?;
        Ok(self.port.list_allocations(bill_id).await?)
    }

    /// `Draft -> Posted`; requires at least one allocation
    #[instrument(skip_all, fields(bill_id = %bill_id))]
    pub async fn post_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        let bill = self.get_bill(bill_id).await?;
        bill.ensure_transition(BillStatus::Posted)?;

        if self.port.list_allocations(bill_id).await?.is_empty() {
            return Err(BillingError::InvalidState {
                bill_id,
                status: bill.status,
                operation: "post without allocations",
            });
        }

        self.transition(bill_id, BillStatus::Draft, BillStatus::Posted, "post").await
    }

    /// `Posted -> Closed`
    #[instrument(skip_all, fields(bill_id = %bill_id))]
    pub async fn close_bill(&self, bill_id: BillId) -> Result<Bill, BillingError> {
        let bill = self.get_bill(bill_id).await?;
        bill.ensure_transition(BillStatus::Closed)?;
        self.transition(bill_id, BillStatus::Posted, BillStatus::Closed, "close").await
    }

    async fn transition(
        &self,
        bill_id: BillId,
        from: BillStatus,
        to: BillStatus,
        operation: &'static str,
    ) -> Result<Bill, BillingError> {
        match self.port.transition_bill_status(bill_id, from, to).await {
            Ok(bill) => {
                info!(from = %from, to = %to, "bill status changed");
                Ok(bill)
            }
            Err(PortError::Conflict { .. }) => {
                let current = self.get_bill(bill_id).await?;
                warn!(status = %current.status, "lost status race");
                Err(BillingError::InvalidState {
                    bill_id,
                    status: current.status,
                    operation,
                })
            }
            Err(e) => Err(bill_lookup(bill_id)(e)),
        }
    }

    /// Turns a refused conditional write into the error for the bill's
    /// current status
    async fn mutation_refused(&self, bill_id: BillId, operation: &'static str) -> BillingError {
        match self.get_bill(bill_id).await {
            Ok(bill) => match bill.ensure_mutable(operation) {
                Err(e) => e,
                Ok(()) => BillingError::Port(PortError::conflict(format!(
                    "bill {} changed during {}",
                    bill_id, operation
                ))),
            },
            Err(e) => e,
        }
    }

    /// Checks that a subject exists; returns the group's weight for groups
    async fn require_subject(&self, subject: Subject) -> Result<Option<Decimal>, BillingError> {
        match subject {
            Subject::User(id) => {
                if !self.directory.user_exists(id).await? {
                    return Err(BillingError::SubjectNotFound(id.to_string()));
                }
                Ok(None)
            }
            Subject::Group(id) => match self.directory.group_weight(id).await? {
                Some(weight) => Ok(Some(weight)),
                None => Err(BillingError::SubjectNotFound(id.to_string())),
            },
        }
    }
}

/// Recurring templates and the due-bill sweep
pub struct RecurringBillService {
    port: Arc<dyn BillingPort>,
    timezone: Timezone,
    currency: Currency,
}

impl RecurringBillService {
    pub fn new(port: Arc<dyn BillingPort>, timezone: Timezone, currency: Currency) -> Self {
        Self { port, timezone, currency }
    }

    #[instrument(skip(self, request), fields(custom_type = %request.custom_type))]
    pub async fn create_template(
        &self,
        request: NewTemplate,
        now: DateTime<Utc>,
    ) -> Result<RecurringBillTemplate, BillingError> {
        ensure_currency(self.currency, request.amount.currency())?;
        let template = RecurringBillTemplate::new(request, self.timezone.today(now))?;
        self.port.insert_template(&template).await?;
        info!(template_id = %template.id, next_due = %template.next_due_date, "template created");
        Ok(template)
    }

    pub async fn get_template(&self, id: TemplateId) -> Result<RecurringBillTemplate, BillingError> {
        self.port.get_template(id).await.map_err(template_lookup(id))
    }

    pub async fn list_templates(&self, active_only: bool) -> Result<Vec<RecurringBillTemplate>, BillingError> {
        Ok(self.port.list_templates(active_only).await?)
    }

    /// Applies a partial update
    ///
    /// The write only lands if the template is unchanged since it was read;
    /// if a sweep or deactivation got there first the update is re-applied
    /// to the fresh template.
    #[instrument(skip(self, update), fields(template_id = %id))]
    pub async fn update_template(
        &self,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> Result<RecurringBillTemplate, BillingError> {
        if let Some(amount) = update.amount {
            ensure_currency(self.currency, amount.currency())?;
        }
        let template = self
            .write_template(id, |template| template.apply_update(update.clone()).map(|()| true))
            .await?;
        info!("template updated");
        Ok(template)
    }

    /// Soft delete; generated history stays linked to the template
    #[instrument(skip(self), fields(template_id = %id))]
    pub async fn deactivate_template(&self, id: TemplateId) -> Result<RecurringBillTemplate, BillingError> {
        let template = self
            .write_template(id, |template| {
                if !template.is_active {
                    return Ok(false);
                }
                template.is_active = false;
                template.updated_at = Utc::now();
                Ok(true)
            })
            .await?;
        info!("template deactivated");
        Ok(template)
    }

    /// Conditional read-modify-write, retried while other writers win
    ///
    /// `change` returns false when there is nothing to write.
    async fn write_template<F>(&self, id: TemplateId, mut change: F) -> Result<RecurringBillTemplate, BillingError>
    where
        F: FnMut(&mut RecurringBillTemplate) -> Result<bool, BillingError>,
    {
        for attempt in 1..=MAX_TEMPLATE_WRITE_ATTEMPTS {
            let mut template = self.get_template(id).await?;
            let expected = template.version();
            if !change(&mut template)? {
                return Ok(template);
            }
            match self.port.update_template(&template, &expected).await {
                Ok(()) => return Ok(template),
                Err(PortError::Conflict { .. }) => {
                    debug!(attempt, "template changed while writing, retrying");
                }
                Err(e) => return Err(template_lookup(id)(e)),
            }
        }

        warn!(attempts = MAX_TEMPLATE_WRITE_ATTEMPTS, "giving up on contended template write");
        Err(BillingError::TemplateContention {
            template_id: id,
            attempts: MAX_TEMPLATE_WRITE_ATTEMPTS,
        })
    }

    /// Generates one bill for every active template due on or before the
    /// household's local date at `now`
    ///
    /// A template that fails is logged and skipped; its due date is left as
    /// it was so the next sweep retries it. A template another sweep already
    /// advanced is skipped silently.
    #[instrument(skip(self))]
    pub async fn generate_due_bills(&self, now: DateTime<Utc>) -> Result<Vec<Bill>, BillingError> {
        let today = self.timezone.today(now);
        let due = self.port.list_due_templates(today).await?;
        debug!(%today, due = due.len(), "due templates loaded");

        let mut generated = Vec::with_capacity(due.len());
        for template in due {
            let plan = match template.plan_generation(now) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(template_id = %template.id, error = %e, "skipping template");
                    continue;
                }
            };

            match self.port.commit_generation(&plan).await {
                Ok(()) => {
                    info!(
                        template_id = %template.id,
                        bill_id = %plan.bill.id,
                        due = %plan.expected_due_date,
                        next_due = %plan.next_due_date,
                        "recurring bill generated"
                    );
                    generated.push(plan.bill);
                }
                Err(PortError::Conflict { .. }) => {
                    debug!(template_id = %template.id, "template already generated by another sweep");
                }
                Err(e) => {
                    warn!(template_id = %template.id, error = %e, "skipping template");
                }
            }
        }
        Ok(generated)
    }
}

/// Assembles history for the forecasting collaborator and stores its answer
pub struct ForecastService {
    port: Arc<dyn BillingPort>,
    forecaster: Arc<dyn ForecastPort>,
    currency: Currency,
}

impl ForecastService {
    pub fn new(port: Arc<dyn BillingPort>, forecaster: Arc<dyn ForecastPort>, currency: Currency) -> Self {
        Self { port, forecaster, currency }
    }

    pub async fn build_request(
        &self,
        target: ForecastTarget,
        horizon_months: Option<u32>,
    ) -> Result<ForecastRequest, BillingError> {
        let filter = BillFilter::by_kind(target.bill_kind())
            .with_statuses([BillStatus::Posted, BillStatus::Closed]);
        let history = self.port.list_bills(&filter).await?;
        build_request(target, &history, horizon_months)
    }

    #[instrument(skip_all, fields(target = %target))]
    pub async fn recompute_prediction(
        &self,
        target: ForecastTarget,
        horizon_months: Option<u32>,
    ) -> Result<Prediction, BillingError> {
        let request = self.build_request(target, horizon_months).await?;
        let response = self.forecaster.forecast(request.clone()).await?;
        let prediction = summarize_response(&request, response, self.currency)?;
        self.port.insert_prediction(&prediction).await?;
        info!(
            prediction_id = %prediction.id,
            units = %prediction.predicted_units,
            amount = %prediction.predicted_amount,
            "prediction stored"
        );
        Ok(prediction)
    }

    pub async fn list_predictions(
        &self,
        target: Option<ForecastTarget>,
    ) -> Result<Vec<Prediction>, BillingError> {
        Ok(self.port.list_predictions(target).await?)
    }
}
