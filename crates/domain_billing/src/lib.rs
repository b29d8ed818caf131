//! Billing Domain - Bills, Allocations and Recurring Templates
//!
//! This crate turns household expenses into per-subject shares:
//!
//! - **Bill lifecycle**: `Draft -> Posted -> Closed`, no skipping, no going back
//! - **Consumption**: append-only meter readings per user
//! - **Allocation calculator**: equal, proportional, weighted and override
//!   splits whose shares always add up to the bill total
//! - **Recurring templates**: fixed/percentage/fraction rules that spawn a
//!   draft bill each period
//! - **Forecasting boundary**: formats bill history for an external
//!   forecaster and stores its typed answer
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{AllocationInput, AllocationMethod, BillingService};
//!
//! let service = BillingService::new(port, directory, Currency::PLN);
//! let bill = service.create_bill(bill).await?;
//! service
//!     .compute_allocations(bill.id, vec![AllocationInput::new(alice), AllocationInput::new(bob)], AllocationMethod::Equal)
//!     .await?;
//! service.post_bill(bill.id).await?;
//! ```

pub mod bill;
pub mod consumption;
pub mod allocation;
pub mod recurring;
pub mod forecast;
pub mod ports;
pub mod services;
pub mod error;

pub use bill::{Bill, BillFilter, BillKind, BillStatus};
pub use consumption::{Consumption, ConsumptionSource};
pub use allocation::{Allocation, AllocationInput, AllocationMethod, AllocationShare};
pub use recurring::{
    AllocationRule, BillGeneration, NewTemplate, RecurringBillTemplate, TemplateAllocation,
    TemplateUpdate, TemplateVersion,
};
pub use forecast::{ForecastPort, ForecastRequest, ForecastResponse, ForecastTarget, Prediction};
pub use ports::BillingPort;
pub use services::{BillingService, ForecastService, RecurringBillService, MAX_TEMPLATE_WRITE_ATTEMPTS};
pub use error::BillingError;
