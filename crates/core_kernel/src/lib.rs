//! Core Kernel - Foundational types for the household ledger engine
//!
//! This crate provides the building blocks shared by the billing and loan domains:
//! - Money types with precise decimal arithmetic and exact remainder allocation
//! - Calendar types for billing periods and recurring schedules
//! - Strongly-typed identifiers and the bill `Subject`
//! - Port infrastructure and the household directory port

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;
pub mod directory;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{BillingPeriod, Frequency, Timezone, TemporalError};
pub use identifiers::{
    UserId, GroupId, BillId, ConsumptionId, AllocationId, TemplateId, PredictionId,
    LoanId, LoanPaymentId, Subject, SubjectType,
};
pub use error::{CoreError, ErrorKind};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
pub use directory::{DirectoryPort, DEFAULT_GROUP_WEIGHT};
