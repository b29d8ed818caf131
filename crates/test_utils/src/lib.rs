//! Test Utilities Crate
//!
//! Shared test infrastructure for the household ledger.
//!
//! # Modules
//!
//! - `fixtures`: deterministic users, dates, and amounts
//! - `builders`: bill and loan builders, and an in-memory `TestHousehold`
//! - `database`: PostgreSQL test containers with the household schema
//! - `assertions`: ledger-aware assertion helpers
//! - `generators`: proptest strategies for amounts, subjects, and debts

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
