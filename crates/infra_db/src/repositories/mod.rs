//! Repository implementations
//!
//! Repositories own the SQL and the row types. They speak `DatabaseError`
//! and raw column values; the adapters translate to and from domain types.
//!
//! Writes that depend on current state (status transitions, allocation
//! replacement, template advances, loan payments) run as conditional
//! updates inside a transaction and report `DatabaseError::Conflict` when
//! the stored state has moved on.

pub mod billing;
pub mod loans;
pub mod directory;

pub use billing::BillingRepository;
pub use loans::LoanRepository;
pub use directory::DirectoryRepository;
