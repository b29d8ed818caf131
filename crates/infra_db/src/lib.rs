//! Infrastructure Database Layer
//!
//! PostgreSQL storage for the household ledger using SQLx.
//!
//! # Architecture
//!
//! - `repositories` own the SQL and row types
//! - `adapters` implement the domain ports (`BillingPort`, `LoanPort`,
//!   `DirectoryPort`) on top of the repositories
//! - `pool` creates the connection pool and applies the schema
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresBillingAdapter};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/household")).await?;
//! infra_db::apply_schema(&pool).await?;
//! let billing = Arc::new(PostgresBillingAdapter::new(pool.clone()));
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{apply_schema, create_pool, create_pool_from_url, DatabaseConfig, DatabasePool, INITIAL_SCHEMA};
pub use error::DatabaseError;
pub use adapters::{PostgresBillingAdapter, PostgresDirectoryAdapter, PostgresLoanAdapter};
