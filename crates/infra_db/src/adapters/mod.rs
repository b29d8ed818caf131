//! Domain Adapters
//!
//! PostgreSQL implementations of the domain ports. Each adapter wraps a
//! repository, converts between rows and domain values, and translates
//! `DatabaseError` into `PortError`.
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingAdapter;
//! use domain_billing::BillingPort;
//!
//! let port: Arc<dyn BillingPort> = Arc::new(PostgresBillingAdapter::new(pool));
//! let bill = port.get_bill(bill_id).await?;
//! ```

pub mod billing;
pub mod loans;
pub mod directory;

pub use billing::PostgresBillingAdapter;
pub use loans::PostgresLoanAdapter;
pub use directory::PostgresDirectoryAdapter;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use core_kernel::{AdapterHealth, Currency, HealthCheckResult, Money};

use crate::error::DatabaseError;

/// Runs `SELECT 1` and reports how long it took
pub(crate) async fn ping(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let (status, message) = match result {
        Ok(_) => (AdapterHealth::Healthy, None),
        Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
    };
    HealthCheckResult {
        adapter_id: adapter_id.to_string(),
        status,
        latency_ms,
        message,
        checked_at: Utc::now(),
    }
}

/// Rebuilds money from its stored amount and currency code
pub(crate) fn money(amount: Decimal, currency: &str) -> Result<Money, DatabaseError> {
    let currency = Currency::from_code(currency.trim())
        .ok_or_else(|| DatabaseError::corrupt(format!("unknown currency code '{}'", currency)))?;
    Ok(Money::new(amount, currency))
}
