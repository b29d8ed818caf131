//! Household Ledger - Recurring Bill Sweep
//!
//! Generates bills from every due recurring template. Runs a single sweep
//! by default; set `SWEEP_INTERVAL_SECS` to keep running on an interval.
//!
//! # Usage
//!
//! ```bash
//! SWEEP_DATABASE_URL=postgres://... cargo run --bin household-sweep
//! SWEEP_INTERVAL_SECS=3600 cargo run --bin household-sweep
//! ```
//!
//! # Environment Variables
//!
//! * `SWEEP_DATABASE_URL` - PostgreSQL connection string
//! * `SWEEP_TIMEZONE` - household timezone (default: Europe/Warsaw)
//! * `SWEEP_CURRENCY` - household currency (default: PLN)
//! * `SWEEP_INTERVAL_SECS` - seconds between sweeps, 0 for a single run
//! * `SWEEP_MAX_CONNECTIONS` - pool size (default: 2)
//! * `SWEEP_LOG_LEVEL` - trace, debug, info, warn, error (default: info)

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::RecurringBillService;
use infra_db::{apply_schema, create_pool, DatabaseConfig, PostgresBillingAdapter};
use interface_scheduler::{SweepConfig, Sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = SweepConfig::from_env().context("loading sweep configuration")?;
    init_tracing(&config.log_level);

    let timezone = config.household_timezone()?;
    let currency = config.household_currency()?;

    tracing::info!(
        timezone = %config.timezone,
        currency = %config.currency,
        interval_secs = config.interval_secs,
        "starting recurring bill sweep"
    );

    let pool = create_pool(
        DatabaseConfig::new(config.database_url.clone())
            .max_connections(config.max_connections)
            .min_connections(1),
    )
    .await
    .context("connecting to database")?;
    apply_schema(&pool).await.context("applying schema")?;

    let port = Arc::new(PostgresBillingAdapter::new(pool.clone()));
    let service = Arc::new(RecurringBillService::new(port, timezone, currency));
    let sweeper = Sweeper::new(service);

    let completed = sweeper.run(config.interval(), shutdown_signal()).await;
    pool.close().await;

    tracing::info!(completed, "sweep shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, stopping sweep"),
        _ = terminate => tracing::info!("received SIGTERM, stopping sweep"),
    }
}
