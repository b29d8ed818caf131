//! Recurring Bill Scheduler
//!
//! The external timer that drives `generate_due_bills`. Overlapping runs
//! are harmless: each template's advance is conditional, so a second sweep
//! over the same due date generates nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_scheduler::Sweeper;
//!
//! let sweeper = Sweeper::new(service);
//! sweeper.run(Some(Duration::from_secs(3600)), shutdown_signal()).await;
//! ```

pub mod config;

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use domain_billing::{Bill, BillingError, RecurringBillService};

pub use config::{ConfigError, SweepConfig};

/// Runs the recurring bill sweep
pub struct Sweeper {
    service: Arc<RecurringBillService>,
}

impl Sweeper {
    pub fn new(service: Arc<RecurringBillService>) -> Self {
        Self { service }
    }

    /// One sweep at the current instant
    pub async fn sweep_once(&self) -> Result<Vec<Bill>, BillingError> {
        let now = Utc::now();
        let generated = self.service.generate_due_bills(now).await?;
        info!(generated = generated.len(), at = %now, "sweep finished");
        Ok(generated)
    }

    /// Sweeps once, or every `interval` until `shutdown` resolves
    ///
    /// A failed sweep is logged and the next tick tries again. Returns the
    /// number of sweeps that completed.
    pub async fn run<F>(&self, interval: Option<Duration>, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let Some(interval) = interval else {
            return self.tick().await;
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut completed = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(completed, "sweeper stopping");
                    return completed;
                }
                _ = ticker.tick() => {
                    completed += self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) -> usize {
        match self.sweep_once().await {
            Ok(_) => 1,
            Err(e) => {
                error!(error = %e, "sweep failed");
                0
            }
        }
    }
}
