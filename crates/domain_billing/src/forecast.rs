//! Forecasting boundary
//!
//! The engine does no forecasting itself. It turns posted bill history into
//! the request shape an external forecasting collaborator understands and
//! turns that collaborator's response into a stored `Prediction`. This is
//! the only place Money crosses into floating point, and only outwards.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Currency, DomainPort, Money, PortError, PredictionId};

use crate::bill::{Bill, BillKind, BillStatus};
use crate::error::BillingError;

/// Fewest history points a forecast can be built from
pub const MIN_HISTORY_POINTS: usize = 3;
/// Months ahead when the caller does not say
pub const DEFAULT_HORIZON_MONTHS: u32 = 3;
/// Confidence level sent with every request
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// What is being forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastTarget {
    Electricity,
    Gas,
    SharedBudget,
}

impl ForecastTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastTarget::Electricity => "electricity",
            ForecastTarget::Gas => "gas",
            ForecastTarget::SharedBudget => "shared_budget",
        }
    }

    /// The kind of bill whose history feeds this target
    pub fn bill_kind(&self) -> BillKind {
        match self {
            ForecastTarget::Electricity => BillKind::Electricity,
            ForecastTarget::Gas => BillKind::Gas,
            ForecastTarget::SharedBudget => BillKind::Shared,
        }
    }

    /// Utilities forecast units, the shared budget forecasts money
    pub fn is_metered(&self) -> bool {
        self.bill_kind().is_metered()
    }
}

impl fmt::Display for ForecastTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastTarget {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "electricity" => Ok(ForecastTarget::Electricity),
            "gas" => Ok(ForecastTarget::Gas),
            "shared_budget" => Ok(ForecastTarget::SharedBudget),
            other => Err(BillingError::validation(format!(
                "invalid forecast target {}, must be electricity, gas, or shared_budget",
                other
            ))),
        }
    }
}

/// Request sent to the forecasting collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub target: ForecastTarget,
    pub historical_dates: Vec<DateTime<Utc>>,
    pub historical_values: Vec<f64>,
    pub horizon_months: u32,
    pub confidence_level: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_unit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub fit_stats: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Response returned by the forecasting collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub target: ForecastTarget,
    pub model: ModelInfo,
    pub predicted_dates: Vec<DateTime<Utc>>,
    pub predicted_values: Vec<f64>,
    #[serde(default)]
    pub confidence_interval: ConfidenceInterval,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicted_costs: Vec<f64>,
    pub created_at: DateTime<Utc>,
}

/// A stored forecast summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub target: ForecastTarget,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub horizon_months: u32,
    /// Sum of predicted values (units, or money for the shared budget)
    pub predicted_units: Decimal,
    /// Sum of predicted costs
    pub predicted_amount: Money,
    pub model_name: String,
    pub model_version: String,
    /// Which records the history came from
    pub created_from: String,
    pub created_at: DateTime<Utc>,
}

/// The external forecasting collaborator
#[async_trait]
pub trait ForecastPort: DomainPort {
    async fn forecast(&self, request: ForecastRequest) -> Result<ForecastResponse, PortError>;
}

/// Builds a request from bill history
///
/// Only posted and closed bills of the target's kind are used, oldest
/// period first. Utilities report units and an average cost per unit over
/// the whole history; the shared budget reports amounts.
pub fn build_request(
    target: ForecastTarget,
    bills: &[Bill],
    horizon_months: Option<u32>,
) -> Result<ForecastRequest, BillingError> {
    let mut history: Vec<&Bill> = bills
        .iter()
        .filter(|b| b.kind == target.bill_kind())
        .filter(|b| matches!(b.status, BillStatus::Posted | BillStatus::Closed))
        .collect();
    history.sort_by_key(|b| b.period.start());

    if history.len() < MIN_HISTORY_POINTS {
        return Err(BillingError::InsufficientData {
            target: target.to_string(),
            points: history.len(),
            required: MIN_HISTORY_POINTS,
        });
    }

    let horizon_months = match horizon_months {
        None | Some(0) => DEFAULT_HORIZON_MONTHS,
        Some(h) => h,
    };

    let historical_dates = history
        .iter()
        .map(|b| b.period.start().and_time(chrono::NaiveTime::MIN).and_utc())
        .collect();

    let (historical_values, cost_per_unit) = if target.is_metered() {
        let mut total_amount = Decimal::ZERO;
        let mut total_units = Decimal::ZERO;
        let values = history
            .iter()
            .map(|b| {
                let units = b.total_units.unwrap_or(Decimal::ZERO);
                total_amount += b.total_amount.amount();
                total_units += units;
                decimal_to_f64(units)
            })
            .collect();
        let cost = if total_units > Decimal::ZERO {
            decimal_to_f64(total_amount / total_units)
        } else {
            0.0
        };
        (values, Some(cost))
    } else {
        let values = history.iter().map(|b| b.total_amount.to_f64_lossy()).collect();
        (values, None)
    };

    Ok(ForecastRequest {
        target,
        historical_dates,
        historical_values,
        horizon_months,
        confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        cost_per_unit,
    })
}

/// Summarises a collaborator response into a stored prediction
pub fn summarize_response(
    request: &ForecastRequest,
    response: ForecastResponse,
    currency: Currency,
) -> Result<Prediction, BillingError> {
    let (first, last) = match (response.predicted_dates.first(), response.predicted_dates.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return Err(BillingError::Port(PortError::validation(
                "forecast response contains no predicted dates",
            )))
        }
    };

    let units: f64 = response.predicted_values.iter().sum();
    let cost: f64 = response.predicted_costs.iter().sum();
    let predicted_units = Decimal::from_f64(units)
        .ok_or_else(|| PortError::validation(format!("predicted units not finite: {}", units)))?
        .round_dp(4);
    let predicted_amount = Money::from_f64_rounded(cost, currency)?;

    Ok(Prediction {
        id: PredictionId::new_v7(),
        target: request.target,
        period_start: first.date_naive(),
        period_end: last.date_naive(),
        horizon_months: request.horizon_months,
        predicted_units,
        predicted_amount,
        model_name: response.model.name,
        model_version: response.model.version,
        created_from: "bills".to_string(),
        created_at: Utc::now(),
    })
}

fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or_default()
}

/// Canned forecaster for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Months;

    /// Repeats the last historical value for every month of the horizon
    #[derive(Debug, Default)]
    pub struct FlatForecast;

    impl DomainPort for FlatForecast {}

    #[async_trait]
    impl ForecastPort for FlatForecast {
        async fn forecast(&self, request: ForecastRequest) -> Result<ForecastResponse, PortError> {
            let last_value = request.historical_values.last().copied().unwrap_or_default();
            let last_date = request
                .historical_dates
                .last()
                .copied()
                .ok_or_else(|| PortError::validation("empty history"))?;

            let predicted_dates: Vec<DateTime<Utc>> = (1..=request.horizon_months)
                .filter_map(|m| last_date.checked_add_months(Months::new(m)))
                .collect();
            let predicted_values = vec![last_value; predicted_dates.len()];
            let predicted_costs = match request.cost_per_unit {
                Some(cost) => predicted_values.iter().map(|v| v * cost).collect(),
                None => predicted_values.clone(),
            };

            Ok(ForecastResponse {
                target: request.target,
                model: ModelInfo {
                    name: "flat".to_string(),
                    version: "1".to_string(),
                    parameters: serde_json::Value::Null,
                    fit_stats: serde_json::Value::Null,
                },
                confidence_interval: ConfidenceInterval {
                    lower: predicted_values.clone(),
                    upper: predicted_values.clone(),
                },
                predicted_dates,
                predicted_values,
                predicted_costs,
                created_at: Utc::now(),
            })
        }
    }
}
