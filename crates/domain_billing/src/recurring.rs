//! Recurring bill templates
//!
//! A template describes a bill that repeats (rent, internet, subscriptions):
//! its amount, how often it is due, and fixed/percentage/fraction shares.
//! Generation is deterministic: the template's `next_due_date` fixes the
//! bill's period, deadline and shares, and the following due date.
//!
//! Percentage and fraction shares are each rounded on their own, so the
//! generated shares are not guaranteed to add up to the bill amount.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use core_kernel::{Frequency, Money, Rate, Subject, TemplateId};

use crate::allocation::{Allocation, AllocationMethod, AllocationShare};
use crate::bill::{Bill, BillKind};
use crate::error::BillingError;

/// Non-fixed shares must add up to 100% within this tolerance
pub const SHARE_TOLERANCE: Decimal = dec!(0.001);

/// How a single subject's share of a recurring bill is derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "allocation_type", rename_all = "snake_case")]
pub enum AllocationRule {
    /// Exact amount, copied as is
    Fixed { amount: Money },
    /// Percentage of the template amount, in (0, 100]
    Percentage { percent: Decimal },
    /// `numerator / denominator` of the template amount
    Fraction { numerator: u32, denominator: u32 },
}

impl AllocationRule {
    /// Share of the total this rule stands for; None for fixed amounts
    pub fn ratio(&self) -> Option<Decimal> {
        match self {
            AllocationRule::Fixed { .. } => None,
            AllocationRule::Percentage { percent } => {
                Some(Rate::from_percentage(*percent).as_decimal())
            }
            AllocationRule::Fraction { numerator, denominator } => {
                Rate::from_fraction(*numerator, *denominator).map(|r| r.as_decimal())
            }
        }
    }

    /// Resolves the rule against the template amount
    pub fn resolve(&self, total: &Money) -> Money {
        match self {
            AllocationRule::Fixed { amount } => *amount,
            AllocationRule::Percentage { percent } => Rate::from_percentage(*percent).apply(total),
            AllocationRule::Fraction { numerator, denominator } => {
                Rate::from_fraction(*numerator, *denominator)
                    .map(|rate| rate.apply(total))
                    .unwrap_or_else(|| Money::zero(total.currency()))
            }
        }
    }

    fn validate(&self, subject: Subject, total: &Money) -> Result<(), BillingError> {
        match self {
            AllocationRule::Fixed { amount } => {
                if amount.currency() != total.currency() {
                    return Err(BillingError::validation(format!(
                        "fixed amount for {} is in {}, template is in {}",
                        subject,
                        amount.currency(),
                        total.currency()
                    )));
                }
                if amount.is_negative() {
                    return Err(BillingError::validation(format!(
                        "fixed amount for {} must not be negative, got {}",
                        subject, amount
                    )));
                }
                if !amount.is_whole_minor_units() {
                    return Err(BillingError::validation(format!(
                        "fixed amount for {} has more precision than {} allows, got {}",
                        subject,
                        amount.currency(),
                        amount.amount()
                    )));
                }
            }
            AllocationRule::Percentage { percent } => {
                if *percent <= Decimal::ZERO || *percent > dec!(100) {
                    return Err(BillingError::validation(format!(
                        "percentage for {} must be in (0, 100], got {}",
                        subject, percent
                    )));
                }
            }
            AllocationRule::Fraction { numerator, denominator } => {
                if *numerator == 0 || *denominator == 0 || numerator > denominator {
                    return Err(BillingError::validation(format!(
                        "fraction for {} must satisfy 0 < {} <= {}",
                        subject, numerator, denominator
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A subject and its share rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAllocation {
    pub subject: Subject,
    pub rule: AllocationRule,
}

impl TemplateAllocation {
    pub fn fixed(subject: Subject, amount: Money) -> Self {
        Self { subject, rule: AllocationRule::Fixed { amount } }
    }

    pub fn percentage(subject: Subject, percent: Decimal) -> Self {
        Self { subject, rule: AllocationRule::Percentage { percent } }
    }

    pub fn fraction(subject: Subject, numerator: u32, denominator: u32) -> Self {
        Self { subject, rule: AllocationRule::Fraction { numerator, denominator } }
    }
}

/// Fields needed to create a template
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub custom_type: String,
    pub frequency: Frequency,
    pub day_of_month: u32,
    pub amount: Money,
    pub allocations: Vec<TemplateAllocation>,
    pub notes: Option<String>,
}

/// Partial update; unset fields are left alone
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub custom_type: Option<String>,
    pub frequency: Option<Frequency>,
    pub day_of_month: Option<u32>,
    pub amount: Option<Money>,
    pub allocations: Option<Vec<TemplateAllocation>>,
    pub notes: Option<String>,
}

/// The stored state a template write was planned against
///
/// Generation advances `next_due_date`, deactivation clears `is_active`,
/// and every write moves `updated_at`; a write only lands while all three
/// still match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateVersion {
    pub next_due_date: NaiveDate,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// A bill that repeats on a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringBillTemplate {
    pub id: TemplateId,
    pub custom_type: String,
    pub frequency: Frequency,
    /// Requested day; clamped per month when the month is shorter
    pub day_of_month: u32,
    pub amount: Money,
    pub allocations: Vec<TemplateAllocation>,
    pub notes: Option<String>,
    pub next_due_date: NaiveDate,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringBillTemplate {
    /// Creates an active template; the first bill falls one frequency unit
    /// after `today`, on the requested day of month
    pub fn new(request: NewTemplate, today: NaiveDate) -> Result<Self, BillingError> {
        validate_template(&request.custom_type, request.day_of_month, &request.amount, &request.allocations)?;
        let next_due_date = request.frequency.advance(today, request.day_of_month)?;

        let now = Utc::now();
        Ok(Self {
            id: TemplateId::new_v7(),
            custom_type: request.custom_type,
            frequency: request.frequency,
            day_of_month: request.day_of_month,
            amount: request.amount,
            allocations: request.allocations,
            notes: request.notes,
            next_due_date,
            last_generated_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn version(&self) -> TemplateVersion {
        TemplateVersion {
            next_due_date: self.next_due_date,
            is_active: self.is_active,
            updated_at: self.updated_at,
        }
    }

    /// Applies an update and revalidates the whole template
    ///
    /// The pending due date keeps its month; a new day of month is pinned
    /// into it.
    pub fn apply_update(&mut self, update: TemplateUpdate) -> Result<(), BillingError> {
        let mut next = self.clone();
        if let Some(custom_type) = update.custom_type {
            next.custom_type = custom_type;
        }
        if let Some(frequency) = update.frequency {
            next.frequency = frequency;
        }
        if let Some(day_of_month) = update.day_of_month {
            next.day_of_month = day_of_month;
        }
        if let Some(amount) = update.amount {
            next.amount = amount;
        }
        if let Some(allocations) = update.allocations {
            next.allocations = allocations;
        }
        if update.notes.is_some() {
            next.notes = update.notes;
        }

        validate_template(&next.custom_type, next.day_of_month, &next.amount, &next.allocations)?;
        next.next_due_date =
            core_kernel::temporal::pin_day_of_month(next.next_due_date, next.day_of_month)?;
        next.updated_at = Utc::now();

        *self = next;
        Ok(())
    }

    /// True when the template should generate a bill for `today`
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_active && self.next_due_date <= today
    }

    /// Shares as stored, resolved against the template amount
    pub fn resolve_shares(&self) -> Vec<AllocationShare> {
        self.allocations
            .iter()
            .map(|a| AllocationShare {
                subject: a.subject,
                amount: a.rule.resolve(&self.amount),
                units: Decimal::ZERO,
            })
            .collect()
    }

    /// Builds the bill, its allocations and the advanced due date for the
    /// current `next_due_date`. Nothing is persisted here.
    pub fn plan_generation(&self, now: DateTime<Utc>) -> Result<BillGeneration, BillingError> {
        let due = self.next_due_date;
        let period = self.frequency.period_ending(due)?;

        let mut bill = Bill::new(BillKind::Other, period, self.amount, None)?
            .with_custom_type(self.custom_type.clone())
            .with_payment_deadline(due)
            .with_template(self.id);
        bill.notes = self.notes.clone();
        bill.created_at = now;
        bill.updated_at = now;

        let allocations = self
            .resolve_shares()
            .into_iter()
            .map(|share| Allocation::from_share(bill.id, AllocationMethod::Override, share))
            .collect();

        Ok(BillGeneration {
            template_id: self.id,
            expected_due_date: due,
            next_due_date: self.frequency.advance(due, self.day_of_month)?,
            generated_at: now,
            bill,
            allocations,
        })
    }
}

/// Everything one generation step writes, committed as a unit
#[derive(Debug, Clone)]
pub struct BillGeneration {
    pub template_id: TemplateId,
    /// The template's due date when the plan was made; the commit only
    /// succeeds if it is still the stored value
    pub expected_due_date: NaiveDate,
    pub next_due_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub bill: Bill,
    pub allocations: Vec<Allocation>,
}

/// Validates template fields shared by create and update
pub fn validate_template(
    custom_type: &str,
    day_of_month: u32,
    amount: &Money,
    allocations: &[TemplateAllocation],
) -> Result<(), BillingError> {
    if custom_type.trim().is_empty() {
        return Err(BillingError::validation("custom type must not be empty"));
    }
    if !(1..=31).contains(&day_of_month) {
        return Err(BillingError::validation(format!(
            "day of month must be in 1..=31, got {}",
            day_of_month
        )));
    }
    if amount.is_negative() {
        return Err(BillingError::validation(format!(
            "template amount must not be negative, got {}",
            amount
        )));
    }
    // generated bills must pass Bill::new
    if !amount.is_whole_minor_units() {
        return Err(BillingError::validation(format!(
            "template amount {} has more precision than {} allows",
            amount.amount(),
            amount.currency()
        )));
    }
    validate_allocations(amount, allocations)
}

/// Checks each rule and that the non-fixed shares cover 100%
pub fn validate_allocations(
    amount: &Money,
    allocations: &[TemplateAllocation],
) -> Result<(), BillingError> {
    if allocations.is_empty() {
        return Err(BillingError::validation("at least one allocation is required"));
    }

    let mut seen = BTreeSet::new();
    let mut ratio_sum = Decimal::ZERO;
    let mut has_ratio = false;
    for allocation in allocations {
        if !seen.insert(allocation.subject) {
            return Err(BillingError::validation(format!(
                "subject {} appears more than once",
                allocation.subject
            )));
        }
        allocation.rule.validate(allocation.subject, amount)?;
        if let Some(ratio) = allocation.rule.ratio() {
            ratio_sum += ratio;
            has_ratio = true;
        }
    }

    if has_ratio && (ratio_sum - Decimal::ONE).abs() > SHARE_TOLERANCE {
        return Err(BillingError::AllocationMismatch {
            expected: "100%".to_string(),
            actual: format!("{}%", (ratio_sum * dec!(100)).round_dp(2)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, UserId};

    fn pln(amount: Decimal) -> Money {
        Money::new(amount, Currency::PLN)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn user() -> Subject {
        Subject::User(UserId::new())
    }

    fn rent(allocations: Vec<TemplateAllocation>) -> NewTemplate {
        NewTemplate {
            custom_type: "Rent".to_string(),
            frequency: Frequency::Monthly,
            day_of_month: 10,
            amount: pln(dec!(3000)),
            allocations,
            notes: None,
        }
    }

    #[test]
    fn test_thirds_pass_tolerance() {
        let allocations = vec![
            TemplateAllocation::fraction(user(), 1, 3),
            TemplateAllocation::fraction(user(), 1, 3),
            TemplateAllocation::fraction(user(), 1, 3),
        ];
        assert!(validate_allocations(&pln(dec!(100)), &allocations).is_ok());
    }

    #[test]
    fn test_percentages_must_cover_whole() {
        let allocations = vec![
            TemplateAllocation::percentage(user(), dec!(50)),
            TemplateAllocation::percentage(user(), dec!(40)),
        ];
        let result = validate_allocations(&pln(dec!(100)), &allocations);
        assert!(matches!(result, Err(BillingError::AllocationMismatch { .. })));
    }

    #[test]
    fn test_fixed_only_skips_ratio_check() {
        let allocations = vec![TemplateAllocation::fixed(user(), pln(dec!(20)))];
        assert!(validate_allocations(&pln(dec!(100)), &allocations).is_ok());
    }

    #[test]
    fn test_rule_ranges() {
        let bad = [
            TemplateAllocation::percentage(user(), dec!(0)),
            TemplateAllocation::percentage(user(), dec!(100.5)),
            TemplateAllocation::fraction(user(), 0, 2),
            TemplateAllocation::fraction(user(), 3, 2),
            TemplateAllocation::fraction(user(), 1, 0),
            TemplateAllocation::fixed(user(), pln(dec!(-1))),
            TemplateAllocation::fixed(user(), pln(dec!(20.005))),
        ];
        for allocation in bad {
            let result = validate_allocations(&pln(dec!(100)), &[allocation.clone()]);
            assert!(
                matches!(result, Err(BillingError::Validation(_))),
                "{:?} should be rejected",
                allocation
            );
        }
    }

    #[test]
    fn test_new_template_due_one_unit_after_today() {
        let template = RecurringBillTemplate::new(
            rent(vec![TemplateAllocation::percentage(user(), dec!(100))]),
            date(2024, 1, 20),
        )
        .unwrap();
        assert_eq!(template.next_due_date, date(2024, 2, 10));
        assert!(template.is_active);
    }

    #[test]
    fn test_amount_below_minor_unit_rejected() {
        let mut request = rent(vec![TemplateAllocation::percentage(user(), dec!(100))]);
        request.amount = pln(dec!(10.005));
        let result = RecurringBillTemplate::new(request, date(2024, 1, 1));
        assert!(matches!(result, Err(BillingError::Validation(_))));

        let mut template = RecurringBillTemplate::new(
            rent(vec![TemplateAllocation::percentage(user(), dec!(100))]),
            date(2024, 1, 1),
        )
        .unwrap();
        let update = TemplateUpdate { amount: Some(pln(dec!(99.999))), ..Default::default() };
        assert!(template.apply_update(update).is_err());
        assert_eq!(template.amount, pln(dec!(3000)));
    }

    #[test]
    fn test_day_of_month_out_of_range() {
        let mut request = rent(vec![TemplateAllocation::percentage(user(), dec!(100))]);
        request.day_of_month = 32;
        assert!(RecurringBillTemplate::new(request, date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_plan_generation_fields() {
        let mut template = RecurringBillTemplate::new(
            rent(vec![
                TemplateAllocation::fraction(user(), 1, 3),
                TemplateAllocation::fraction(user(), 2, 3),
            ]),
            date(2024, 1, 1),
        )
        .unwrap();
        template.notes = Some("landlord account".to_string());

        let plan = template.plan_generation(Utc::now()).unwrap();
        assert_eq!(plan.bill.kind, BillKind::Other);
        assert_eq!(plan.bill.custom_type.as_deref(), Some("Rent"));
        assert_eq!(plan.bill.payment_deadline, Some(date(2024, 2, 10)));
        assert_eq!(plan.bill.recurring_template_id, Some(template.id));
        assert_eq!(plan.bill.notes.as_deref(), Some("landlord account"));
        assert_eq!(plan.bill.period.start(), date(2024, 1, 10));
        assert_eq!(plan.bill.period.end(), date(2024, 2, 10));
        assert_eq!(plan.next_due_date, date(2024, 3, 10));
        assert_eq!(plan.allocations[0].amount, pln(dec!(1000.00)));
        assert_eq!(plan.allocations[1].amount, pln(dec!(2000.00)));
    }

    #[test]
    fn test_update_revalidates_and_repins() {
        let mut template = RecurringBillTemplate::new(
            rent(vec![TemplateAllocation::percentage(user(), dec!(100))]),
            date(2024, 1, 1),
        )
        .unwrap();

        let rejected = template.apply_update(TemplateUpdate {
            allocations: Some(vec![TemplateAllocation::percentage(user(), dec!(60))]),
            ..Default::default()
        });
        assert!(rejected.is_err());
        assert_eq!(template.allocations.len(), 1);

        template
            .apply_update(TemplateUpdate {
                day_of_month: Some(31),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(template.next_due_date, date(2024, 2, 29));
    }
}
