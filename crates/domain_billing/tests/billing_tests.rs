//! Tests for domain_billing over the in-memory ports

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::directory::mock::MockDirectory;
use core_kernel::{
    BillId, BillingPeriod, Currency, ErrorKind, Frequency, GroupId, Money, PortError, Subject,
    Timezone, UserId,
};

use domain_billing::allocation::calculate;
use domain_billing::forecast::mock::FlatForecast;
use domain_billing::ports::mock::MockBillingPort;
use domain_billing::{
    AllocationInput, AllocationMethod, Bill, BillKind, BillStatus, BillingError, BillingPort,
    BillingService, ConsumptionSource, ForecastService, ForecastTarget, NewTemplate,
    RecurringBillService, TemplateAllocation, TemplateUpdate,
};

fn pln(amount: Decimal) -> Money {
    Money::new(amount, Currency::PLN)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn march_bill(kind: BillKind, total: Decimal) -> Bill {
    let period = BillingPeriod::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap();
    Bill::new(kind, period, pln(total), None).unwrap()
}

struct Household {
    port: Arc<MockBillingPort>,
    directory: Arc<MockDirectory>,
    service: Arc<BillingService>,
    users: Vec<UserId>,
}

async fn household(members: usize) -> Household {
    let users: Vec<UserId> = (0..members).map(|_| UserId::new()).collect();
    let port = Arc::new(MockBillingPort::new());
    let directory = Arc::new(MockDirectory::with_users(users.clone()).await);
    let service = Arc::new(BillingService::new(port.clone(), directory.clone(), Currency::PLN));
    Household { port, directory, service, users }
}

fn equal_inputs(users: &[UserId]) -> Vec<AllocationInput> {
    users.iter().map(|u| AllocationInput::new(Subject::User(*u))).collect()
}

// ============================================================================
// Allocation sum invariant
// ============================================================================

mod allocation_properties {
    use super::*;

    fn subjects(n: usize) -> Vec<Subject> {
        (0..n).map(|_| Subject::User(UserId::new())).collect()
    }

    proptest! {
        #[test]
        fn equal_split_sums_to_total(minor in 0i64..10_000_000, n in 1usize..12) {
            let total = Money::from_minor(minor, Currency::PLN);
            let inputs: Vec<_> = subjects(n).into_iter().map(AllocationInput::new).collect();
            let shares = calculate(total, &inputs, AllocationMethod::Equal).unwrap();
            let sum = Money::sum(Currency::PLN, shares.iter().map(|s| &s.amount)).unwrap();
            prop_assert_eq!(sum, total);
        }

        #[test]
        fn proportional_split_sums_to_total(
            minor in 0i64..10_000_000,
            units in prop::collection::vec(1u32..5_000, 1..10),
        ) {
            let total = Money::from_minor(minor, Currency::PLN);
            let inputs: Vec<_> = subjects(units.len())
                .into_iter()
                .zip(&units)
                .map(|(s, u)| AllocationInput::new(s).with_units(Decimal::from(*u) / dec!(10)))
                .collect();
            let shares = calculate(total, &inputs, AllocationMethod::Proportional).unwrap();
            let sum = Money::sum(Currency::PLN, shares.iter().map(|s| &s.amount)).unwrap();
            prop_assert_eq!(sum, total);
            prop_assert!(shares.iter().all(|s| !s.amount.is_negative()));
        }

        #[test]
        fn weighted_split_sums_to_total(
            minor in 0i64..10_000_000,
            weights in prop::collection::vec(prop::option::of(1u32..400), 1..10),
        ) {
            let total = Money::from_minor(minor, Currency::PLN);
            let inputs: Vec<_> = subjects(weights.len())
                .into_iter()
                .zip(&weights)
                .map(|(s, w)| match w {
                    Some(w) => AllocationInput::new(s).with_weight(Decimal::from(*w) / dec!(100)),
                    None => AllocationInput::new(s),
                })
                .collect();
            let shares = calculate(total, &inputs, AllocationMethod::Weight).unwrap();
            let sum = Money::sum(Currency::PLN, shares.iter().map(|s| &s.amount)).unwrap();
            prop_assert_eq!(sum, total);
        }

        #[test]
        fn shares_never_differ_by_more_than_one_grosz_in_equal_split(
            minor in 0i64..1_000_000,
            n in 1usize..12,
        ) {
            let total = Money::from_minor(minor, Currency::PLN);
            let inputs: Vec<_> = subjects(n).into_iter().map(AllocationInput::new).collect();
            let shares = calculate(total, &inputs, AllocationMethod::Equal).unwrap();
            let max = shares.iter().map(|s| s.amount.amount()).max().unwrap();
            let min = shares.iter().map(|s| s.amount.amount()).min().unwrap();
            prop_assert!(max - min <= dec!(0.01));
        }
    }
}

// ============================================================================
// Bill lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_post_twice_yields_one_transition() {
        let h = household(3).await;
        let bill = h.service.create_bill(march_bill(BillKind::Internet, dec!(90))).await.unwrap();
        h.service
            .compute_allocations(bill.id, equal_inputs(&h.users), AllocationMethod::Equal)
            .await
            .unwrap();

        let first = h.service.post_bill(bill.id).await.unwrap();
        assert_eq!(first.status, BillStatus::Posted);

        let second = h.service.post_bill(bill.id).await.unwrap_err();
        assert_eq!(second.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_concurrent_posts_serialize() {
        let h = household(2).await;
        let bill = h.service.create_bill(march_bill(BillKind::Internet, dec!(80))).await.unwrap();
        h.service
            .compute_allocations(bill.id, equal_inputs(&h.users), AllocationMethod::Equal)
            .await
            .unwrap();

        let bill_id = bill.id;
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = h.service.clone();
                tokio::spawn(async move { service.post_bill(bill_id).await })
            })
            .collect();

        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidState),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_post_without_allocations_rejected() {
        let h = household(1).await;
        let bill = h.service.create_bill(march_bill(BillKind::Gas, dec!(10))).await.unwrap();
        let err = h.service.post_bill(bill.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_close_requires_posted() {
        let h = household(1).await;
        let bill = h.service.create_bill(march_bill(BillKind::Gas, dec!(10))).await.unwrap();
        let err = h.service.close_bill(bill.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_posted_bill_rejects_mutation_closed_is_immutable() {
        let h = household(2).await;
        let user = h.users[0];
        let bill = h.service.create_bill(march_bill(BillKind::Electricity, dec!(100))).await.unwrap();
        h.service
            .compute_allocations(bill.id, equal_inputs(&h.users), AllocationMethod::Equal)
            .await
            .unwrap();
        h.service.post_bill(bill.id).await.unwrap();

        let posted = h
            .service
            .record_consumption(bill.id, user, dec!(5), None, ConsumptionSource::User)
            .await
            .unwrap_err();
        assert_eq!(posted.kind(), ErrorKind::InvalidState);

        h.service.close_bill(bill.id).await.unwrap();

        let closed = h
            .service
            .record_consumption(bill.id, user, dec!(5), None, ConsumptionSource::User)
            .await
            .unwrap_err();
        assert!(matches!(closed, BillingError::Immutable(_)));

        let realloc = h
            .service
            .compute_allocations(bill.id, equal_inputs(&h.users), AllocationMethod::Equal)
            .await
            .unwrap_err();
        assert_eq!(realloc.kind(), ErrorKind::Immutable);
    }

    #[tokio::test]
    async fn test_unknown_bill_not_found() {
        let h = household(1).await;
        let err = h.service.post_bill(BillId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_foreign_currency_rejected() {
        let h = household(1).await;
        let period = BillingPeriod::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap();
        let bill = Bill::new(BillKind::Gas, period, Money::new(dec!(10), Currency::EUR), None).unwrap();
        let err = h.service.create_bill(bill).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

// ============================================================================
// Allocation through the service
// ============================================================================

mod allocations {
    use super::*;

    #[tokio::test]
    async fn test_allocate_from_latest_consumption() {
        let h = household(2).await;
        let (alice, bob) = (h.users[0], h.users[1]);
        let bill = h
            .service
            .create_bill(march_bill(BillKind::Electricity, dec!(120.00)))
            .await
            .unwrap();

        h.service.record_consumption(bill.id, alice, dec!(10), None, ConsumptionSource::User).await.unwrap();
        h.service.record_consumption(bill.id, bob, dec!(20), None, ConsumptionSource::User).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        // admin corrects alice's reading
        h.service
            .record_consumption(bill.id, alice, dec!(40), Some(dec!(1234.5)), ConsumptionSource::Admin)
            .await
            .unwrap();

        let allocations = h
            .service
            .allocate_from_consumptions(bill.id, AllocationMethod::Proportional)
            .await
            .unwrap();

        let share = |user: UserId| {
            allocations
                .iter()
                .find(|a| a.subject == Subject::User(user))
                .map(|a| a.amount)
                .unwrap()
        };
        assert_eq!(share(alice), pln(dec!(80.00)));
        assert_eq!(share(bob), pln(dec!(40.00)));
        assert_eq!(h.service.list_consumptions(bill.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_recompute_replaces_previous_set() {
        let h = household(3).await;
        let bill = h.service.create_bill(march_bill(BillKind::Shared, dec!(100))).await.unwrap();

        h.service
            .compute_allocations(bill.id, equal_inputs(&h.users), AllocationMethod::Equal)
            .await
            .unwrap();
        h.service
            .compute_allocations(bill.id, equal_inputs(&h.users[..2]), AllocationMethod::Equal)
            .await
            .unwrap();

        let stored = h.service.list_allocations(bill.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        let sum = Money::sum(Currency::PLN, stored.iter().map(|a| &a.amount)).unwrap();
        assert_eq!(sum, bill.total_amount);
    }

    #[tokio::test]
    async fn test_override_finer_than_grosz_rejected() {
        let h = household(2).await;
        let bill = h.service.create_bill(march_bill(BillKind::Shared, dec!(100))).await.unwrap();
        let split = vec![
            AllocationInput::new(Subject::User(h.users[0])).with_amount(pln(dec!(33.335))),
            AllocationInput::new(Subject::User(h.users[1])).with_amount(pln(dec!(66.665))),
        ];
        let err = h
            .service
            .compute_allocations(bill.id, split, AllocationMethod::Override)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(h.service.list_allocations(bill.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_override_leaves_previous_allocations() {
        let h = household(2).await;
        let bill = h.service.create_bill(march_bill(BillKind::Shared, dec!(100))).await.unwrap();
        h.service
            .compute_allocations(bill.id, equal_inputs(&h.users), AllocationMethod::Equal)
            .await
            .unwrap();

        let bad = vec![
            AllocationInput::new(Subject::User(h.users[0])).with_amount(pln(dec!(70))),
            AllocationInput::new(Subject::User(h.users[1])).with_amount(pln(dec!(20))),
        ];
        let err = h
            .service
            .compute_allocations(bill.id, bad, AllocationMethod::Override)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationMismatch);

        let stored = h.service.list_allocations(bill.id).await.unwrap();
        assert!(stored.iter().all(|a| a.amount == pln(dec!(50))));
    }

    #[tokio::test]
    async fn test_group_weight_comes_from_directory() {
        let h = household(1).await;
        let group = GroupId::new();
        h.directory.add_group(group, dec!(3)).await;

        let bill = h.service.create_bill(march_bill(BillKind::Shared, dec!(100))).await.unwrap();
        let inputs = vec![
            AllocationInput::new(Subject::User(h.users[0])),
            AllocationInput::new(Subject::Group(group)),
        ];
        let allocations = h
            .service
            .compute_allocations(bill.id, inputs, AllocationMethod::Weight)
            .await
            .unwrap();

        assert_eq!(allocations[0].amount, pln(dec!(25)));
        assert_eq!(allocations[1].amount, pln(dec!(75)));
    }

    #[tokio::test]
    async fn test_unknown_subject_rejected() {
        let h = household(1).await;
        let bill = h.service.create_bill(march_bill(BillKind::Shared, dec!(100))).await.unwrap();
        let inputs = vec![AllocationInput::new(Subject::User(UserId::new()))];
        let err = h
            .service
            .compute_allocations(bill.id, inputs, AllocationMethod::Equal)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::SubjectNotFound(_)));
        assert!(h.port.list_allocations(bill.id).await.unwrap().is_empty());
    }
}

// ============================================================================
// Recurring generation
// ============================================================================

mod recurring {
    use super::*;

    fn template(day_of_month: u32, allocations: Vec<TemplateAllocation>, amount: Decimal) -> NewTemplate {
        NewTemplate {
            custom_type: "Internet".to_string(),
            frequency: Frequency::Monthly,
            day_of_month,
            amount: pln(amount),
            allocations,
            notes: None,
        }
    }

    fn halves(users: &[UserId]) -> Vec<TemplateAllocation> {
        users
            .iter()
            .map(|u| TemplateAllocation::percentage(Subject::User(*u), dec!(50)))
            .collect()
    }

    #[tokio::test]
    async fn test_day_31_clamps_into_april_and_recovers_in_may() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);

        let created = service
            .create_template(template(31, halves(&h.users), dec!(99.99)), noon(2024, 3, 31))
            .await
            .unwrap();
        assert_eq!(created.next_due_date, date(2024, 4, 30));

        let bills = service.generate_due_bills(noon(2024, 4, 30)).await.unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].period.start(), date(2024, 3, 30));
        assert_eq!(bills[0].period.end(), date(2024, 4, 30));
        assert_eq!(bills[0].payment_deadline, Some(date(2024, 4, 30)));
        assert_eq!(bills[0].status, BillStatus::Draft);

        let advanced = service.get_template(created.id).await.unwrap();
        assert_eq!(advanced.next_due_date, date(2024, 5, 31));
        assert!(advanced.last_generated_at.is_some());
    }

    #[tokio::test]
    async fn test_second_run_at_same_now_generates_nothing() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        service
            .create_template(template(5, halves(&h.users), dec!(60)), noon(2024, 1, 10))
            .await
            .unwrap();

        let now = noon(2024, 2, 5);
        assert_eq!(service.generate_due_bills(now).await.unwrap().len(), 1);
        assert!(service.generate_due_bills(now).await.unwrap().is_empty());
        assert_eq!(h.port.bill_count().await, 1);
    }

    #[tokio::test]
    async fn test_overlapping_sweeps_generate_once() {
        let h = household(2).await;
        let service = Arc::new(RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN));
        service
            .create_template(template(5, halves(&h.users), dec!(60)), noon(2024, 1, 10))
            .await
            .unwrap();

        let now = noon(2024, 2, 5);
        let sweeps: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.generate_due_bills(now).await })
            })
            .collect();

        let mut total = 0;
        for sweep in sweeps {
            total += sweep.await.unwrap().unwrap().len();
        }
        assert_eq!(total, 1);
        assert_eq!(h.port.bill_count().await, 1);
    }

    fn notes(text: &str) -> TemplateUpdate {
        TemplateUpdate {
            notes: Some(text.to_string()),
            ..Default::default()
        }
    }

    /// An edit planned before a sweep must not roll the due date back
    #[tokio::test]
    async fn test_stale_template_write_refused_after_sweep() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let created = service
            .create_template(template(5, halves(&h.users), dec!(60)), noon(2024, 1, 10))
            .await
            .unwrap();

        let stale = h.port.get_template(created.id).await.unwrap();
        let now = noon(2024, 2, 5);
        assert_eq!(service.generate_due_bills(now).await.unwrap().len(), 1);

        let mut edited = stale.clone();
        edited.apply_update(notes("router replaced")).unwrap();
        let write = h.port.update_template(&edited, &stale.version()).await;
        assert!(matches!(write, Err(PortError::Conflict { .. })));

        let stored = service.get_template(created.id).await.unwrap();
        assert_eq!(stored.next_due_date, date(2024, 3, 5));
        assert!(service.generate_due_bills(now).await.unwrap().is_empty());
        assert_eq!(h.port.bill_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_after_sweep_keeps_advanced_due_date() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let created = service
            .create_template(template(5, halves(&h.users), dec!(60)), noon(2024, 1, 10))
            .await
            .unwrap();

        let now = noon(2024, 2, 5);
        service.generate_due_bills(now).await.unwrap();
        let updated = service
            .update_template(created.id, notes("router replaced"))
            .await
            .unwrap();
        assert_eq!(updated.next_due_date, date(2024, 3, 5));
        assert_eq!(updated.notes.as_deref(), Some("router replaced"));
        assert!(updated.last_generated_at.is_some());

        assert!(service.generate_due_bills(now).await.unwrap().is_empty());
        assert_eq!(h.port.bill_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_does_not_revive_deactivated_template() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let created = service
            .create_template(template(5, halves(&h.users), dec!(60)), noon(2024, 1, 10))
            .await
            .unwrap();

        let stale = h.port.get_template(created.id).await.unwrap();
        service.deactivate_template(created.id).await.unwrap();

        let mut edited = stale.clone();
        edited.apply_update(notes("new price")).unwrap();
        let write = h.port.update_template(&edited, &stale.version()).await;
        assert!(matches!(write, Err(PortError::Conflict { .. })));

        let updated = service.update_template(created.id, notes("new price")).await.unwrap();
        assert!(!updated.is_active);
        assert!(service.generate_due_bills(noon(2024, 6, 1)).await.unwrap().is_empty());
        assert_eq!(h.port.bill_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_unknown_template_not_found() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let err = service
            .update_template(core_kernel::TemplateId::new_v7(), notes("x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fraction_shares_may_not_sum_to_amount() {
        let h = household(3).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let thirds = h
            .users
            .iter()
            .map(|u| TemplateAllocation::fraction(Subject::User(*u), 1, 3))
            .collect();
        service
            .create_template(template(1, thirds, dec!(10.00)), noon(2024, 1, 1))
            .await
            .unwrap();

        let bills = service.generate_due_bills(noon(2024, 2, 1)).await.unwrap();
        let allocations = h.port.list_allocations(bills[0].id).await.unwrap();
        assert!(allocations.iter().all(|a| a.amount == pln(dec!(3.33))));

        let sum = Money::sum(Currency::PLN, allocations.iter().map(|a| &a.amount)).unwrap();
        assert_eq!(sum, pln(dec!(9.99)));
        assert_ne!(sum, bills[0].total_amount);
    }

    #[tokio::test]
    async fn test_fixed_rule_copied_verbatim() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let rules = vec![
            TemplateAllocation::fixed(Subject::User(h.users[0]), pln(dec!(20))),
            TemplateAllocation::percentage(Subject::User(h.users[1]), dec!(100)),
        ];
        service
            .create_template(template(1, rules, dec!(50)), noon(2024, 1, 1))
            .await
            .unwrap();

        let bills = service.generate_due_bills(noon(2024, 2, 1)).await.unwrap();
        let allocations = h.port.list_allocations(bills[0].id).await.unwrap();
        let first = allocations.iter().find(|a| a.subject == Subject::User(h.users[0])).unwrap();
        assert_eq!(first.amount, pln(dec!(20)));
    }

    #[tokio::test]
    async fn test_inactive_template_skipped() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let created = service
            .create_template(template(5, halves(&h.users), dec!(60)), noon(2024, 1, 10))
            .await
            .unwrap();
        service.deactivate_template(created.id).await.unwrap();

        assert!(service.generate_due_bills(noon(2024, 6, 1)).await.unwrap().is_empty());
        assert!(service.list_templates(true).await.unwrap().is_empty());
        assert_eq!(service.list_templates(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_household_timezone_decides_the_day() {
        let h = household(2).await;
        let warsaw = Timezone::parse("Europe/Warsaw").unwrap();
        let local = RecurringBillService::new(h.port.clone(), warsaw, Currency::PLN);
        let utc = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);

        local
            .create_template(template(31, halves(&h.users), dec!(60)), noon(2024, 2, 29))
            .await
            .unwrap();

        // 23:30 UTC on the 30th is already the 31st in Warsaw
        let late = Utc.with_ymd_and_hms(2024, 3, 30, 23, 30, 0).unwrap();
        assert!(utc.generate_due_bills(late).await.unwrap().is_empty());
        assert_eq!(local.generate_due_bills(late).await.unwrap().len(), 1);
    }

    /// Such a template could never produce a valid bill
    #[tokio::test]
    async fn test_amount_finer_than_grosz_rejected() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);

        let err = service
            .create_template(template(1, halves(&h.users), dec!(10.005)), noon(2024, 1, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let rules = vec![
            TemplateAllocation::fixed(Subject::User(h.users[0]), pln(dec!(20.005))),
            TemplateAllocation::percentage(Subject::User(h.users[1]), dec!(100)),
        ];
        let err = service
            .create_template(template(1, rules, dec!(50)), noon(2024, 1, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(service.list_templates(false).await.unwrap().is_empty());

        let created = service
            .create_template(template(1, halves(&h.users), dec!(10.00)), noon(2024, 1, 1))
            .await
            .unwrap();
        let update = TemplateUpdate { amount: Some(pln(dec!(10.005))), ..Default::default() };
        let err = service.update_template(created.id, update).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(service.generate_due_bills(noon(2024, 2, 1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_template_rejected_at_create() {
        let h = household(2).await;
        let service = RecurringBillService::new(h.port.clone(), Timezone::default(), Currency::PLN);
        let rules = h
            .users
            .iter()
            .map(|u| TemplateAllocation::percentage(Subject::User(*u), dec!(45)))
            .collect();
        let err = service
            .create_template(template(1, rules, dec!(60)), noon(2024, 1, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationMismatch);
    }
}

// ============================================================================
// Forecasting boundary
// ============================================================================

mod forecasting {
    use super::*;

    #[tokio::test]
    async fn test_prediction_stored_from_posted_history() {
        let h = household(1).await;
        for month in 1..=3 {
            let period = BillingPeriod::new(date(2024, month, 1), date(2024, month, 28)).unwrap();
            let bill = Bill::new(BillKind::Gas, period, pln(dec!(100)), Some(dec!(50))).unwrap();
            let bill = h.service.create_bill(bill).await.unwrap();
            h.service
                .compute_allocations(bill.id, equal_inputs(&h.users), AllocationMethod::Equal)
                .await
                .unwrap();
            h.service.post_bill(bill.id).await.unwrap();
        }

        let forecasts = ForecastService::new(h.port.clone(), Arc::new(FlatForecast), Currency::PLN);
        let prediction = forecasts.recompute_prediction(ForecastTarget::Gas, None).await.unwrap();

        assert_eq!(prediction.horizon_months, 3);
        assert_eq!(prediction.predicted_units, dec!(150));
        assert_eq!(prediction.predicted_amount, pln(dec!(300)));
        assert_eq!(prediction.period_start, date(2024, 4, 1));
        assert_eq!(prediction.period_end, date(2024, 6, 1));
        assert_eq!(forecasts.list_predictions(Some(ForecastTarget::Gas)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drafts_do_not_count_as_history() {
        let h = household(1).await;
        for month in 1..=5 {
            let period = BillingPeriod::new(date(2024, month, 1), date(2024, month, 28)).unwrap();
            let bill = Bill::new(BillKind::Electricity, period, pln(dec!(80)), Some(dec!(40))).unwrap();
            h.service.create_bill(bill).await.unwrap();
        }

        let forecasts = ForecastService::new(h.port.clone(), Arc::new(FlatForecast), Currency::PLN);
        let err = forecasts
            .recompute_prediction(ForecastTarget::Electricity, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }
}
