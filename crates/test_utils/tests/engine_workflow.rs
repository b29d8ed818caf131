//! End-to-end household workflows over the in-memory ports
//!
//! These cover flows that cross bills, recurring templates, forecasts, and
//! loans, the way a household would use them over a few months.

use chrono::{Datelike, Utc};
use core_kernel::{ErrorKind, Frequency, Subject};
use domain_billing::{
    AllocationInput, AllocationMethod, BillKind, BillStatus, ConsumptionSource, ForecastTarget,
    NewTemplate, TemplateAllocation,
};
use domain_loans::LoanFilter;
use proptest::prelude::*;
use rust_decimal_macros::dec;
use test_utils::*;

mod monthly_utilities {
    use super::*;

    /// Readings, a proportional split, posting, and closing on one bill
    #[tokio::test]
    async fn test_electricity_bill_from_readings_to_closed() {
        let h = TestHousehold::new().await;
        let bill = TestBillBuilder::electricity(dec!(300))
            .with_total(MoneyFixtures::pln_indivisible())
            .build();
        let bill = h.billing.create_bill(bill).await.unwrap();

        for (user, units) in h.users.iter().zip([dec!(100), dec!(100), dec!(100)]) {
            h.billing
                .record_consumption(bill.id, *user, units, None, ConsumptionSource::User)
                .await
                .unwrap();
        }

        let allocations = h
            .billing
            .allocate_from_consumptions(bill.id, AllocationMethod::Proportional)
            .await
            .unwrap();
        assert_allocations_balance(&bill, &allocations);
        assert_shares_even(&allocations);

        let posted = h.billing.post_bill(bill.id).await.unwrap();
        assert_eq!(posted.status, BillStatus::Posted);

        let late = h
            .billing
            .record_consumption(bill.id, h.user(0), dec!(5), None, ConsumptionSource::User)
            .await;
        assert_error_kind(&late, ErrorKind::InvalidState, |e| e.kind());

        let closed = h.billing.close_bill(bill.id).await.unwrap();
        assert_eq!(closed.status, BillStatus::Closed);

        let reopen = h
            .billing
            .compute_allocations(
                bill.id,
                vec![AllocationInput::new(Subject::User(h.user(0)))],
                AllocationMethod::Equal,
            )
            .await;
        assert_error_kind(&reopen, ErrorKind::Immutable, |e| e.kind());
    }

    /// A group counts with its directory weight next to individual users
    #[tokio::test]
    async fn test_shared_budget_weighted_with_group() {
        let h = TestHousehold::new().await;
        let couple = h.add_group(dec!(2)).await;
        let bill = h
            .billing
            .create_bill(
                TestBillBuilder::new()
                    .with_kind(BillKind::Shared)
                    .with_total(MoneyFixtures::pln(dec!(300)))
                    .build(),
            )
            .await
            .unwrap();

        let allocations = h
            .billing
            .compute_allocations(
                bill.id,
                vec![
                    AllocationInput::new(Subject::Group(couple)),
                    AllocationInput::new(Subject::User(h.user(2))),
                ],
                AllocationMethod::Weight,
            )
            .await
            .unwrap();

        let group_share = allocations
            .iter()
            .find(|a| a.subject == Subject::Group(couple))
            .unwrap();
        assert_money_eq(&group_share.amount, &MoneyFixtures::pln(dec!(200)));
        assert_allocations_balance(&bill, &allocations);
    }

    /// Three months of posted gas bills feed a forecast
    #[tokio::test]
    async fn test_posted_history_feeds_forecast() {
        let h = TestHousehold::new().await;
        for month in 1..=3 {
            let bill = TestBillBuilder::new()
                .with_kind(BillKind::Gas)
                .with_units(dec!(40))
                .with_period(TemporalFixtures::month(2024, month))
                .with_total(MoneyFixtures::pln(dec!(120)))
                .build();
            let bill = h.billing.create_bill(bill).await.unwrap();
            let inputs = h.users.iter().map(|u| AllocationInput::new(Subject::User(*u))).collect();
            h.billing
                .compute_allocations(bill.id, inputs, AllocationMethod::Equal)
                .await
                .unwrap();
            h.billing.post_bill(bill.id).await.unwrap();
        }

        let prediction = h
            .forecasts
            .recompute_prediction(ForecastTarget::Gas, Some(2))
            .await
            .unwrap();
        assert_eq!(prediction.horizon_months, 2);
        assert_eq!(prediction.predicted_units, dec!(80));
        assert_money_eq(&prediction.predicted_amount, &MoneyFixtures::pln(dec!(240)));
        assert_eq!(prediction.created_from, "bills");
    }
}

mod recurring_into_ledger {
    use super::*;

    /// A generated bill is an ordinary draft that can be posted as is
    #[tokio::test]
    async fn test_generated_bill_posts_without_recompute() {
        let h = TestHousehold::new().await;
        let allocations = h
            .users
            .iter()
            .map(|u| TemplateAllocation::fraction(Subject::User(*u), 1, 3))
            .collect();
        h.recurring
            .create_template(
                NewTemplate {
                    custom_type: "Internet".to_string(),
                    frequency: Frequency::Monthly,
                    day_of_month: 10,
                    amount: MoneyFixtures::pln(dec!(90)),
                    allocations,
                    notes: Some("fibre".to_string()),
                },
                TemporalFixtures::noon(2023, 12, 20),
            )
            .await
            .unwrap();

        let generated = h
            .recurring
            .generate_due_bills(TemporalFixtures::noon(2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(generated.len(), 1);

        let bill = &generated[0];
        assert_eq!(bill.status, BillStatus::Draft);
        assert_eq!(bill.period.end().day(), 10);

        let stored = h.billing.list_allocations(bill.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|a| a.method == AllocationMethod::Override));
        assert_allocations_balance(bill, &stored);

        let posted = h.billing.post_bill(bill.id).await.unwrap();
        assert_eq!(posted.status, BillStatus::Posted);
    }
}

mod loans_alongside_bills {
    use super::*;

    /// Loans in both directions net to one balance per pair
    #[tokio::test]
    async fn test_household_balances_after_payments() {
        let h = TestHousehold::new().await;
        let (alice, bob, carol) = (IdFixtures::alice(), IdFixtures::bob(), IdFixtures::carol());

        let groceries = h
            .loans
            .create_loan(alice, bob, MoneyFixtures::pln(dec!(120)), Some("groceries".into()))
            .await
            .unwrap();
        h.loans
            .create_loan(bob, alice, MoneyFixtures::pln(dec!(20)), None)
            .await
            .unwrap();
        h.loans
            .create_loan(carol, alice, MoneyFixtures::pln(dec!(45)), None)
            .await
            .unwrap();

        h.loans
            .create_loan_payment(groceries.id, MoneyFixtures::pln(dec!(30)), Utc::now(), None)
            .await
            .unwrap();

        let balances = h.loans.get_balances().await.unwrap();
        assert_one_direction_per_pair(&balances);
        assert_owes(&balances, bob, alice, &MoneyFixtures::pln(dec!(70)));
        assert_owes(&balances, alice, carol, &MoneyFixtures::pln(dec!(45)));

        let alice_balance = h.loans.get_user_balance(alice).await.unwrap();
        assert_money_eq(&alice_balance.owed_by_others, &MoneyFixtures::pln(dec!(70)));
        assert_money_eq(&alice_balance.owes_to_others, &MoneyFixtures::pln(dec!(45)));
        assert_money_eq(&alice_balance.net, &MoneyFixtures::pln(dec!(25)));

        let open_for_bob = h
            .loans
            .list_loans(&LoanFilter { involving: Some(bob), unsettled_only: true })
            .await
            .unwrap();
        assert_eq!(open_for_bob.len(), 2);
    }

    #[tokio::test]
    async fn test_loan_between_strangers_rejected() {
        let h = TestHousehold::new().await;
        let stranger = core_kernel::UserId::new();
        let result = h
            .loans
            .create_loan(IdFixtures::alice(), stranger, MoneyFixtures::pln_100(), None)
            .await;
        assert_error_kind(&result, ErrorKind::NotFound, |e| e.kind());
        assert!(h.loans.get_balances().await.unwrap().is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn netted_debts_keep_one_direction_per_pair(
        debts in debts_strategy(IdFixtures::household(), 12)
    ) {
        let balances = domain_loans::net_debts(debts, core_kernel::Currency::PLN).unwrap();
        assert_one_direction_per_pair(&balances);
    }

    #[test]
    fn proportional_split_balances(
        inputs in proportional_inputs_strategy(8),
        total in pln_total_strategy(),
    ) {
        let shares = domain_billing::allocation::calculate(total, &inputs, AllocationMethod::Proportional).unwrap();
        let sum = core_kernel::Money::sum(total.currency(), shares.iter().map(|s| &s.amount)).unwrap();
        prop_assert_eq!(sum, total);
    }
}
