//! Property-Based Test Generators
//!
//! Proptest strategies for ledger data that respects the domain's
//! invariants (whole minor units, distinct parties, ascending periods).

use core_kernel::{Currency, GroupId, Money, Subject, UserId};
use domain_billing::AllocationInput;
use domain_loans::Debt;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Currencies the household may run in
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::PLN),
        Just(Currency::EUR),
        Just(Currency::USD),
        Just(Currency::GBP),
        Just(Currency::CHF),
        Just(Currency::CZK),
        Just(Currency::JPY),
    ]
}

/// Non-negative bill totals in PLN, up to 100 000 zł
pub fn pln_total_strategy() -> impl Strategy<Value = Money> {
    (0i64..10_000_000i64).prop_map(|minor| Money::from_minor(minor, Currency::PLN))
}

/// Strictly positive PLN amounts, up to 10 000 zł
pub fn pln_positive_strategy() -> impl Strategy<Value = Money> {
    (1i64..1_000_000i64).prop_map(|minor| Money::from_minor(minor, Currency::PLN))
}

/// Metered units with up to three decimal places
pub fn units_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000i64).prop_map(|n| Decimal::new(n, 3))
}

/// Positive weights between 0.1 and 10.0
pub fn weight_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=100i64).prop_map(|n| Decimal::new(n, 1))
}

/// Between 1 and `max` distinct user subjects
pub fn user_subjects_strategy(max: usize) -> impl Strategy<Value = Vec<Subject>> {
    (1..=max).prop_map(|n| (0..n).map(|_| Subject::User(UserId::new())).collect())
}

/// A mix of user and group subjects, at least one of each
pub fn mixed_subjects_strategy() -> impl Strategy<Value = Vec<Subject>> {
    (1usize..6, 1usize..3).prop_map(|(users, groups)| {
        let mut subjects: Vec<Subject> = (0..users).map(|_| Subject::User(UserId::new())).collect();
        subjects.extend((0..groups).map(|_| Subject::Group(GroupId::new())));
        subjects
    })
}

/// Proportional inputs with a strictly positive unit sum
pub fn proportional_inputs_strategy(max: usize) -> impl Strategy<Value = Vec<AllocationInput>> {
    prop::collection::vec(1i64..1_000_000i64, 1..=max).prop_map(|units| {
        units
            .into_iter()
            .map(|u| AllocationInput::new(Subject::User(UserId::new())).with_units(Decimal::new(u, 2)))
            .collect()
    })
}

/// Debts among a fixed pool of `users`, never self-debts
pub fn debts_strategy(users: Vec<UserId>, max_debts: usize) -> impl Strategy<Value = Vec<Debt>> {
    let n = users.len();
    prop::collection::vec((0..n, 1..n, 1i64..100_000i64), 0..=max_debts).prop_map(move |raw| {
        raw.into_iter()
            .map(|(debtor, offset, minor)| {
                let creditor = (debtor + offset) % n;
                Debt::new(users[debtor], users[creditor], Money::from_minor(minor, Currency::PLN))
            })
            .collect()
    })
}
