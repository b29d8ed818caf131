//! Custom Test Assertions
//!
//! Assertion helpers for ledger types with messages that name the
//! offending values.

use core_kernel::{ErrorKind, Money, UserId};
use domain_billing::{Allocation, Bill};
use domain_loans::PairwiseBalance;
use std::collections::BTreeSet;

/// Asserts same currency and exactly equal amounts
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Amount mismatch: actual={}, expected={}",
        actual,
        expected
    );
}

/// Asserts that a bill's allocations add up to its total to the minor unit
pub fn assert_allocations_balance(bill: &Bill, allocations: &[Allocation]) {
    let total = Money::sum(bill.total_amount.currency(), allocations.iter().map(|a| &a.amount))
        .expect("allocations share the bill currency");
    assert_money_eq(&total, &bill.total_amount);
}

/// Asserts that no two shares differ by more than one minor unit
pub fn assert_shares_even(allocations: &[Allocation]) {
    let Some(first) = allocations.first() else {
        return;
    };
    let minor = first.amount.currency().minor_unit();
    let max = allocations.iter().map(|a| a.amount.amount()).max().unwrap_or_default();
    let min = allocations.iter().map(|a| a.amount.amount()).min().unwrap_or_default();
    assert!(
        max - min <= minor,
        "Shares differ by more than {}: min={}, max={}",
        minor,
        min,
        max
    );
}

/// Asserts that every pair of users appears at most once, with a positive amount
pub fn assert_one_direction_per_pair(balances: &[PairwiseBalance]) {
    let mut seen = BTreeSet::new();
    for balance in balances {
        assert_ne!(balance.from, balance.to, "self debt in {:?}", balance);
        assert!(balance.amount.is_positive(), "non-positive balance {:?}", balance);
        let pair = if balance.from < balance.to {
            (balance.from, balance.to)
        } else {
            (balance.to, balance.from)
        };
        assert!(seen.insert(pair), "pair {} / {} appears twice", pair.0, pair.1);
    }
}

/// Asserts that `from` owes `to` exactly `amount`
pub fn assert_owes(balances: &[PairwiseBalance], from: UserId, to: UserId, amount: &Money) {
    let found = balances
        .iter()
        .find(|b| b.from == from && b.to == to)
        .unwrap_or_else(|| panic!("expected {} to owe {}, got {:?}", from, to, balances));
    assert_money_eq(&found.amount, amount);
}

/// Asserts that a result failed with the given error kind
pub fn assert_error_kind<T: std::fmt::Debug, E: std::fmt::Display>(
    result: &Result<T, E>,
    kind: ErrorKind,
    kind_of: impl Fn(&E) -> ErrorKind,
) {
    match result {
        Ok(value) => panic!("expected {:?} error, got Ok({:?})", kind, value),
        Err(e) => assert_eq!(kind_of(e), kind, "unexpected error: {}", e),
    }
}
