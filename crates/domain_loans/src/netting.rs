//! Balance netting
//!
//! Collapses directional debts into at most one balance per pair of users.
//! Debts between the same two people cancel against each other; whatever is
//! left over survives in a single direction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{Currency, Money, UserId};

use crate::error::LoanError;
use crate::loan::Loan;

/// `debtor` owes `creditor` `amount`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debt {
    pub debtor: UserId,
    pub creditor: UserId,
    pub amount: Money,
}

impl Debt {
    pub fn new(debtor: UserId, creditor: UserId, amount: Money) -> Self {
        Self { debtor, creditor, amount }
    }
}

/// Unordered pair of users, stored low id first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    low: UserId,
    high: UserId,
}

impl PairKey {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }
}

/// `from` owes `to` `amount`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseBalance {
    pub from: UserId,
    pub to: UserId,
    pub amount: Money,
}

/// One user's position across all pairwise balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: UserId,
    /// What this user must pay others
    pub owes_to_others: Money,
    /// What others must pay this user
    pub owed_by_others: Money,
    /// `owed_by_others - owes_to_others`; positive means the user is owed
    pub net: Money,
}

/// Remaining balances of unsettled loans as debts, borrower to lender
pub fn loan_debts<'a>(loans: impl IntoIterator<Item = &'a Loan>) -> Vec<Debt> {
    loans
        .into_iter()
        .filter(|loan| !loan.is_settled())
        .filter_map(|loan| {
            let remaining = loan.remaining();
            remaining
                .is_positive()
                .then(|| Debt::new(loan.borrower_id, loan.lender_id, remaining))
        })
        .collect()
}

/// Nets debts into pairwise balances
///
/// Output is sorted by pair and rounded to the currency's minor unit; pairs
/// that cancel out are omitted. Debts from a user to themselves are ignored.
pub fn net_debts(
    debts: impl IntoIterator<Item = Debt>,
    currency: Currency,
) -> Result<Vec<PairwiseBalance>, LoanError> {
    // value: (debtor, creditor, amount) currently standing for the pair
    let mut pairs: BTreeMap<PairKey, (UserId, UserId, Money)> = BTreeMap::new();

    for debt in debts {
        if debt.amount.currency() != currency {
            return Err(LoanError::validation(format!(
                "debt in {} cannot be netted in {}",
                debt.amount.currency(),
                currency
            )));
        }
        if debt.debtor == debt.creditor || !debt.amount.is_positive() {
            continue;
        }

        let key = PairKey::new(debt.debtor, debt.creditor);
        match pairs.get(&key).copied() {
            None => {
                pairs.insert(key, (debt.debtor, debt.creditor, debt.amount));
            }
            Some((debtor, creditor, existing)) if debtor == debt.debtor => {
                pairs.insert(key, (debtor, creditor, existing.checked_add(&debt.amount)?));
            }
            Some((debtor, creditor, existing)) => {
                if debt.amount > existing {
                    let rest = debt.amount.checked_sub(&existing)?;
                    pairs.insert(key, (debt.debtor, debt.creditor, rest));
                } else if debt.amount < existing {
                    let rest = existing.checked_sub(&debt.amount)?;
                    pairs.insert(key, (debtor, creditor, rest));
                } else {
                    pairs.remove(&key);
                }
            }
        }
    }

    Ok(pairs
        .into_values()
        .filter_map(|(from, to, amount)| {
            let amount = amount.round_to_currency();
            (!amount.is_zero()).then_some(PairwiseBalance { from, to, amount })
        })
        .collect())
}

/// Sums a user's side of every balance
pub fn user_balance(
    user_id: UserId,
    balances: &[PairwiseBalance],
    currency: Currency,
) -> Result<UserBalance, LoanError> {
    let owes_to_others = Money::sum(
        currency,
        balances.iter().filter(|b| b.from == user_id).map(|b| &b.amount),
    )?;
    let owed_by_others = Money::sum(
        currency,
        balances.iter().filter(|b| b.to == user_id).map(|b| &b.amount),
    )?;
    Ok(UserBalance {
        user_id,
        owes_to_others,
        owed_by_others,
        net: owed_by_others.checked_sub(&owes_to_others)?,
    })
}
