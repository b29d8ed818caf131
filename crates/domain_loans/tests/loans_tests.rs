//! Tests for domain_loans over the in-memory ports

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;

use core_kernel::directory::mock::MockDirectory;
use core_kernel::{Currency, ErrorKind, LoanId, Money, UserId};

use domain_loans::ports::mock::MockLoanPort;
use domain_loans::{
    net_debts, Debt, LoanError, LoanFilter, LoanService, LoanStatus, PairKey, PairwiseBalance,
};

fn pln(amount: Decimal) -> Money {
    Money::new(amount, Currency::PLN)
}

struct Household {
    port: Arc<MockLoanPort>,
    service: Arc<LoanService>,
    users: Vec<UserId>,
}

async fn household(members: usize) -> Household {
    let users: Vec<UserId> = (0..members).map(|_| UserId::new()).collect();
    let port = Arc::new(MockLoanPort::new());
    let directory = Arc::new(MockDirectory::with_users(users.clone()).await);
    let service = Arc::new(LoanService::new(port.clone(), directory, Currency::PLN));
    Household { port, service, users }
}

// ============================================================================
// Loan ledger
// ============================================================================

mod ledger {
    use super::*;

    #[tokio::test]
    async fn test_two_payments_settle_the_loan() {
        let h = household(2).await;
        let loan = h
            .service
            .create_loan(h.users[0], h.users[1], pln(dec!(100)), None)
            .await
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Open);

        h.service
            .create_loan_payment(loan.id, pln(dec!(40)), Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(h.service.get_loan(loan.id).await.unwrap().status, LoanStatus::Partial);

        h.service
            .create_loan_payment(loan.id, pln(dec!(60)), Utc::now(), Some("rest".into()))
            .await
            .unwrap();
        let settled = h.service.get_loan(loan.id).await.unwrap();
        assert_eq!(settled.status, LoanStatus::Settled);
        assert_eq!(settled.total_paid, pln(dec!(100)));
        assert_eq!(h.service.list_payments(loan.id).await.unwrap().len(), 2);

        let err = h
            .service
            .create_loan_payment(loan.id, pln(dec!(61)), Utc::now(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExceedsBalance);
    }

    #[tokio::test]
    async fn test_overpayment_rejected_not_clamped() {
        let h = household(2).await;
        let loan = h
            .service
            .create_loan(h.users[0], h.users[1], pln(dec!(100)), None)
            .await
            .unwrap();
        h.service
            .create_loan_payment(loan.id, pln(dec!(40)), Utc::now(), None)
            .await
            .unwrap();

        let err = h
            .service
            .create_loan_payment(loan.id, pln(dec!(61)), Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::ExceedsBalance { .. }));
        assert_eq!(err.kind(), ErrorKind::ExceedsBalance);

        let loan = h.service.get_loan(loan.id).await.unwrap();
        assert_eq!(loan.total_paid, pln(dec!(40)));
        assert_eq!(loan.status, LoanStatus::Partial);
        assert_eq!(h.port.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_loan_validation() {
        let h = household(2).await;
        let same = h
            .service
            .create_loan(h.users[0], h.users[0], pln(dec!(10)), None)
            .await
            .unwrap_err();
        assert_eq!(same.kind(), ErrorKind::Validation);

        let negative = h
            .service
            .create_loan(h.users[0], h.users[1], pln(dec!(-10)), None)
            .await
            .unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::Validation);

        let stranger = UserId::new();
        let unknown = h
            .service
            .create_loan(h.users[0], stranger, pln(dec!(10)), None)
            .await
            .unwrap_err();
        assert!(matches!(unknown, LoanError::UserNotFound(id) if id == stranger));

        let euros = h
            .service
            .create_loan(h.users[0], h.users[1], Money::new(dec!(10), Currency::EUR), None)
            .await
            .unwrap_err();
        assert_eq!(euros.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_zero_payment_rejected() {
        let h = household(2).await;
        let loan = h
            .service
            .create_loan(h.users[0], h.users[1], pln(dec!(10)), None)
            .await
            .unwrap();
        let err = h
            .service
            .create_loan_payment(loan.id, pln(dec!(0)), Utc::now(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_loan_not_found() {
        let h = household(1).await;
        let err = h
            .service
            .create_loan_payment(LoanId::new(), pln(dec!(5)), Utc::now(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_payments_never_overshoot() {
        let h = household(2).await;
        let loan = h
            .service
            .create_loan(h.users[0], h.users[1], pln(dec!(100)), None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = h.service.clone();
            let loan_id = loan.id;
            handles.push(tokio::spawn(async move {
                service
                    .create_loan_payment(loan_id, pln(dec!(30)), Utc::now(), None)
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        let loan = h.service.get_loan(loan.id).await.unwrap();
        assert!(succeeded <= 3);
        assert_eq!(loan.total_paid, pln(dec!(30)) * Decimal::from(succeeded));
        assert!(loan.total_paid <= loan.amount);
        assert_eq!(h.port.payment_count().await, succeeded as usize);
    }

    #[tokio::test]
    async fn test_list_loans_filters() {
        let h = household(3).await;
        let settled = h
            .service
            .create_loan(h.users[0], h.users[1], pln(dec!(5)), None)
            .await
            .unwrap();
        h.service
            .create_loan_payment(settled.id, pln(dec!(5)), Utc::now(), None)
            .await
            .unwrap();
        h.service
            .create_loan(h.users[1], h.users[2], pln(dec!(7)), None)
            .await
            .unwrap();

        assert_eq!(h.service.list_loans(&LoanFilter::default()).await.unwrap().len(), 2);
        assert_eq!(h.service.list_loans(&LoanFilter::unsettled()).await.unwrap().len(), 1);
        assert_eq!(
            h.service.list_loans(&LoanFilter::involving(h.users[2])).await.unwrap().len(),
            1
        );
    }
}

// ============================================================================
// Balance netting
// ============================================================================

mod netting {
    use super::*;

    #[tokio::test]
    async fn test_opposite_loans_net_to_one_direction() {
        let h = household(2).await;
        let (a, b) = (h.users[0], h.users[1]);
        h.service.create_loan(a, b, pln(dec!(50)), None).await.unwrap();
        h.service.create_loan(b, a, pln(dec!(30)), None).await.unwrap();

        let balances = h.service.get_balances().await.unwrap();
        assert_eq!(balances, vec![PairwiseBalance { from: b, to: a, amount: pln(dec!(20)) }]);
    }

    #[tokio::test]
    async fn test_equal_opposite_loans_cancel() {
        let h = household(2).await;
        let (a, b) = (h.users[0], h.users[1]);
        h.service.create_loan(a, b, pln(dec!(50)), None).await.unwrap();
        h.service.create_loan(b, a, pln(dec!(50)), None).await.unwrap();

        assert!(h.service.get_balances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payments_reduce_balances() {
        let h = household(2).await;
        let (a, b) = (h.users[0], h.users[1]);
        let loan = h.service.create_loan(a, b, pln(dec!(100)), None).await.unwrap();
        h.service
            .create_loan_payment(loan.id, pln(dec!(35.50)), Utc::now(), None)
            .await
            .unwrap();

        let balances = h.service.get_balances().await.unwrap();
        assert_eq!(balances, vec![PairwiseBalance { from: b, to: a, amount: pln(dec!(64.50)) }]);
    }

    #[tokio::test]
    async fn test_user_balance_both_directions() {
        let h = household(3).await;
        let (a, b, c) = (h.users[0], h.users[1], h.users[2]);
        // b owes a 40, c owes b 15
        h.service.create_loan(a, b, pln(dec!(40)), None).await.unwrap();
        h.service.create_loan(b, c, pln(dec!(15)), None).await.unwrap();

        let lender = h.service.get_user_balance(a).await.unwrap();
        assert_eq!(lender.owes_to_others, pln(dec!(0)));
        assert_eq!(lender.owed_by_others, pln(dec!(40)));
        assert_eq!(lender.net, pln(dec!(40)));

        let middle = h.service.get_user_balance(b).await.unwrap();
        assert_eq!(middle.owes_to_others, pln(dec!(40)));
        assert_eq!(middle.owed_by_others, pln(dec!(15)));
        assert_eq!(middle.net, pln(dec!(-25)));

        let borrower = h.service.get_user_balance(c).await.unwrap();
        assert_eq!(borrower.owes_to_others, pln(dec!(15)));
        assert_eq!(borrower.owed_by_others, pln(dec!(0)));
    }

    #[tokio::test]
    async fn test_settled_loans_ignored() {
        let h = household(2).await;
        let loan = h
            .service
            .create_loan(h.users[0], h.users[1], pln(dec!(10)), None)
            .await
            .unwrap();
        h.service
            .create_loan_payment(loan.id, pln(dec!(10)), Utc::now(), None)
            .await
            .unwrap();
        assert!(h.service.get_balances().await.unwrap().is_empty());
    }

    fn debts(n_users: usize) -> impl Strategy<Value = (Vec<UserId>, Vec<(usize, usize, i64)>)> {
        let users: Vec<UserId> = (0..n_users).map(|_| UserId::new()).collect();
        let entries = prop::collection::vec((0..n_users, 0..n_users, 1i64..100_000), 0..40);
        entries.prop_map(move |e| (users.clone(), e))
    }

    proptest! {
        #[test]
        fn netting_keeps_one_direction_per_pair((users, entries) in debts(5)) {
            let debts: Vec<Debt> = entries
                .iter()
                .map(|(d, c, minor)| Debt::new(users[*d], users[*c], Money::from_minor(*minor, Currency::PLN)))
                .collect();
            let balances = net_debts(debts, Currency::PLN).unwrap();

            let mut pairs = HashSet::new();
            for balance in &balances {
                prop_assert!(balance.from != balance.to);
                prop_assert!(balance.amount.is_positive());
                prop_assert!(pairs.insert(PairKey::new(balance.from, balance.to)));
            }
        }

        #[test]
        fn netting_preserves_each_users_position((users, entries) in debts(4)) {
            let debts: Vec<Debt> = entries
                .iter()
                .map(|(d, c, minor)| Debt::new(users[*d], users[*c], Money::from_minor(*minor, Currency::PLN)))
                .collect();
            let balances = net_debts(debts.clone(), Currency::PLN).unwrap();

            for user in &users {
                let raw: Decimal = debts
                    .iter()
                    .filter(|d| d.debtor != d.creditor)
                    .map(|d| {
                        if d.creditor == *user {
                            d.amount.amount()
                        } else if d.debtor == *user {
                            -d.amount.amount()
                        } else {
                            Decimal::ZERO
                        }
                    })
                    .sum();
                let netted = domain_loans::user_balance(*user, &balances, Currency::PLN).unwrap();
                prop_assert_eq!(netted.net.amount(), raw);
            }
        }
    }
}
