//! Loan Domain - Person-to-Person Loans and Balance Netting
//!
//! - **Loan ledger**: loans between household members, repayments, and a
//!   settlement status derived from what has been repaid
//! - **Netting**: collapses all outstanding debts into at most one directional
//!   balance per pair of users
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_loans::LoanService;
//!
//! let service = LoanService::new(port, directory, Currency::PLN);
//! let loan = service.create_loan(alice, bob, Money::new(dec!(100), Currency::PLN), None).await?;
//! service.create_loan_payment(loan.id, Money::new(dec!(40), Currency::PLN), Utc::now(), None).await?;
//! let balances = service.get_balances().await?;
//! ```

pub mod loan;
pub mod netting;
pub mod ports;
pub mod services;
pub mod error;

pub use loan::{Loan, LoanFilter, LoanPayment, LoanStatus, PaymentPlan};
pub use netting::{loan_debts, net_debts, user_balance, Debt, PairKey, PairwiseBalance, UserBalance};
pub use ports::LoanPort;
pub use services::{LoanService, MAX_PAYMENT_ATTEMPTS};
pub use error::LoanError;
