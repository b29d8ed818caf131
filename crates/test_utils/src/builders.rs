//! Test Data Builders
//!
//! Builders with household defaults so tests only spell out the fields
//! they care about, plus an in-memory household wired to every service.

use chrono::NaiveDate;
use core_kernel::directory::mock::MockDirectory;
use core_kernel::{BillingPeriod, Currency, GroupId, Money, Timezone, UserId};
use domain_billing::forecast::mock::FlatForecast;
use domain_billing::ports::mock::MockBillingPort;
use domain_billing::{
    Bill, BillKind, BillingService, ForecastService, RecurringBillService,
};
use domain_loans::ports::mock::MockLoanPort;
use domain_loans::{Loan, LoanService};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::fixtures::{IdFixtures, MoneyFixtures, TemporalFixtures};

/// Builder for draft bills
pub struct TestBillBuilder {
    kind: BillKind,
    period: BillingPeriod,
    total: Money,
    units: Option<Decimal>,
    custom_type: Option<String>,
    deadline: Option<NaiveDate>,
}

impl Default for TestBillBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBillBuilder {
    /// An unmetered 100 PLN internet bill for March 2024
    pub fn new() -> Self {
        Self {
            kind: BillKind::Internet,
            period: TemporalFixtures::march_2024(),
            total: MoneyFixtures::pln_100(),
            units: None,
            custom_type: None,
            deadline: None,
        }
    }

    /// A metered electricity bill with the given units
    pub fn electricity(units: Decimal) -> Self {
        Self::new().with_kind(BillKind::Electricity).with_units(units)
    }

    pub fn with_kind(mut self, kind: BillKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_period(mut self, period: BillingPeriod) -> Self {
        self.period = period;
        self
    }

    pub fn with_total(mut self, total: Money) -> Self {
        self.total = total;
        self
    }

    pub fn with_units(mut self, units: Decimal) -> Self {
        self.units = Some(units);
        self
    }

    pub fn with_custom_type(mut self, custom_type: impl Into<String>) -> Self {
        self.custom_type = Some(custom_type.into());
        self
    }

    pub fn with_deadline(mut self, deadline: NaiveDate) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Panics if the configured values do not form a valid bill
    pub fn build(self) -> Bill {
        let mut bill = Bill::new(self.kind, self.period, self.total, self.units)
            .expect("builder produced an invalid bill");
        if let Some(custom_type) = self.custom_type {
            bill = bill.with_custom_type(custom_type);
        }
        if let Some(deadline) = self.deadline {
            bill = bill.with_payment_deadline(deadline);
        }
        bill
    }
}

/// Builder for loans between two household members
pub struct TestLoanBuilder {
    lender: UserId,
    borrower: UserId,
    amount: Money,
    note: Option<String>,
}

impl Default for TestLoanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLoanBuilder {
    /// Alice lends Bob 100 PLN
    pub fn new() -> Self {
        Self {
            lender: IdFixtures::alice(),
            borrower: IdFixtures::bob(),
            amount: MoneyFixtures::pln_100(),
            note: None,
        }
    }

    pub fn between(mut self, lender: UserId, borrower: UserId) -> Self {
        self.lender = lender;
        self.borrower = borrower;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn build(self) -> Loan {
        Loan::new(self.lender, self.borrower, self.amount, self.note)
            .expect("builder produced an invalid loan")
    }
}

/// Every service of the household wired to in-memory ports
pub struct TestHousehold {
    pub users: Vec<UserId>,
    pub directory: Arc<MockDirectory>,
    pub billing_port: Arc<MockBillingPort>,
    pub loan_port: Arc<MockLoanPort>,
    pub billing: BillingService,
    pub recurring: RecurringBillService,
    pub forecasts: ForecastService,
    pub loans: LoanService,
}

impl TestHousehold {
    /// Alice, Bob, and Carol in a PLN household on Warsaw time
    pub async fn new() -> Self {
        Self::with_users(IdFixtures::household()).await
    }

    pub async fn with_users(users: Vec<UserId>) -> Self {
        let currency = Currency::PLN;
        let timezone: Timezone = TemporalFixtures::warsaw();
        let directory = Arc::new(MockDirectory::with_users(users.clone()).await);
        let billing_port = Arc::new(MockBillingPort::new());
        let loan_port = Arc::new(MockLoanPort::new());

        Self {
            billing: BillingService::new(billing_port.clone(), directory.clone(), currency),
            recurring: RecurringBillService::new(billing_port.clone(), timezone, currency),
            forecasts: ForecastService::new(billing_port.clone(), Arc::new(FlatForecast), currency),
            loans: LoanService::new(loan_port.clone(), directory.clone(), currency),
            users,
            directory,
            billing_port,
            loan_port,
        }
    }

    /// Registers a group with the given weight
    pub async fn add_group(&self, weight: Decimal) -> GroupId {
        let group = GroupId::new();
        self.directory.add_group(group, weight).await;
        group
    }

    pub fn user(&self, index: usize) -> UserId {
        self.users[index]
    }
}
