//! Loan domain services

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{Currency, DirectoryPort, LoanId, Money, PortError, UserId};

use crate::error::LoanError;
use crate::loan::{Loan, LoanFilter, LoanPayment};
use crate::netting::{loan_debts, net_debts, user_balance, PairwiseBalance, UserBalance};
use crate::ports::LoanPort;

/// How many times a payment is re-validated after losing a race
pub const MAX_PAYMENT_ATTEMPTS: u32 = 5;

fn loan_lookup(id: LoanId) -> impl FnOnce(PortError) -> LoanError {
    move |e| match e {
        PortError::NotFound { .. } => LoanError::LoanNotFound(id),
        other => LoanError::Port(other),
    }
}

/// Loan ledger and balance queries
pub struct LoanService {
    port: Arc<dyn LoanPort>,
    directory: Arc<dyn DirectoryPort>,
    currency: Currency,
}

impl LoanService {
    pub fn new(port: Arc<dyn LoanPort>, directory: Arc<dyn DirectoryPort>, currency: Currency) -> Self {
        Self { port, directory, currency }
    }

    /// Records a new open loan between two known users
    #[instrument(skip(self, amount, note), fields(amount = %amount))]
    pub async fn create_loan(
        &self,
        lender_id: UserId,
        borrower_id: UserId,
        amount: Money,
        note: Option<String>,
    ) -> Result<Loan, LoanError> {
        self.ensure_currency(&amount)?;
        let loan = Loan::new(lender_id, borrower_id, amount, note)?;

        for user in [lender_id, borrower_id] {
            if !self.directory.user_exists(user).await? {
                return Err(LoanError::UserNotFound(user));
            }
        }

        self.port.insert_loan(&loan).await?;
        info!(loan_id = %loan.id, "loan created");
        Ok(loan)
    }

    pub async fn get_loan(&self, id: LoanId) -> Result<Loan, LoanError> {
        self.port.get_loan(id).await.map_err(loan_lookup(id))
    }

    pub async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, LoanError> {
        Ok(self.port.list_loans(filter).await?)
    }

    pub async fn list_payments(&self, loan_id: LoanId) -> Result<Vec<LoanPayment>, LoanError> {
        self.get_loan(loan_id).await?;
        Ok(self.port.list_payments(loan_id).await?)
    }

    /// Records a repayment and updates the loan's status
    ///
    /// The balance check runs against the loan as last read; if another
    /// payment lands in between, the loan is re-read and checked again.
    #[instrument(skip_all, fields(loan_id = %loan_id, amount = %amount))]
    pub async fn create_loan_payment(
        &self,
        loan_id: LoanId,
        amount: Money,
        paid_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<LoanPayment, LoanError> {
        for attempt in 1..=MAX_PAYMENT_ATTEMPTS {
            let loan = self.get_loan(loan_id).await?;
            let plan = loan.plan_payment(&amount)?;
            let payment = LoanPayment::new(loan_id, amount, paid_at, note.clone());

            match self
                .port
                .apply_payment(&payment, plan.expected_total_paid, plan.new_total_paid, plan.new_status)
                .await
            {
                Ok(updated) => {
                    info!(
                        payment_id = %payment.id,
                        total_paid = %updated.total_paid,
                        status = %updated.status,
                        "loan payment recorded"
                    );
                    return Ok(payment);
                }
                Err(PortError::Conflict { .. }) => {
                    debug!(attempt, "loan changed while paying, retrying");
                }
                Err(e) => return Err(loan_lookup(loan_id)(e)),
            }
        }

        warn!(attempts = MAX_PAYMENT_ATTEMPTS, "giving up on contended loan payment");
        Err(LoanError::Contention {
            loan_id,
            attempts: MAX_PAYMENT_ATTEMPTS,
        })
    }

    /// Net pairwise balances over every unsettled loan
    ///
    /// Computed from a snapshot; payments landing during the read may or may
    /// not be reflected.
    #[instrument(skip(self))]
    pub async fn get_balances(&self) -> Result<Vec<PairwiseBalance>, LoanError> {
        let loans = self.port.list_loans(&LoanFilter::unsettled()).await?;
        let balances = net_debts(loan_debts(&loans), self.currency)?;
        debug!(loans = loans.len(), balances = balances.len(), "balances netted");
        Ok(balances)
    }

    /// One user's totals across the netted balances
    pub async fn get_user_balance(&self, user_id: UserId) -> Result<UserBalance, LoanError> {
        let balances = self.get_balances().await?;
        user_balance(user_id, &balances, self.currency)
    }

    fn ensure_currency(&self, amount: &Money) -> Result<(), LoanError> {
        if amount.currency() != self.currency {
            return Err(LoanError::validation(format!(
                "amount is in {}, household currency is {}",
                amount.currency(),
                self.currency
            )));
        }
        Ok(())
    }
}
