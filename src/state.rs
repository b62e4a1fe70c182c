use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{Address, AssetId, DisbursementTarget, LoanId, LoanStatus, LoanTerms};

/// persistent loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub id: LoanId,
    pub status: LoanStatus,
    pub borrower: Address,
    pub recipient: Address,

    // assets
    pub lending_asset: AssetId,
    pub collateral_asset: AssetId,

    // terms
    pub borrowed_amount: Money,
    pub interest_rate: Rate,
    pub collateral_ratio: Rate,
    /// seconds, as requested
    pub requested_duration: u64,
    pub terms_set_at: DateTime<Utc>,
    pub terms_expiry: DateTime<Utc>,

    // collateral
    pub collateral: Money,
    pub last_collateral_in: Option<DateTime<Utc>>,

    // set on activation
    pub loan_start_time: Option<DateTime<Utc>>,
    /// seconds
    pub duration: Option<u64>,
    pub disbursed_to: Option<DisbursementTarget>,
}

impl Loan {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_terms(
        id: LoanId,
        borrower: Address,
        recipient: Address,
        lending_asset: AssetId,
        collateral_asset: AssetId,
        borrowed_amount: Money,
        terms: &LoanTerms,
        requested_duration: u64,
        now: DateTime<Utc>,
        terms_expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: LoanStatus::TermsSet,
            borrower,
            recipient,
            lending_asset,
            collateral_asset,
            borrowed_amount,
            interest_rate: terms.interest_rate,
            collateral_ratio: terms.collateral_ratio,
            requested_duration,
            terms_set_at: now,
            terms_expiry,
            collateral: Money::ZERO,
            last_collateral_in: None,
            loan_start_time: None,
            duration: None,
            disbursed_to: None,
        }
    }

    /// end of the loan term, once active
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        let start = self.loan_start_time?;
        let duration = self.duration?;
        Some(crate::config::after(start, duration))
    }

    /// time used for the borrower's request rate limit; terms-set time
    /// stands in for the start of a loan that was never activated
    pub fn rate_limit_anchor(&self) -> DateTime<Utc> {
        self.loan_start_time.unwrap_or(self.terms_set_at)
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

/// principal and interest owed on a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DebtRecord {
    pub principal_owed: Money,
    pub interest_owed: Money,
    pub total_repaid: Money,
}

impl DebtRecord {
    pub fn new(principal_owed: Money, interest_owed: Money) -> Self {
        Self {
            principal_owed,
            interest_owed,
            total_repaid: Money::ZERO,
        }
    }

    pub fn total_owed(&self) -> Money {
        self.principal_owed + self.interest_owed
    }

    pub fn is_settled(&self) -> bool {
        self.total_owed().is_zero()
    }
}

/// loan snapshot for audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSnapshot {
    pub snapshot_id: Uuid,
    pub loan_id: LoanId,
    pub timestamp: DateTime<Utc>,
    pub loan: Loan,
    pub debt: DebtRecord,
    pub trigger: String,
}

impl LoanSnapshot {
    pub fn capture(loan: &Loan, debt: &DebtRecord, timestamp: DateTime<Utc>, trigger: String) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            loan_id: loan.id,
            timestamp,
            loan: loan.clone(),
            debt: debt.clone(),
            trigger,
        }
    }
}
