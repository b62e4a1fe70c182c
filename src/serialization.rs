/// serializable read views of loans
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::state::{DebtRecord, Loan};
use crate::types::{Address, AssetId, DisbursementTarget, LoanId, LoanStatus};

/// serializable view of a loan and its debt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub status: LoanStatus,
    pub borrower: Address,
    pub recipient: Address,
    pub terms: TermsView,
    pub collateral: CollateralView,
    pub debt: DebtView,
    pub schedule: ScheduleView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsView {
    pub lending_asset: AssetId,
    pub borrowed_amount: Money,
    pub interest_rate: Rate,
    pub collateral_ratio: Rate,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralView {
    pub asset: AssetId,
    pub amount: Money,
    pub last_deposit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtView {
    pub principal_owed: Money,
    pub interest_owed: Money,
    pub total_owed: Money,
    pub total_repaid: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleView {
    pub terms_set_at: DateTime<Utc>,
    pub terms_expiry: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub disbursed_to: Option<DisbursementTarget>,
}

impl LoanView {
    pub fn new(loan: &Loan, debt: &DebtRecord) -> Self {
        LoanView {
            id: loan.id,
            status: loan.status,
            borrower: loan.borrower,
            recipient: loan.recipient,
            terms: TermsView {
                lending_asset: loan.lending_asset.clone(),
                borrowed_amount: loan.borrowed_amount,
                interest_rate: loan.interest_rate,
                collateral_ratio: loan.collateral_ratio,
                duration_secs: loan.duration.unwrap_or(loan.requested_duration),
            },
            collateral: CollateralView {
                asset: loan.collateral_asset.clone(),
                amount: loan.collateral,
                last_deposit: loan.last_collateral_in,
            },
            debt: DebtView {
                principal_owed: debt.principal_owed,
                interest_owed: debt.interest_owed,
                total_owed: debt.total_owed(),
                total_repaid: debt.total_repaid,
            },
            schedule: ScheduleView {
                terms_set_at: loan.terms_set_at,
                terms_expiry: loan.terms_expiry,
                started_at: loan.loan_start_time,
                due_at: loan.due_at(),
                disbursed_to: loan.disbursed_to,
            },
        }
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }
}
