use crate::decimal::Rate;
use crate::state::Loan;
use crate::types::{Address, DisbursementTarget};

/// where a loan's funds go on activation
///
/// Loans with a collateral ratio at or below `open_threshold` are paid out to
/// the recipient directly; more heavily collateralized loans go to the loan
/// escrow.
pub fn disbursement_target(loan: &Loan, open_threshold: Rate) -> DisbursementTarget {
    if loan.collateral_ratio <= open_threshold {
        DisbursementTarget::Direct(payout_address(loan))
    } else {
        DisbursementTarget::Escrow(loan.id)
    }
}

/// recipient, falling back to the borrower when unset
pub fn payout_address(loan: &Loan) -> Address {
    if loan.recipient.is_zero() {
        loan.borrower
    } else {
        loan.recipient
    }
}
