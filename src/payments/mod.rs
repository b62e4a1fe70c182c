pub mod waterfall;

use crate::decimal::Money;
use crate::errors::{MarketError, Result};
use crate::state::DebtRecord;

pub use waterfall::{DebtComponent, RepaymentResult, RepaymentWaterfall};

/// reject empty payments and payments against a cleared debt
pub fn validate_repayment(amount: Money, debt: &DebtRecord) -> Result<()> {
    if !amount.is_positive() {
        return Err(MarketError::InvalidAmount { amount });
    }
    if debt.is_settled() {
        return Err(MarketError::InvalidAmount { amount });
    }
    Ok(())
}
