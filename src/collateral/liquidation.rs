use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{MarketError, Result};
use crate::state::Loan;
use crate::types::{Address, LoanId, LoanStatus};

/// why a loan may be liquidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationTrigger {
    /// collateral fell below the price-dependent requirement
    Undercollateralized { collateral: Money, needed: Money },
    /// the loan outlived its duration
    Expired { due_at: DateTime<Utc> },
}

/// liquidation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub loan_id: LoanId,
    pub liquidator: Address,
    pub trigger: LiquidationTrigger,
    pub collateral_seized: Money,
    /// debt left on the books; liquidation closes the loan regardless
    pub outstanding_debt: Money,
    pub timestamp: DateTime<Utc>,
}

/// decide whether an active loan is liquidable
///
/// Expiry is checked first so an overdue loan can be closed even while the
/// price feed is down. `needed` is only called when the loan is still in term.
pub fn assess<F>(loan: &Loan, now: DateTime<Utc>, needed: F) -> Result<LiquidationTrigger>
where
    F: FnOnce() -> Result<Money>,
{
    if loan.status != LoanStatus::Active {
        return Err(MarketError::InvalidLoanState {
            loan_id: loan.id,
            current: loan.status,
            expected: "Active".to_string(),
        });
    }

    if let Some(due_at) = loan.due_at() {
        if now >= due_at {
            return Ok(LiquidationTrigger::Expired { due_at });
        }
    }

    let needed = needed()?;
    if loan.collateral < needed {
        return Ok(LiquidationTrigger::Undercollateralized {
            collateral: loan.collateral,
            needed,
        });
    }

    Err(MarketError::NotLiquidable { loan_id: loan.id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::types::{AssetId, LoanTerms};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn active_loan(collateral: Money) -> Loan {
        let terms = LoanTerms {
            interest_rate: Rate::from_bps(500),
            collateral_ratio: Rate::from_bps(15_000),
            max_loan_amount: Money::from_major(1_000),
        };
        let mut loan = Loan::with_terms(
            1,
            Address::new([1; 32]),
            Address::ZERO,
            AssetId::new("DAI"),
            AssetId::new("ETH"),
            terms.max_loan_amount,
            &terms,
            86_400,
            start(),
            start() + Duration::hours(1),
        );
        loan.status = LoanStatus::Active;
        loan.collateral = collateral;
        loan.loan_start_time = Some(start());
        loan.duration = Some(86_400);
        loan
    }

    #[test]
    fn test_healthy_loan_not_liquidable() {
        let loan = active_loan(Money::from_major(10));
        let err = assess(&loan, start() + Duration::hours(1), || Ok(Money::from_major(8))).unwrap_err();
        assert_eq!(err, MarketError::NotLiquidable { loan_id: 1 });
    }

    #[test]
    fn test_undercollateralized() {
        let loan = active_loan(Money::from_major(7));
        let trigger = assess(&loan, start() + Duration::hours(1), || Ok(Money::from_major(8))).unwrap();
        assert_eq!(
            trigger,
            LiquidationTrigger::Undercollateralized {
                collateral: Money::from_major(7),
                needed: Money::from_major(8),
            }
        );
    }

    #[test]
    fn test_expired_skips_price() {
        let loan = active_loan(Money::from_major(10));
        let trigger = assess(&loan, start() + Duration::days(1), || {
            Err(MarketError::PriceUnavailable {
                message: "feed down".to_string(),
            })
        })
        .unwrap();
        assert!(matches!(trigger, LiquidationTrigger::Expired { .. }));
    }

    #[test]
    fn test_price_failure_propagates() {
        let loan = active_loan(Money::from_major(10));
        let err = assess(&loan, start(), || {
            Err(MarketError::PriceUnavailable {
                message: "feed down".to_string(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, MarketError::PriceUnavailable { .. }));
    }

    #[test]
    fn test_only_active_loans() {
        let mut loan = active_loan(Money::ZERO);
        loan.status = LoanStatus::TermsSet;
        assert!(matches!(
            assess(&loan, start(), || Ok(Money::ONE)),
            Err(MarketError::InvalidLoanState { .. })
        ));
    }
}
