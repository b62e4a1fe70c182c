use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::after;
use crate::decimal::Money;
use crate::errors::{MarketError, Result};
use crate::state::Loan;
use crate::types::{Address, AssetId, LoanStatus};

/// per-loan collateral bookkeeping plus protocol-wide totals per asset
///
/// The ledger only does accounting. Moving tokens is the caller's job, and the
/// caller commits ledger and loan together once that succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollateralLedger {
    totals: BTreeMap<AssetId, Money>,
}

impl CollateralLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// total collateral of `asset` across all loans
    pub fn total(&self, asset: &AssetId) -> Money {
        self.totals.get(asset).copied().unwrap_or(Money::ZERO)
    }

    /// record a deposit; `attached_value` is the native-currency payment sent
    /// along with the call
    pub fn deposit(
        &mut self,
        loan: &mut Loan,
        amount: Money,
        attached_value: Money,
        native_asset: &AssetId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if loan.status.is_terminal() {
            return Err(MarketError::InvalidLoanState {
                loan_id: loan.id,
                current: loan.status,
                expected: "TermsSet or Active".to_string(),
            });
        }
        if !amount.is_positive() {
            return Err(MarketError::InvalidAmount { amount });
        }

        let expected_attached = if &loan.collateral_asset == native_asset {
            amount
        } else {
            Money::ZERO
        };
        if attached_value != expected_attached {
            return Err(MarketError::AmountMismatch {
                amount,
                attached: attached_value,
            });
        }

        loan.collateral += amount;
        loan.last_collateral_in = Some(now);
        *self.totals.entry(loan.collateral_asset.clone()).or_insert(Money::ZERO) += amount;
        Ok(())
    }

    /// record a withdrawal by the borrower
    ///
    /// `needed` is the price-dependent requirement and must be supplied for
    /// active loans; before activation no debt backs the collateral and the
    /// whole balance may be withdrawn.
    pub fn withdraw(
        &mut self,
        loan: &mut Loan,
        caller: &Address,
        amount: Money,
        needed: Option<Money>,
        safety_interval: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if caller != &loan.borrower {
            return Err(MarketError::NotBorrower {
                loan_id: loan.id,
                caller: *caller,
            });
        }
        if !amount.is_positive() {
            return Err(MarketError::InvalidAmount { amount });
        }

        let surplus = match loan.status {
            LoanStatus::Active => {
                if let Some(last_in) = loan.last_collateral_in {
                    if after(last_in, safety_interval) > now {
                        return Err(MarketError::CollateralDepositedRecently { loan_id: loan.id });
                    }
                }
                let needed = needed.ok_or_else(|| MarketError::PriceUnavailable {
                    message: format!("no collateral requirement for active loan {}", loan.id),
                })?;
                loan.collateral.saturating_sub(needed)
            }
            LoanStatus::TermsSet => loan.collateral,
            LoanStatus::Closed(_) => {
                return Err(MarketError::InvalidLoanState {
                    loan_id: loan.id,
                    current: loan.status,
                    expected: "TermsSet or Active".to_string(),
                });
            }
        };

        if amount > surplus {
            return Err(MarketError::WithdrawalExceedsSurplus {
                surplus,
                requested: amount,
            });
        }

        self.debit(loan, amount);
        Ok(())
    }

    /// take every unit of collateral off the loan, returning how much
    pub fn release_all(&mut self, loan: &mut Loan) -> Money {
        let amount = loan.collateral;
        self.debit(loan, amount);
        amount
    }

    fn debit(&mut self, loan: &mut Loan, amount: Money) {
        loan.collateral -= amount;
        if let Some(total) = self.totals.get_mut(&loan.collateral_asset) {
            *total = total.saturating_sub(amount);
        }
    }
}
