use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::state::DebtRecord;
use crate::types::PaymentApplication;

/// component of the debt a payment is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtComponent {
    Interest,
    Principal,
}

/// repayment waterfall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentWaterfall {
    order: Vec<DebtComponent>,
}

impl Default for RepaymentWaterfall {
    fn default() -> Self {
        Self::interest_first()
    }
}

impl RepaymentWaterfall {
    /// interest -> principal
    pub fn interest_first() -> Self {
        Self {
            order: vec![DebtComponent::Interest, DebtComponent::Principal],
        }
    }

    /// principal -> interest
    pub fn principal_first() -> Self {
        Self {
            order: vec![DebtComponent::Principal, DebtComponent::Interest],
        }
    }

    /// apply `amount` to `debt`; whatever exceeds the outstanding total is
    /// returned as excess and left untouched
    pub fn apply(&self, debt: &mut DebtRecord, amount: Money) -> PaymentApplication {
        let mut remaining = amount;
        let mut application = PaymentApplication::default();

        for component in &self.order {
            if remaining.is_zero() {
                break;
            }
            let (owed, applied) = match component {
                DebtComponent::Interest => (&mut debt.interest_owed, &mut application.to_interest),
                DebtComponent::Principal => (&mut debt.principal_owed, &mut application.to_principal),
            };
            let portion = remaining.min(*owed);
            *owed -= portion;
            *applied += portion;
            remaining -= portion;
        }

        debt.total_repaid += application.total_applied();
        application.excess = remaining;
        application
    }
}

/// outcome of a repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentResult {
    pub application: PaymentApplication,
    pub remaining_debt: Money,
    pub fully_repaid: bool,
    /// collateral released to the borrower when the debt was cleared
    pub collateral_returned: Money,
}
