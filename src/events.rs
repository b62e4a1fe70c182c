use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{Address, AssetId, DisbursementTarget, LoanId, LoanStatus};

/// all events that can be emitted by the market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanTermsSet {
        loan_id: LoanId,
        borrower: Address,
        recipient: Address,
        lending_asset: AssetId,
        amount: Money,
        interest_rate: Rate,
        collateral_ratio: Rate,
        terms_expiry: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    LoanActivated {
        loan_id: LoanId,
        borrower: Address,
        disbursed_to: DisbursementTarget,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    LoanRepaid {
        loan_id: LoanId,
        borrower: Address,
        collateral_returned: Money,
        timestamp: DateTime<Utc>,
    },
    LoanLiquidated {
        loan_id: LoanId,
        borrower: Address,
        liquidator: Address,
        collateral_seized: Money,
        outstanding_debt: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    LoanRepayment {
        loan_id: LoanId,
        payer: Address,
        amount: Money,
        applied_to_interest: Money,
        applied_to_principal: Money,
        excess: Money,
        remaining_debt: Money,
        timestamp: DateTime<Utc>,
    },

    // collateral events
    CollateralDeposited {
        loan_id: LoanId,
        depositor: Address,
        asset: AssetId,
        amount: Money,
        new_total: Money,
        timestamp: DateTime<Utc>,
    },
    CollateralWithdrawn {
        loan_id: LoanId,
        recipient: Address,
        asset: AssetId,
        amount: Money,
        new_total: Money,
        timestamp: DateTime<Utc>,
    },

    // status change events
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// loan the event belongs to
    pub fn loan_id(&self) -> LoanId {
        match self {
            Event::LoanTermsSet { loan_id, .. }
            | Event::LoanActivated { loan_id, .. }
            | Event::LoanRepaid { loan_id, .. }
            | Event::LoanLiquidated { loan_id, .. }
            | Event::LoanRepayment { loan_id, .. }
            | Event::CollateralDeposited { loan_id, .. }
            | Event::CollateralWithdrawn { loan_id, .. }
            | Event::StatusChanged { loan_id, .. } => *loan_id,
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
