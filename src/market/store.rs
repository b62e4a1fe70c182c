use std::collections::{BTreeMap, HashMap};

use crate::collateral::CollateralLedger;
use crate::consensus::BorrowerHistory;
use crate::errors::{MarketError, Result};
use crate::state::{DebtRecord, Loan};
use crate::types::{Address, LoanId};

/// committed market state
///
/// Loans are never removed; terminal loans stay readable.
#[derive(Debug, Clone)]
pub struct MarketStore {
    loans: BTreeMap<LoanId, Loan>,
    debts: BTreeMap<LoanId, DebtRecord>,
    borrower_loans: HashMap<Address, Vec<LoanId>>,
    next_loan_id: LoanId,
    pub(crate) ledger: CollateralLedger,
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStore {
    pub fn new() -> Self {
        Self {
            loans: BTreeMap::new(),
            debts: BTreeMap::new(),
            borrower_loans: HashMap::new(),
            next_loan_id: 1,
            ledger: CollateralLedger::new(),
        }
    }

    /// id the next created loan will get
    pub fn next_loan_id(&self) -> LoanId {
        self.next_loan_id
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<&Loan> {
        self.loans
            .get(&loan_id)
            .ok_or(MarketError::LoanNotFound { loan_id })
    }

    pub fn debt(&self, loan_id: LoanId) -> Result<&DebtRecord> {
        self.debts
            .get(&loan_id)
            .ok_or(MarketError::LoanNotFound { loan_id })
    }

    pub fn borrower_loans(&self, borrower: &Address) -> &[LoanId] {
        self.borrower_loans
            .get(borrower)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    pub fn ledger(&self) -> &CollateralLedger {
        &self.ledger
    }

    /// loan count and last start used for nonce and rate-limit checks
    pub fn history(&self, borrower: &Address) -> BorrowerHistory {
        let ids = self.borrower_loans(borrower);
        BorrowerHistory {
            loan_count: ids.len() as u64,
            last_loan_start: ids
                .last()
                .and_then(|id| self.loans.get(id))
                .map(Loan::rate_limit_anchor),
        }
    }

    /// commit a freshly created loan under the next id
    pub(crate) fn insert_new(&mut self, loan: Loan, debt: DebtRecord) -> Result<LoanId> {
        if loan.id != self.next_loan_id {
            return Err(MarketError::InvalidConfiguration {
                message: format!("loan id {} out of sequence, expected {}", loan.id, self.next_loan_id),
            });
        }
        let loan_id = loan.id;
        self.borrower_loans.entry(loan.borrower).or_default().push(loan_id);
        self.debts.insert(loan_id, debt);
        self.loans.insert(loan_id, loan);
        self.next_loan_id += 1;
        Ok(loan_id)
    }

    /// overwrite an existing loan (and optionally its debt) with staged copies
    pub(crate) fn commit(&mut self, loan: Loan, debt: Option<DebtRecord>, ledger: Option<CollateralLedger>) {
        if let Some(debt) = debt {
            self.debts.insert(loan.id, debt);
        }
        if let Some(ledger) = ledger {
            self.ledger = ledger;
        }
        self.loans.insert(loan.id, loan);
    }
}
