//! In-memory collaborators for tests and demos.
//!
//! Each mock keeps its state behind a `RwLock` so it can be shared as an
//! `Arc<dyn Trait>` with the market while the test keeps a handle to steer it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::collaborators::{
    AssetPolicy, CollateralNeed, CreditProof, CreditScoreVerifier, FundsCustody, NftLoanSizer,
};
use crate::collateral::need::required_collateral;
use crate::config::AssetRegistry;
use crate::decimal::{Money, Rate};
use crate::errors::{MarketError, Result};
use crate::state::{DebtRecord, Loan};
use crate::types::{Address, AssetId, DisbursementTarget, LoanId, PaymentApplication};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// token movement recorded by [`MemoryLendingPool`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transfer {
    CollateralIn {
        asset: AssetId,
        from: Address,
        amount: Money,
    },
    LoanFunded {
        asset: AssetId,
        destination: DisbursementTarget,
        amount: Money,
    },
    RepaymentIn {
        asset: AssetId,
        payer: Address,
        amount: Money,
    },
    Payout {
        asset: AssetId,
        recipient: Address,
        amount: Money,
    },
}

#[derive(Debug, Default)]
struct PoolBook {
    supplied: HashMap<AssetId, Money>,
    borrowed: HashMap<AssetId, Money>,
    transfers: Vec<Transfer>,
    failing: bool,
}

/// lending pool holding supplied liquidity and outstanding borrows per asset
pub struct MemoryLendingPool {
    registry: AssetRegistry,
    book: RwLock<PoolBook>,
}

impl MemoryLendingPool {
    pub fn new(registry: AssetRegistry) -> Self {
        Self {
            registry,
            book: RwLock::new(PoolBook::default()),
        }
    }

    /// add lender liquidity
    pub fn supply(&self, asset: &AssetId, amount: Money) {
        *write(&self.book).supplied.entry(asset.clone()).or_insert(Money::ZERO) += amount;
    }

    pub fn supplied(&self, asset: &AssetId) -> Money {
        read(&self.book).supplied.get(asset).copied().unwrap_or(Money::ZERO)
    }

    pub fn borrowed(&self, asset: &AssetId) -> Money {
        read(&self.book).borrowed.get(asset).copied().unwrap_or(Money::ZERO)
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        read(&self.book).transfers.clone()
    }

    /// make every subsequent transfer fail
    pub fn set_failing(&self, failing: bool) {
        write(&self.book).failing = failing;
    }

    fn check_available(book: &PoolBook) -> Result<()> {
        if book.failing {
            return Err(MarketError::TransferFailed {
                message: "pool transfers disabled".to_string(),
            });
        }
        Ok(())
    }
}

impl AssetPolicy for MemoryLendingPool {
    fn max_loan_amount(&self, asset: &AssetId) -> Result<Money> {
        Ok(self.registry.get(asset)?.max_loan_amount)
    }

    fn max_debt_ratio(&self, asset: &AssetId) -> Result<Rate> {
        Ok(self.registry.get(asset)?.max_debt_ratio)
    }

    fn current_debt_ratio(&self, asset: &AssetId, hypothetical_amount: Money) -> Result<Rate> {
        self.registry.get(asset)?;
        let supplied = self.supplied(asset);
        if supplied.is_zero() {
            return Ok(Rate::ZERO);
        }
        let borrowed = self.borrowed(asset) + hypothetical_amount;
        Ok(Rate::from_decimal(borrowed.as_decimal() / supplied.as_decimal()))
    }
}

impl FundsCustody for MemoryLendingPool {
    fn receive_collateral(&self, asset: &AssetId, from: &Address, amount: Money) -> Result<()> {
        let mut book = write(&self.book);
        Self::check_available(&book)?;
        book.transfers.push(Transfer::CollateralIn {
            asset: asset.clone(),
            from: *from,
            amount,
        });
        Ok(())
    }

    fn fund_loan(&self, asset: &AssetId, destination: DisbursementTarget, amount: Money) -> Result<()> {
        let mut book = write(&self.book);
        Self::check_available(&book)?;
        let supplied = book.supplied.get(asset).copied().unwrap_or(Money::ZERO);
        let borrowed = book.borrowed.get(asset).copied().unwrap_or(Money::ZERO);
        if borrowed + amount > supplied {
            return Err(MarketError::TransferFailed {
                message: format!("{} pool has {} available, {} requested", asset, supplied - borrowed, amount),
            });
        }
        book.borrowed.insert(asset.clone(), borrowed + amount);
        book.transfers.push(Transfer::LoanFunded {
            asset: asset.clone(),
            destination,
            amount,
        });
        Ok(())
    }

    fn collect_repayment(&self, asset: &AssetId, payer: &Address, application: &PaymentApplication) -> Result<()> {
        let mut book = write(&self.book);
        Self::check_available(&book)?;
        // interest is lender income, not a return of lent liquidity
        if let Some(borrowed) = book.borrowed.get_mut(asset) {
            *borrowed = borrowed.saturating_sub(application.to_principal);
        }
        book.transfers.push(Transfer::RepaymentIn {
            asset: asset.clone(),
            payer: *payer,
            amount: application.total_applied(),
        });
        Ok(())
    }

    fn transfer(&self, asset: &AssetId, recipient: &Address, amount: Money) -> Result<()> {
        let mut book = write(&self.book);
        Self::check_available(&book)?;
        book.transfers.push(Transfer::Payout {
            asset: asset.clone(),
            recipient: *recipient,
            amount,
        });
        Ok(())
    }
}

#[derive(Debug)]
struct NeedState {
    price: Money,
    overrides: HashMap<LoanId, Money>,
    stale: bool,
}

/// collateral requirement from a single fixed collateral price
///
/// Individual loans can be pinned to an explicit requirement with
/// [`FixedPriceCollateralNeed::set_need`].
pub struct FixedPriceCollateralNeed {
    state: RwLock<NeedState>,
}

impl FixedPriceCollateralNeed {
    /// `price` is lending-asset units per collateral unit
    pub fn new(price: Money) -> Self {
        Self {
            state: RwLock::new(NeedState {
                price,
                overrides: HashMap::new(),
                stale: false,
            }),
        }
    }

    pub fn set_price(&self, price: Money) {
        write(&self.state).price = price;
    }

    pub fn set_need(&self, loan_id: LoanId, needed: Money) {
        write(&self.state).overrides.insert(loan_id, needed);
    }

    pub fn clear_need(&self, loan_id: LoanId) {
        write(&self.state).overrides.remove(&loan_id);
    }

    /// a stale feed rejects every lookup
    pub fn set_stale(&self, stale: bool) {
        write(&self.state).stale = stale;
    }
}

impl CollateralNeed for FixedPriceCollateralNeed {
    fn needed_collateral(&self, loan: &Loan, debt: &DebtRecord) -> Result<Money> {
        let state = read(&self.state);
        if state.stale {
            return Err(MarketError::PriceUnavailable {
                message: format!("stale {}/{} price", loan.collateral_asset, loan.lending_asset),
            });
        }
        if let Some(needed) = state.overrides.get(&loan.id) {
            return Ok(*needed);
        }
        required_collateral(debt.total_owed(), loan.collateral_ratio, state.price)
    }
}

/// credit verifier accepting any non-empty proof from a borrower with a
/// registered score
#[derive(Default)]
pub struct MockCreditVerifier {
    scores: RwLock<HashMap<Address, u32>>,
}

impl MockCreditVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_score(&self, borrower: Address, score: u32) {
        write(&self.scores).insert(borrower, score);
    }
}

impl CreditScoreVerifier for MockCreditVerifier {
    fn verify(&self, borrower: &Address, proof: &CreditProof) -> Result<u32> {
        if proof.proof.is_empty() {
            return Err(MarketError::ProofRejected {
                message: "empty proof".to_string(),
            });
        }
        read(&self.scores)
            .get(borrower)
            .copied()
            .ok_or_else(|| MarketError::ProofRejected {
                message: format!("no assessment for {}", borrower),
            })
    }
}

/// values every nft the borrower owns at a flat amount
pub struct MockNftSizer {
    value_per_nft: Money,
    owners: RwLock<HashMap<u64, Address>>,
}

impl MockNftSizer {
    pub fn new(value_per_nft: Money) -> Self {
        Self {
            value_per_nft,
            owners: RwLock::new(HashMap::new()),
        }
    }

    pub fn stake(&self, nft_id: u64, owner: Address) {
        write(&self.owners).insert(nft_id, owner);
    }
}

impl NftLoanSizer for MockNftSizer {
    fn allowed_loan_size(&self, borrower: &Address, nft_ids: &[u64]) -> Result<Money> {
        let owners = read(&self.owners);
        let owned = nft_ids
            .iter()
            .filter(|id| owners.get(*id) == Some(borrower))
            .count();
        Ok(self.value_per_nft * Decimal::from(owned as u64))
    }
}
