//! Interfaces of the systems the market calls into.
//!
//! Every call is synchronous and fail-fast: an `Err` aborts the operation
//! that made it before any loan state is committed.

use serde::{Deserialize, Serialize};

use crate::consensus::LoanRequest;
use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::state::{DebtRecord, Loan};
use crate::types::{Address, AssetId, DisbursementTarget, LoanTerms, PaymentApplication};

/// per-asset lending limits and pool utilisation
pub trait AssetPolicy: Send + Sync {
    fn max_loan_amount(&self, asset: &AssetId) -> Result<Money>;

    fn max_debt_ratio(&self, asset: &AssetId) -> Result<Rate>;

    /// debt ratio of the pool if `hypothetical_amount` more were lent
    fn current_debt_ratio(&self, asset: &AssetId, hypothetical_amount: Money) -> Result<Rate>;
}

/// price-dependent collateral requirement
pub trait CollateralNeed: Send + Sync {
    /// collateral (in collateral-asset units) the loan must hold; fails if the
    /// price feed cannot be trusted right now
    fn needed_collateral(&self, loan: &Loan, debt: &DebtRecord) -> Result<Money>;
}

/// movement of tokens in and out of the market
pub trait FundsCustody: Send + Sync {
    /// pull collateral from a depositor
    fn receive_collateral(&self, asset: &AssetId, from: &Address, amount: Money) -> Result<()>;

    /// send borrowed funds to the borrower or the loan escrow
    fn fund_loan(&self, asset: &AssetId, destination: DisbursementTarget, amount: Money) -> Result<()>;

    /// pull a repayment from the payer; only `to_principal` reduces the
    /// pool's outstanding borrows
    fn collect_repayment(&self, asset: &AssetId, payer: &Address, application: &PaymentApplication) -> Result<()>;

    /// send tokens held by the market to a recipient
    fn transfer(&self, asset: &AssetId, recipient: &Address, amount: Money) -> Result<()>;
}

/// opaque credit-assessment proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditProof {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
}

/// verifies a credit proof and exposes its public score
pub trait CreditScoreVerifier: Send + Sync {
    /// `ProofRejected` when the proof does not verify
    fn verify(&self, borrower: &Address, proof: &CreditProof) -> Result<u32>;
}

/// maps a verified score to loan terms
pub trait ScoreTermsHandler: Send + Sync {
    fn terms_for(&self, score: u32, request: &LoanRequest) -> Result<LoanTerms>;
}

/// sizes loans backed by staked nfts instead of signer consensus
pub trait NftLoanSizer: Send + Sync {
    fn allowed_loan_size(&self, borrower: &Address, nft_ids: &[u64]) -> Result<Money>;
}
