use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::disbursement::payout_address;
use super::LendingMarket;
use crate::collaborators::{CreditProof, ScoreTermsHandler};
use crate::consensus::LoanRequest;
use crate::decimal::{Money, Rate};
use crate::errors::{MarketError, Result};
use crate::events::Event;
use crate::types::{DisbursementTarget, LoanId, LoanStatus, LoanTerms};

/// terms offered to borrowers scoring at least `min_score`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTier {
    pub min_score: u32,
    pub terms: LoanTerms,
}

/// maps credit scores onto fixed tiers; the best tier the score reaches wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredTermsHandler {
    tiers: Vec<ScoreTier>,
}

impl TieredTermsHandler {
    pub fn new(mut tiers: Vec<ScoreTier>) -> Self {
        tiers.sort_by(|a, b| b.min_score.cmp(&a.min_score));
        Self { tiers }
    }

    pub fn tiers(&self) -> &[ScoreTier] {
        &self.tiers
    }
}

impl Default for TieredTermsHandler {
    fn default() -> Self {
        Self::new(vec![
            ScoreTier {
                min_score: 750,
                terms: LoanTerms {
                    interest_rate: Rate::from_bps(500),
                    collateral_ratio: Rate::from_bps(5_000),
                    max_loan_amount: Money::from_major(50_000),
                },
            },
            ScoreTier {
                min_score: 650,
                terms: LoanTerms {
                    interest_rate: Rate::from_bps(900),
                    collateral_ratio: Rate::from_bps(10_000),
                    max_loan_amount: Money::from_major(20_000),
                },
            },
            ScoreTier {
                min_score: 550,
                terms: LoanTerms {
                    interest_rate: Rate::from_bps(1_500),
                    collateral_ratio: Rate::from_bps(15_000),
                    max_loan_amount: Money::from_major(5_000),
                },
            },
        ])
    }
}

impl ScoreTermsHandler for TieredTermsHandler {
    /// the borrower gets what they asked for, capped by the tier
    fn terms_for(&self, score: u32, request: &LoanRequest) -> Result<LoanTerms> {
        let tier = self
            .tiers
            .iter()
            .find(|tier| score >= tier.min_score)
            .ok_or_else(|| MarketError::ProofRejected {
                message: format!("score {} below every tier", score),
            })?;
        Ok(LoanTerms {
            max_loan_amount: tier.terms.max_loan_amount.min(request.amount),
            ..tier.terms
        })
    }
}

impl LendingMarket {
    /// open a loan whose terms come from a verified credit score instead of
    /// signer consensus
    pub fn request_loan_terms_with_proof(
        &mut self,
        request: &LoanRequest,
        proof: &CreditProof,
        time_provider: &SafeTimeProvider,
    ) -> Result<LoanId> {
        let now = time_provider.now();
        let verifier = self
            .credit_verifier
            .clone()
            .ok_or_else(|| MarketError::InvalidConfiguration {
                message: "no credit verifier configured".to_string(),
            })?;

        let history = self.store.history(&request.borrower);
        self.engine
            .validate_request(request, &history, &self.settings, now)?;

        let score = verifier.verify(&request.borrower, proof).map_err(|e| {
            warn!(borrower = %request.borrower, error = %e, "credit proof rejected");
            e
        })?;
        let terms = self.terms_handler.terms_for(score, request)?;

        let (loan, debt) = self.stage_new_loan(request, &terms, terms.max_loan_amount, now)?;
        let loan_id = self.commit_new_loan(loan, debt, now)?;
        info!(loan_id, score, "loan terms set from credit proof");
        Ok(loan_id)
    }

    /// borrow against staked nfts: no collateral, fixed rate, funds sent
    /// straight to the recipient
    pub fn take_out_loan_with_nfts(
        &mut self,
        request: &LoanRequest,
        nft_ids: &[u64],
        time_provider: &SafeTimeProvider,
    ) -> Result<LoanId> {
        let now = time_provider.now();
        let sizer = self
            .nft_sizer
            .clone()
            .ok_or_else(|| MarketError::InvalidConfiguration {
                message: "no nft sizer configured".to_string(),
            })?;

        let history = self.store.history(&request.borrower);
        self.engine
            .validate_request(request, &history, &self.settings, now)?;

        let allowed = sizer.allowed_loan_size(&request.borrower, nft_ids)?;
        if request.amount > allowed {
            return Err(MarketError::NftAllowanceExceeded {
                allowed,
                requested: request.amount,
            });
        }

        let terms = LoanTerms {
            interest_rate: self.settings.nft_interest_rate,
            collateral_ratio: Rate::ZERO,
            max_loan_amount: allowed,
        };
        let (mut loan, debt) = self.stage_new_loan(request, &terms, request.amount, now)?;
        let target = DisbursementTarget::Direct(payout_address(&loan));
        self.disburse(&mut loan, target, now)?;

        let borrower = loan.borrower;
        let amount = loan.borrowed_amount;
        let loan_id = self.commit_new_loan(loan, debt, now)?;
        self.events.emit(Event::LoanActivated {
            loan_id,
            borrower,
            disbursed_to: target,
            amount,
            timestamp: now,
        });
        self.events.emit(Event::StatusChanged {
            loan_id,
            old_status: LoanStatus::TermsSet,
            new_status: LoanStatus::Active,
            timestamp: now,
        });

        info!(loan_id, nfts = nft_ids.len(), %amount, "nft loan taken out");
        Ok(loan_id)
    }
}
