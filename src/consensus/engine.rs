use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::request::{LoanRequest, LoanResponse};
use super::signature::SignatureVerifier;
use super::signers::SignerRegistry;
use super::tolerance::ToleranceAggregator;
use crate::config::{after, before, PlatformSettings};
use crate::decimal::{Money, Rate};
use crate::errors::{MarketError, Result};
use crate::types::LoanTerms;

/// what the engine needs to know about a borrower's past loans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BorrowerHistory {
    pub loan_count: u64,
    /// start of the most recent loan. A loan that was never activated counts
    /// from the time its terms were set, so an open TermsSet loan still
    /// rate-limits the borrower's next request (see `Loan::rate_limit_anchor`).
    pub last_loan_start: Option<DateTime<Utc>>,
}

/// turns a request plus signer responses into trusted terms
pub struct ConsensusEngine {
    verifier: Arc<dyn SignatureVerifier>,
}

impl ConsensusEngine {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    /// nonce ordering and per-borrower rate limit
    pub fn validate_request(
        &self,
        request: &LoanRequest,
        history: &BorrowerHistory,
        settings: &PlatformSettings,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if request.nonce != history.loan_count {
            return Err(MarketError::BadNonce {
                expected: history.loan_count,
                provided: request.nonce,
            });
        }

        if history.loan_count > 0 {
            if let Some(last_start) = history.last_loan_start {
                let allowed_at = after(last_start, settings.request_loan_terms_rate_limit);
                if allowed_at > now {
                    return Err(MarketError::RateLimited {
                        retry_after_secs: (allowed_at - now).num_seconds(),
                    });
                }
            }
        }

        if request.duration > settings.max_loan_duration {
            return Err(MarketError::DurationExceeded {
                max_secs: settings.max_loan_duration,
                requested_secs: request.duration,
            });
        }

        Ok(())
    }

    /// full consensus pass; no partial terms are ever returned
    pub fn process_loan_terms(
        &self,
        request: &LoanRequest,
        responses: &[LoanResponse],
        history: &BorrowerHistory,
        signers: &dyn SignerRegistry,
        settings: &PlatformSettings,
        now: DateTime<Utc>,
    ) -> Result<LoanTerms> {
        self.validate_request(request, history, settings, now)?;
        check_submissions(responses.len(), signers.signer_count(), settings.required_submissions_percentage)?;

        let request_hash = request.hash(settings.chain_id);
        let earliest_valid = before(now, settings.response_expiry_window);

        for (i, response) in responses.iter().enumerate() {
            if response.consensus_address != request.consensus_address {
                return Err(MarketError::ConsensusAddressMismatch {
                    expected: request.consensus_address,
                    provided: response.consensus_address,
                });
            }

            if !signers.is_authorized_signer(&response.signer) {
                warn!(signer = %response.signer, "response from unauthorized signer");
                return Err(MarketError::SignerUnauthorized {
                    signer: response.signer,
                });
            }

            // committees are small, pairwise is fine
            if responses[..i].iter().any(|earlier| earlier.signer == response.signer) {
                return Err(MarketError::DuplicateSigner {
                    signer: response.signer,
                });
            }

            if response.response_time < earliest_valid {
                debug!(signer = %response.signer, response_time = %response.response_time, "response expired");
                return Err(MarketError::ResponseExpired {
                    signer: response.signer,
                });
            }

            let digest = response.digest(&request_hash, settings.chain_id);
            if !self.verifier.verify(&digest, &response.signature, &response.signer) {
                warn!(signer = %response.signer, "response signature invalid");
                return Err(MarketError::SignatureInvalid {
                    signer: response.signer,
                });
            }
        }

        let terms = aggregate_terms(responses, settings.maximum_tolerance)?;

        info!(
            borrower = %request.borrower,
            responses = responses.len(),
            interest_rate = %terms.interest_rate,
            collateral_ratio = %terms.collateral_ratio,
            max_loan_amount = %terms.max_loan_amount,
            "consensus reached"
        );

        Ok(terms)
    }
}

/// responses / signers >= required, compared without division
fn check_submissions(received: usize, signers: usize, required: Rate) -> Result<()> {
    let enough = received > 0
        && signers > 0
        && Decimal::from(received) >= Decimal::from(signers) * required.as_decimal();
    if !enough {
        return Err(MarketError::InsufficientSubmissions {
            received,
            signers,
            required,
        });
    }
    Ok(())
}

fn aggregate_terms(responses: &[LoanResponse], tolerance: Rate) -> Result<LoanTerms> {
    let aggregator = ToleranceAggregator::new(tolerance);

    let aggregate = |term: &'static str, values: Vec<Decimal>| {
        aggregator.aggregate(&values).map_err(|e| {
            debug!(term, error = %e, "aggregation failed");
            MarketError::ResponsesTooVaried { term }
        })
    };

    let interest_rate = aggregate(
        "interest_rate",
        responses.iter().map(|r| r.interest_rate.as_decimal()).collect(),
    )?;
    let collateral_ratio = aggregate(
        "collateral_ratio",
        responses.iter().map(|r| r.collateral_ratio.as_decimal()).collect(),
    )?;
    let max_loan_amount = aggregate(
        "max_loan_amount",
        responses.iter().map(|r| r.max_loan_amount.as_decimal()).collect(),
    )?;

    Ok(LoanTerms {
        interest_rate: Rate::from_decimal(interest_rate),
        collateral_ratio: Rate::from_decimal(collateral_ratio),
        max_loan_amount: Money::from_decimal(max_loan_amount),
    })
}
