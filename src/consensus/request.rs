use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hashing::{CanonicalHasher, Digest32};
use super::signature::{ResponseSigner, Signature};
use crate::decimal::{Money, Rate};
use crate::types::{Address, AssetId};

const REQUEST_DOMAIN: &str = "teller.loan-request.v1";
const RESPONSE_DOMAIN: &str = "teller.loan-response.v1";

/// a borrower's request for loan terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub borrower: Address,
    /// receives the funds on direct disbursement; zero means the borrower
    pub recipient: Address,
    pub lending_asset: AssetId,
    pub collateral_asset: AssetId,
    /// must equal the borrower's current loan count
    pub nonce: u64,
    pub amount: Money,
    /// seconds
    pub duration: u64,
    pub request_time: DateTime<Utc>,
    /// market or settings domain the signers attest for
    pub consensus_address: Address,
}

impl LoanRequest {
    /// hash binding every request field and the chain id
    pub fn hash(&self, chain_id: u64) -> Digest32 {
        CanonicalHasher::new(REQUEST_DOMAIN)
            .asset(&self.lending_asset)
            .asset(&self.collateral_asset)
            .money(self.amount)
            .address(&self.borrower)
            .address(&self.recipient)
            .address(&self.consensus_address)
            .u64(self.nonce)
            .u64(self.duration)
            .timestamp(self.request_time)
            .u64(chain_id)
            .finish()
    }
}

/// one signer's attestation of terms for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanResponse {
    pub signer: Address,
    pub consensus_address: Address,
    pub response_time: DateTime<Utc>,
    pub interest_rate: Rate,
    pub collateral_ratio: Rate,
    pub max_loan_amount: Money,
    pub signature: Signature,
}

impl LoanResponse {
    /// digest the signer commits to
    pub fn digest(&self, request_hash: &Digest32, chain_id: u64) -> Digest32 {
        response_digest(
            &self.consensus_address,
            self.response_time,
            self.interest_rate,
            self.collateral_ratio,
            self.max_loan_amount,
            chain_id,
            request_hash,
        )
    }

    /// build and sign a response for `request`
    pub fn signed(
        signer: &ResponseSigner,
        request: &LoanRequest,
        terms: ResponseTerms,
        response_time: DateTime<Utc>,
        chain_id: u64,
    ) -> Self {
        let request_hash = request.hash(chain_id);
        let digest = response_digest(
            &request.consensus_address,
            response_time,
            terms.interest_rate,
            terms.collateral_ratio,
            terms.max_loan_amount,
            chain_id,
            &request_hash,
        );
        Self {
            signer: signer.address(),
            consensus_address: request.consensus_address,
            response_time,
            interest_rate: terms.interest_rate,
            collateral_ratio: terms.collateral_ratio,
            max_loan_amount: terms.max_loan_amount,
            signature: signer.sign(&digest),
        }
    }
}

/// the numeric part of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseTerms {
    pub interest_rate: Rate,
    pub collateral_ratio: Rate,
    pub max_loan_amount: Money,
}

fn response_digest(
    consensus_address: &Address,
    response_time: DateTime<Utc>,
    interest_rate: Rate,
    collateral_ratio: Rate,
    max_loan_amount: Money,
    chain_id: u64,
    request_hash: &Digest32,
) -> Digest32 {
    CanonicalHasher::new(RESPONSE_DOMAIN)
        .address(consensus_address)
        .timestamp(response_time)
        .rate(interest_rate)
        .rate(collateral_ratio)
        .money(max_loan_amount)
        .u64(chain_id)
        .digest(request_hash)
        .finish()
}
