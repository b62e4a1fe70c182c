use thiserror::Error;

use crate::decimal::{Money, Rate};
use crate::types::{Address, AssetId, LoanId, LoanStatus};

/// broad class of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// caller input malformed or violating policy
    Validation,
    /// caller or signer not permitted
    Authorization,
    /// signed data does not hold together
    Integrity,
    /// loan not in the state the operation needs
    State,
    /// an injected collaborator failed
    Collaborator,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("bad request nonce: expected {expected}, got {provided}")]
    BadNonce {
        expected: u64,
        provided: u64,
    },

    #[error("borrower rate limited: next request allowed in {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: i64,
    },

    #[error("insufficient submissions: {received} of {signers} signers responded, {required} required")]
    InsufficientSubmissions {
        received: usize,
        signers: usize,
        required: Rate,
    },

    #[error("responses too varied for {term}")]
    ResponsesTooVaried {
        term: &'static str,
    },

    #[error("max loan amount exceeded: limit {limit}, requested {requested}")]
    MaxLoanAmountExceeded {
        limit: Money,
        requested: Money,
    },

    #[error("debt ratio exceeded for {asset}: {ratio} above ceiling {max}")]
    DebtRatioExceeded {
        asset: AssetId,
        ratio: Rate,
        max: Rate,
    },

    #[error("amount mismatch: amount {amount}, attached value {attached}")]
    AmountMismatch {
        amount: Money,
        attached: Money,
    },

    #[error("withdrawal exceeds surplus: surplus {surplus}, requested {requested}")]
    WithdrawalExceedsSurplus {
        surplus: Money,
        requested: Money,
    },

    #[error("signer unauthorized: {signer}")]
    SignerUnauthorized {
        signer: Address,
    },

    #[error("duplicate signer response: {signer}")]
    DuplicateSigner {
        signer: Address,
    },

    #[error("caller {caller} is not the borrower of loan {loan_id}")]
    NotBorrower {
        loan_id: LoanId,
        caller: Address,
    },

    #[error("signature invalid for signer {signer}")]
    SignatureInvalid {
        signer: Address,
    },

    #[error("consensus address mismatch: expected {expected}, got {provided}")]
    ConsensusAddressMismatch {
        expected: Address,
        provided: Address,
    },

    #[error("response from {signer} expired")]
    ResponseExpired {
        signer: Address,
    },

    #[error("invalid loan state for loan {loan_id}: current {current}, expected {expected}")]
    InvalidLoanState {
        loan_id: LoanId,
        current: LoanStatus,
        expected: String,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("unsupported asset: {asset}")]
    UnsupportedAsset {
        asset: AssetId,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("loan duration exceeded: max {max_secs}s, requested {requested_secs}s")]
    DurationExceeded {
        max_secs: u64,
        requested_secs: u64,
    },

    #[error("terms for loan {loan_id} expired")]
    TermsExpired {
        loan_id: LoanId,
    },

    #[error("insufficient collateral: available {available}, required {required}")]
    InsufficientCollateral {
        available: Money,
        required: Money,
    },

    #[error("collateral deposited recently on loan {loan_id}")]
    CollateralDepositedRecently {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} is not liquidable")]
    NotLiquidable {
        loan_id: LoanId,
    },

    #[error("tolerance exceeded: {value} deviates from mean {mean} beyond {tolerance}")]
    ToleranceExceeded {
        value: rust_decimal::Decimal,
        mean: rust_decimal::Decimal,
        tolerance: Rate,
    },

    #[error("no submissions to aggregate")]
    NoSubmissions,

    #[error("credit proof rejected: {message}")]
    ProofRejected {
        message: String,
    },

    #[error("nft allowance exceeded: allowed {allowed}, requested {requested}")]
    NftAllowanceExceeded {
        allowed: Money,
        requested: Money,
    },

    #[error("price unavailable: {message}")]
    PriceUnavailable {
        message: String,
    },

    #[error("transfer failed: {message}")]
    TransferFailed {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        use MarketError::*;
        match self {
            BadNonce { .. }
            | RateLimited { .. }
            | InsufficientSubmissions { .. }
            | ResponsesTooVaried { .. }
            | MaxLoanAmountExceeded { .. }
            | DebtRatioExceeded { .. }
            | AmountMismatch { .. }
            | WithdrawalExceedsSurplus { .. }
            | UnsupportedAsset { .. }
            | InvalidAmount { .. }
            | DurationExceeded { .. }
            | InsufficientCollateral { .. }
            | CollateralDepositedRecently { .. }
            | ToleranceExceeded { .. }
            | NoSubmissions
            | NftAllowanceExceeded { .. }
            | InvalidConfiguration { .. } => ErrorKind::Validation,
            SignerUnauthorized { .. } | DuplicateSigner { .. } | NotBorrower { .. } => {
                ErrorKind::Authorization
            }
            SignatureInvalid { .. }
            | ConsensusAddressMismatch { .. }
            | ResponseExpired { .. }
            | ProofRejected { .. } => ErrorKind::Integrity,
            InvalidLoanState { .. }
            | LoanNotFound { .. }
            | TermsExpired { .. }
            | NotLiquidable { .. } => ErrorKind::State,
            PriceUnavailable { .. } | TransferFailed { .. } => ErrorKind::Collaborator,
        }
    }

    /// whether the same request may succeed later with other signers, more
    /// time, more collateral or a recovered collaborator
    pub fn is_retryable(&self) -> bool {
        use MarketError::*;
        matches!(
            self,
            RateLimited { .. }
                | InsufficientSubmissions { .. }
                | ResponsesTooVaried { .. }
                | ResponseExpired { .. }
                | SignerUnauthorized { .. }
                | DuplicateSigner { .. }
                | SignatureInvalid { .. }
                | BadNonce { .. }
                | InsufficientCollateral { .. }
                | CollateralDepositedRecently { .. }
                | PriceUnavailable { .. }
                | TransferFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(MarketError::NoSubmissions.kind(), ErrorKind::Validation);
        assert_eq!(
            MarketError::DuplicateSigner { signer: Address::ZERO }.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            MarketError::ResponseExpired { signer: Address::ZERO }.kind(),
            ErrorKind::Integrity
        );
        assert_eq!(MarketError::LoanNotFound { loan_id: 7 }.kind(), ErrorKind::State);
    }

    #[test]
    fn test_retryable_versus_permanent() {
        assert!(MarketError::ResponseExpired { signer: Address::ZERO }.is_retryable());
        assert!(MarketError::InsufficientSubmissions {
            received: 2,
            signers: 5,
            required: Rate::from_percentage(60),
        }
        .is_retryable());
        assert!(!MarketError::MaxLoanAmountExceeded {
            limit: Money::from_major(10),
            requested: Money::from_major(20),
        }
        .is_retryable());
        assert!(!MarketError::DebtRatioExceeded {
            asset: AssetId::new("DAI"),
            ratio: Rate::from_percentage(90),
            max: Rate::from_percentage(80),
        }
        .is_retryable());
    }
}
