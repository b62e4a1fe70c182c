use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Money, Rate};
use crate::errors::{MarketError, Result};

/// loan ids are assigned monotonically and never reused
pub type LoanId = u64;

/// 32-byte account identity
///
/// Signer addresses are ed25519 verifying keys, so a response can be checked
/// against its claimed signer without a separate key lookup.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    /// parse from 64 hex characters, with or without a 0x prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| MarketError::InvalidConfiguration {
            message: format!("invalid address hex: {}", e),
        })?;
        let array: [u8; 32] = bytes.try_into().map_err(|_| MarketError::InvalidConfiguration {
            message: "address must be 32 bytes".to_string(),
        })?;
        Ok(Address(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form keeps log lines readable
        let hex = hex::encode(&self.0[..4]);
        write!(f, "Address(0x{}..)", hex)
    }
}

/// asset symbol (lending token or collateral token)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(symbol: impl Into<String>) -> Self {
        AssetId(symbol.into().to_uppercase())
    }

    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// how a closed loan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureKind {
    Repaid,
    Liquidated,
}

/// loan status
///
/// A loan that was never created has no status at all: lookups fail with
/// `LoanNotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// terms agreed, awaiting collateral and funding
    TermsSet,
    /// funds disbursed, debt outstanding
    Active,
    /// terminal
    Closed(ClosureKind),
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Closed(_))
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::TermsSet => write!(f, "TermsSet"),
            LoanStatus::Active => write!(f, "Active"),
            LoanStatus::Closed(ClosureKind::Repaid) => write!(f, "Closed(Repaid)"),
            LoanStatus::Closed(ClosureKind::Liquidated) => write!(f, "Closed(Liquidated)"),
        }
    }
}

/// terms produced by consensus (or an alternate sizing path)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub interest_rate: Rate,
    pub collateral_ratio: Rate,
    pub max_loan_amount: Money,
}

/// where loan funds are sent on activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisbursementTarget {
    /// straight to the borrower's recipient address
    Direct(Address),
    /// to the per-loan escrow that keeps custody of the collateral
    Escrow(LoanId),
}

/// repayment application result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PaymentApplication {
    pub to_interest: Money,
    pub to_principal: Money,
    pub excess: Money,
}

impl PaymentApplication {
    pub fn total_applied(&self) -> Money {
        self.to_interest + self.to_principal
    }
}
