pub mod collaborators;
pub mod collateral;
pub mod config;
pub mod consensus;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod interest;
pub mod market;
pub mod mock;
pub mod payments;
pub mod serialization;
pub mod state;
pub mod types;

// re-export key types
pub use collaborators::{
    AssetPolicy, CollateralNeed, CreditProof, CreditScoreVerifier, FundsCustody, NftLoanSizer,
    ScoreTermsHandler,
};
pub use collateral::{CollateralLedger, LiquidationResult, LiquidationTrigger, OracleCollateralNeed, PriceFeed};
pub use config::{AssetRegistry, AssetSettings, PlatformSettings, SettingName};
pub use consensus::{
    ConsensusEngine, Ed25519Verifier, LoanRequest, LoanResponse, ResponseSigner, ResponseTerms,
    Signature, SignatureVerifier, SignerRegistry, SignerSet, ToleranceAggregator,
};
pub use decimal::{Money, Rate};
pub use errors::{ErrorKind, MarketError, Result};
pub use events::{Event, EventStore};
pub use market::{LendingMarket, LendingMarketBuilder, ScoreTier, TieredTermsHandler};
pub use payments::{RepaymentResult, RepaymentWaterfall};
pub use serialization::LoanView;
pub use state::{DebtRecord, Loan, LoanSnapshot};
pub use types::{
    Address, AssetId, ClosureKind, DisbursementTarget, LoanId, LoanStatus, LoanTerms,
    PaymentApplication,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
