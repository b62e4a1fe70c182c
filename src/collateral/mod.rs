pub mod ledger;
pub mod liquidation;
pub mod need;

pub use ledger::CollateralLedger;
pub use liquidation::{LiquidationResult, LiquidationTrigger};
pub use need::{required_collateral, OracleCollateralNeed, PriceFeed};
