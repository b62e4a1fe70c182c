use crate::collaborators::CollateralNeed;
use crate::decimal::{Money, Rate};
use crate::errors::{MarketError, Result};
use crate::state::{DebtRecord, Loan};
use crate::types::AssetId;

/// price feed quoting one asset in terms of another
pub trait PriceFeed: Send + Sync {
    /// units of `quote` paid for one unit of `base`
    fn price(&self, base: &AssetId, quote: &AssetId) -> Result<Money>;
}

/// collateral covering `owed` at `ratio`, expressed in collateral units
///
/// `price` is the value of one collateral unit in the lending asset.
pub fn required_collateral(owed: Money, ratio: Rate, price: Money) -> Result<Money> {
    if !price.is_positive() {
        return Err(MarketError::PriceUnavailable {
            message: format!("non-positive collateral price {}", price),
        });
    }
    if ratio.is_zero() || owed.is_zero() {
        return Ok(Money::ZERO);
    }
    let value_needed = owed.portion(ratio).as_decimal();
    Ok(Money::from_decimal(value_needed / price.as_decimal()))
}

/// collateral requirement priced by a feed
pub struct OracleCollateralNeed<F: PriceFeed> {
    feed: F,
}

impl<F: PriceFeed> OracleCollateralNeed<F> {
    pub fn new(feed: F) -> Self {
        Self { feed }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }
}

impl<F: PriceFeed> CollateralNeed for OracleCollateralNeed<F> {
    fn needed_collateral(&self, loan: &Loan, debt: &DebtRecord) -> Result<Money> {
        let price = self.feed.price(&loan.collateral_asset, &loan.lending_asset)?;
        required_collateral(debt.total_owed(), loan.collateral_ratio, price)
    }
}
