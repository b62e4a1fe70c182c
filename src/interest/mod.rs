use rust_decimal::Decimal;

use crate::config::SECONDS_PER_YEAR;
use crate::decimal::{Money, Rate};

/// simple interest on `principal` for `duration_secs` at an annual rate
///
/// The annual rate is prorated by seconds over a 365-day year and charged once
/// up front when the terms are set.
pub fn interest_owed_for(principal: Money, annual_rate: Rate, duration_secs: u64) -> Money {
    let period_rate = annual_rate.as_decimal() * Decimal::from(duration_secs)
        / Decimal::from(SECONDS_PER_YEAR);
    principal.portion(Rate::from_decimal(period_rate))
}
