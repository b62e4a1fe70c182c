use rust_decimal::Decimal;

use crate::decimal::Rate;
use crate::errors::{MarketError, Result};

/// averages numeric submissions and checks they agree within a tolerance band
#[derive(Debug, Clone, Copy)]
pub struct ToleranceAggregator {
    tolerance: Rate,
}

impl ToleranceAggregator {
    pub fn new(tolerance: Rate) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Rate {
        self.tolerance
    }

    /// arithmetic mean of the submissions, provided every submission lies
    /// within `mean * tolerance` of it (inclusive)
    ///
    /// Submissions whose sum or spread leaves the decimal range can never
    /// agree and are reported as out of tolerance.
    pub fn aggregate(&self, submissions: &[Decimal]) -> Result<Decimal> {
        if submissions.is_empty() {
            return Err(MarketError::NoSubmissions);
        }

        let mut sum = Decimal::ZERO;
        for &value in submissions {
            sum = sum
                .checked_add(value)
                .ok_or_else(|| self.exceeded(value, sum))?;
        }
        let mean = sum / Decimal::from(submissions.len());
        let band = mean
            .checked_mul(self.tolerance.as_decimal())
            .ok_or_else(|| self.exceeded(mean, mean))?
            .abs();

        // extremes are enough: every other value sits between them
        let min = submissions.iter().copied().fold(mean, Decimal::min);
        let max = submissions.iter().copied().fold(mean, Decimal::max);

        for value in [min, max] {
            let within = value
                .checked_sub(mean)
                .is_some_and(|deviation| deviation.abs() <= band);
            if !within {
                return Err(self.exceeded(value, mean));
            }
        }

        Ok(mean)
    }

    fn exceeded(&self, value: Decimal, mean: Decimal) -> MarketError {
        MarketError::ToleranceExceeded {
            value,
            mean,
            tolerance: self.tolerance,
        }
    }
}
