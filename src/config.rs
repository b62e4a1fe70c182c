use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decimal::{Money, Rate};
use crate::errors::{MarketError, Result};
use crate::types::AssetId;

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// upper bound on every window setting
pub const MAX_WINDOW_SECS: u64 = 100 * SECONDS_PER_YEAR;

/// settings hold windows as whole seconds
pub fn secs(seconds: u64) -> chrono::Duration {
    chrono::Duration::seconds(seconds.min(i64::MAX as u64 / 1_000) as i64)
}

/// `time` plus a window, saturating at the end of representable time
pub fn after(time: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    time.checked_add_signed(secs(seconds))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `time` minus a window, saturating at the start of representable time
pub fn before(time: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    time.checked_sub_signed(secs(seconds))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// platform-wide numeric parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// share of registered signers that must respond
    pub required_submissions_percentage: Rate,
    /// max deviation of any submission from the mean
    pub maximum_tolerance: Rate,
    /// seconds a signer response stays valid
    pub response_expiry_window: u64,
    /// seconds between a borrower's loan start and their next request
    pub request_loan_terms_rate_limit: u64,
    /// seconds agreed terms stay open for activation
    pub terms_expiry_time: u64,
    /// collateral ratios at or below this disburse directly
    pub open_collateral_ratio_threshold: Rate,
    /// seconds after a deposit before an active loan may withdraw
    pub safety_interval: u64,
    pub max_loan_duration: u64,
    pub chain_id: u64,
    pub native_asset: AssetId,
    /// interest rate charged on nft-sized loans
    pub nft_interest_rate: Rate,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            required_submissions_percentage: Rate::from_percentage(80),
            maximum_tolerance: Rate::from_bps(100),
            response_expiry_window: 15 * 60,
            request_loan_terms_rate_limit: 60,
            terms_expiry_time: 60 * 60,
            open_collateral_ratio_threshold: Rate::from_percentage(100),
            safety_interval: 5 * 60,
            max_loan_duration: 5 * SECONDS_PER_YEAR,
            chain_id: 1,
            native_asset: AssetId::new("ETH"),
            nft_interest_rate: Rate::from_bps(500),
        }
    }
}

/// named numeric settings that can be updated after deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingName {
    RequiredSubmissionsPercentage,
    MaximumTolerance,
    ResponseExpiryWindow,
    RequestLoanTermsRateLimit,
    TermsExpiryTime,
    OpenCollateralRatioThreshold,
    SafetyInterval,
    MaxLoanDuration,
    NftInterestRate,
}

impl PlatformSettings {
    /// load from json, filling nothing in: every field must be present
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: PlatformSettings =
            serde_json::from_str(json).map_err(|e| MarketError::InvalidConfiguration {
                message: format!("settings json: {}", e),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }

    /// check bounds
    pub fn validate(&self) -> Result<()> {
        if self.required_submissions_percentage > Rate::ONE
            || self.required_submissions_percentage.as_decimal().is_sign_negative()
        {
            return Err(invalid("required submissions percentage must be within 0..=100%"));
        }
        if self.maximum_tolerance > Rate::ONE || self.maximum_tolerance.as_decimal().is_sign_negative() {
            return Err(invalid("maximum tolerance must be within 0..=100%"));
        }
        if self.response_expiry_window == 0 {
            return Err(invalid("response expiry window must be positive"));
        }
        if self.max_loan_duration == 0 {
            return Err(invalid("max loan duration must be positive"));
        }
        let windows = [
            self.response_expiry_window,
            self.request_loan_terms_rate_limit,
            self.terms_expiry_time,
            self.safety_interval,
            self.max_loan_duration,
        ];
        if windows.iter().any(|&w| w > MAX_WINDOW_SECS) {
            return Err(invalid("windows must not exceed 100 years"));
        }
        if self.open_collateral_ratio_threshold.as_decimal().is_sign_negative()
            || self.nft_interest_rate.as_decimal().is_sign_negative()
        {
            return Err(invalid("rates must not be negative"));
        }
        Ok(())
    }

    /// read a named setting; rates are reported in basis points, windows in seconds
    pub fn get(&self, name: SettingName) -> Decimal {
        match name {
            SettingName::RequiredSubmissionsPercentage => self.required_submissions_percentage.as_bps(),
            SettingName::MaximumTolerance => self.maximum_tolerance.as_bps(),
            SettingName::ResponseExpiryWindow => Decimal::from(self.response_expiry_window),
            SettingName::RequestLoanTermsRateLimit => Decimal::from(self.request_loan_terms_rate_limit),
            SettingName::TermsExpiryTime => Decimal::from(self.terms_expiry_time),
            SettingName::OpenCollateralRatioThreshold => self.open_collateral_ratio_threshold.as_bps(),
            SettingName::SafetyInterval => Decimal::from(self.safety_interval),
            SettingName::MaxLoanDuration => Decimal::from(self.max_loan_duration),
            SettingName::NftInterestRate => self.nft_interest_rate.as_bps(),
        }
    }

    /// update a named setting with the same units `get` reports; rejected
    /// updates leave the settings untouched
    pub fn set(&mut self, name: SettingName, value: Decimal) -> Result<()> {
        if value.is_sign_negative() {
            return Err(invalid("setting values must not be negative"));
        }
        let mut next = self.clone();
        match name {
            SettingName::RequiredSubmissionsPercentage => {
                next.required_submissions_percentage = Rate::from_bps_decimal(value)
            }
            SettingName::MaximumTolerance => next.maximum_tolerance = Rate::from_bps_decimal(value),
            SettingName::ResponseExpiryWindow => next.response_expiry_window = seconds(value)?,
            SettingName::RequestLoanTermsRateLimit => next.request_loan_terms_rate_limit = seconds(value)?,
            SettingName::TermsExpiryTime => next.terms_expiry_time = seconds(value)?,
            SettingName::OpenCollateralRatioThreshold => {
                next.open_collateral_ratio_threshold = Rate::from_bps_decimal(value)
            }
            SettingName::SafetyInterval => next.safety_interval = seconds(value)?,
            SettingName::MaxLoanDuration => next.max_loan_duration = seconds(value)?,
            SettingName::NftInterestRate => next.nft_interest_rate = Rate::from_bps_decimal(value),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn seconds(value: Decimal) -> Result<u64> {
    if !value.fract().is_zero() {
        return Err(invalid("durations are whole seconds"));
    }
    value.to_u64().ok_or_else(|| invalid("duration out of range"))
}

fn invalid(message: &str) -> MarketError {
    MarketError::InvalidConfiguration {
        message: message.to_string(),
    }
}

/// per lending-asset limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSettings {
    pub max_loan_amount: Money,
    /// ceiling on borrowed / supplied for the asset pool
    pub max_debt_ratio: Rate,
}

impl AssetSettings {
    pub fn new(max_loan_amount: Money, max_debt_ratio: Rate) -> Self {
        Self {
            max_loan_amount,
            max_debt_ratio,
        }
    }

    /// a stablecoin pool preset
    pub fn stablecoin() -> Self {
        Self::new(Money::from_major(100_000), Rate::from_percentage(75))
    }
}

/// asset settings keyed by lending asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetRegistry {
    pub assets: BTreeMap<AssetId, AssetSettings>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset: AssetId, settings: AssetSettings) -> Self {
        self.assets.insert(asset, settings);
        self
    }

    pub fn get(&self, asset: &AssetId) -> Result<&AssetSettings> {
        self.assets
            .get(asset)
            .ok_or_else(|| MarketError::UnsupportedAsset { asset: asset.clone() })
    }
}
