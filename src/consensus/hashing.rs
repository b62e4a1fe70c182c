//! Canonical, order-sensitive encoding of signed loan data.
//!
//! Every field is written at a fixed width or with a length prefix so two
//! different field sequences can never produce the same byte stream.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::decimal::{Money, Rate};
use crate::types::{Address, AssetId};

pub type Digest32 = [u8; 32];

/// sha-256 accumulator over canonical field encodings
pub struct CanonicalHasher {
    hasher: Sha256,
}

impl CanonicalHasher {
    /// start a hash under a domain tag so request and response digests never collide
    pub fn new(domain: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((domain.len() as u32).to_be_bytes());
        hasher.update(domain.as_bytes());
        Self { hasher }
    }

    pub fn address(mut self, address: &Address) -> Self {
        self.hasher.update(address.as_bytes());
        self
    }

    pub fn asset(mut self, asset: &AssetId) -> Self {
        let symbol = asset.symbol().as_bytes();
        self.hasher.update((symbol.len() as u32).to_be_bytes());
        self.hasher.update(symbol);
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub fn timestamp(mut self, time: DateTime<Utc>) -> Self {
        self.hasher.update(time.timestamp().to_be_bytes());
        self
    }

    pub fn money(self, amount: Money) -> Self {
        self.decimal(amount.as_decimal())
    }

    /// rates are committed to as their fractional value, never rescaled, so
    /// any decimal a response carries can be encoded
    pub fn rate(self, rate: Rate) -> Self {
        self.decimal(rate.as_decimal())
    }

    pub fn digest(mut self, digest: &Digest32) -> Self {
        self.hasher.update(digest);
        self
    }

    fn decimal(mut self, value: Decimal) -> Self {
        // 1.50 and 1.5 must hash the same
        self.hasher.update(value.normalize().serialize());
        self
    }

    pub fn finish(self) -> Digest32 {
        self.hasher.finalize().into()
    }
}
