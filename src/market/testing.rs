use chrono::{Duration, TimeZone, Utc};
use hourglass_rs::{SafeTimeProvider, TimeSource};
use std::sync::Arc;

use super::LendingMarket;
use crate::config::{AssetRegistry, AssetSettings, PlatformSettings};
use crate::consensus::{LoanRequest, LoanResponse, ResponseSigner, ResponseTerms, SignerSet};
use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::mock::{FixedPriceCollateralNeed, MemoryLendingPool, MockCreditVerifier, MockNftSizer};
use crate::types::{Address, AssetId, LoanId};

pub fn borrower() -> Address {
    Address::new([0xb0; 32])
}

pub fn liquidator() -> Address {
    Address::new([0x11; 32])
}

pub fn dai() -> AssetId {
    AssetId::new("DAI")
}

pub fn eth() -> AssetId {
    AssetId::new("ETH")
}

pub fn default_terms() -> ResponseTerms {
    ResponseTerms {
        interest_rate: Rate::from_bps(500),
        collateral_ratio: Rate::from_bps(15_000),
        max_loan_amount: Money::from_major(10_000),
    }
}

/// market wired to in-memory collaborators and a test clock
pub struct Harness {
    pub market: LendingMarket,
    pub signers: Vec<ResponseSigner>,
    pub registry: Arc<SignerSet>,
    pub pool: Arc<MemoryLendingPool>,
    pub need: Arc<FixedPriceCollateralNeed>,
    pub credit: Arc<MockCreditVerifier>,
    pub nfts: Arc<MockNftSizer>,
    pub time: SafeTimeProvider,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_supply(Money::from_major(1_000_000))
    }

    pub fn with_supply(supply: Money) -> Self {
        let signers: Vec<ResponseSigner> = (1..=5u8).map(|i| ResponseSigner::from_seed([i; 32])).collect();
        let registry = Arc::new(SignerSet::from_addresses(signers.iter().map(|s| s.address())));
        let pool = Arc::new(MemoryLendingPool::new(
            AssetRegistry::new().with_asset(dai(), AssetSettings::stablecoin()),
        ));
        pool.supply(&dai(), supply);
        let need = Arc::new(FixedPriceCollateralNeed::new(Money::from_major(2_000)));
        let credit = Arc::new(MockCreditVerifier::new());
        let nfts = Arc::new(MockNftSizer::new(Money::from_major(500)));

        let settings = PlatformSettings {
            required_submissions_percentage: Rate::from_percentage(60),
            maximum_tolerance: Rate::from_bps(100),
            ..PlatformSettings::default()
        };

        let market = LendingMarket::builder()
            .settings(settings)
            .signers(registry.clone())
            .asset_policy(pool.clone())
            .collateral_need(need.clone())
            .custody(pool.clone())
            .credit_verifier(credit.clone())
            .nft_sizer(nfts.clone())
            .build()
            .unwrap();

        Self {
            market,
            signers,
            registry,
            pool,
            need,
            credit,
            nfts,
            time: SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())),
        }
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.time.test_control().unwrap().advance(Duration::seconds(seconds));
    }

    pub fn request(&self, nonce: u64) -> LoanRequest {
        LoanRequest {
            borrower: borrower(),
            recipient: Address::ZERO,
            lending_asset: dai(),
            collateral_asset: eth(),
            nonce,
            amount: Money::from_major(10_000),
            duration: 30 * 24 * 3600,
            request_time: self.time.now(),
            consensus_address: Address::new([0xc0; 32]),
        }
    }

    pub fn respond(&self, idx: usize, request: &LoanRequest, terms: ResponseTerms) -> LoanResponse {
        LoanResponse::signed(
            &self.signers[idx],
            request,
            terms,
            self.time.now(),
            self.market.settings.chain_id,
        )
    }

    pub fn responses(&self, request: &LoanRequest, terms: ResponseTerms, count: usize) -> Vec<LoanResponse> {
        (0..count).map(|i| self.respond(i, request, terms)).collect()
    }

    /// first loan of the borrower, three of five signers agreeing
    pub fn request_default(&mut self) -> Result<LoanId> {
        let request = self.request(0);
        let responses = self.responses(&request, default_terms(), 3);
        self.market.request_loan_terms(&request, &responses, &self.time)
    }

    pub fn deposit_eth(&mut self, loan_id: LoanId, amount: Money) -> Result<Money> {
        self.market
            .deposit_collateral(loan_id, &borrower(), amount, amount, &self.time)
    }

    /// default loan, collateralized and taken out
    pub fn active_loan(&mut self, collateral: Money) -> Result<LoanId> {
        let loan_id = self.request_default()?;
        self.need.set_need(loan_id, Money::ZERO);
        self.deposit_eth(loan_id, collateral)?;
        self.market.activate_loan(loan_id, &borrower(), &self.time)?;
        Ok(loan_id)
    }
}
