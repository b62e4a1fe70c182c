/// consensus loan - five signers quote terms, four respond, a loan is opened
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use teller_market::mock::{FixedPriceCollateralNeed, MemoryLendingPool};
use teller_market::{
    Address, AssetId, AssetRegistry, AssetSettings, LendingMarket, LoanRequest, LoanResponse, Money,
    PlatformSettings, Rate, ResponseSigner, ResponseTerms, SafeTimeProvider, SignerSet, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== consensus loan ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()));
    let dai = AssetId::new("DAI");

    // signer nodes
    let nodes: Vec<ResponseSigner> = (1..=5u8).map(|i| ResponseSigner::from_seed([i; 32])).collect();
    let signers = Arc::new(SignerSet::from_addresses(nodes.iter().map(|n| n.address())));

    let pool = Arc::new(MemoryLendingPool::new(
        AssetRegistry::new().with_asset(dai.clone(), AssetSettings::stablecoin()),
    ));
    pool.supply(&dai, Money::from_major(500_000));

    let mut market = LendingMarket::builder()
        .settings(PlatformSettings::default())
        .signers(signers)
        .asset_policy(pool.clone())
        .collateral_need(Arc::new(FixedPriceCollateralNeed::new(Money::from_major(3_000))))
        .custody(pool)
        .build()?;

    let borrower = Address::new([0xb0; 32]);
    let request = LoanRequest {
        borrower,
        recipient: Address::ZERO,
        lending_asset: dai,
        collateral_asset: AssetId::new("ETH"),
        nonce: 0,
        amount: Money::from_major(25_000),
        duration: 90 * 24 * 3600,
        request_time: time.now(),
        consensus_address: Address::new([0xc0; 32]),
    };

    // four of five nodes answer, each with a slightly different view
    let quotes = [(800, 15_000, 25_000), (805, 15_000, 25_100), (798, 15_000, 24_900), (797, 15_000, 25_000)];
    let responses: Vec<LoanResponse> = nodes
        .iter()
        .zip(quotes)
        .map(|(node, (rate, ratio, max))| {
            let terms = ResponseTerms {
                interest_rate: Rate::from_bps(rate),
                collateral_ratio: Rate::from_bps(ratio),
                max_loan_amount: Money::from_major(max),
            };
            LoanResponse::signed(node, &request, terms, time.now(), market.settings.chain_id)
        })
        .collect();

    let loan_id = market.request_loan_terms(&request, &responses, &time)?;
    let loan = market.get_loan(loan_id)?;
    println!("loan {} opened", loan_id);
    println!("  interest rate:    {}", loan.interest_rate);
    println!("  collateral ratio: {}", loan.collateral_ratio);
    println!("  borrowed amount:  {}", loan.borrowed_amount);
    println!("  debt:             {}", market.get_debt(loan_id)?.total_owed());

    // a second request with a stale nonce is refused
    match market.request_loan_terms(&request, &responses, &time) {
        Ok(id) => println!("\nunexpected second loan {}", id),
        Err(e) => println!("\nreplayed request rejected: {}", e),
    }

    println!("\n{}", market.loan_view(loan_id)?.to_json_pretty());
    Ok(())
}
