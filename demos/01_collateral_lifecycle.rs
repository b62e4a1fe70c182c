/// collateral lifecycle - deposit, activate, withdraw surplus, repay or liquidate
use chrono::{Duration, TimeZone, Utc};
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

    println!("=== collateral lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()));
    let controller = time.test_control().unwrap();
    let dai = AssetId::new("DAI");
    let eth = AssetId::new("ETH");

    let nodes: Vec<ResponseSigner> = (1..=3u8).map(|i| ResponseSigner::from_seed([i; 32])).collect();
    let pool = Arc::new(MemoryLendingPool::new(
        AssetRegistry::new().with_asset(dai.clone(), AssetSettings::stablecoin()),
    ));
    pool.supply(&dai, Money::from_major(500_000));
    // 2,000 DAI per ETH
    let price = Arc::new(FixedPriceCollateralNeed::new(Money::from_major(2_000)));

    let mut market = LendingMarket::builder()
        .settings(PlatformSettings::default())
        .signers(Arc::new(SignerSet::from_addresses(nodes.iter().map(|n| n.address()))))
        .asset_policy(pool.clone())
        .collateral_need(price.clone())
        .custody(pool.clone())
        .build()?;

    let borrower = Address::new([0xb0; 32]);
    let open = |market: &mut LendingMarket, nonce: u64| -> Result<u64, Box<dyn std::error::Error>> {
        let request = LoanRequest {
            borrower,
            recipient: Address::ZERO,
            lending_asset: dai.clone(),
            collateral_asset: eth.clone(),
            nonce,
            amount: Money::from_major(10_000),
            duration: 30 * 24 * 3600,
            request_time: time.now(),
            consensus_address: Address::new([0xc0; 32]),
        };
        let terms = ResponseTerms {
            interest_rate: Rate::from_bps(600),
            collateral_ratio: Rate::from_bps(15_000),
            max_loan_amount: Money::from_major(10_000),
        };
        let responses: Vec<LoanResponse> = nodes
            .iter()
            .map(|n| LoanResponse::signed(n, &request, terms, time.now(), market.settings.chain_id))
            .collect();
        Ok(market.request_loan_terms(&request, &responses, &time)?)
    };

    // first loan: collateralize, activate, withdraw surplus, repay
    let loan_id = open(&mut market, 0)?;
    market.deposit_collateral(loan_id, &borrower, Money::from_major(10), Money::from_major(10), &time)?;
    let target = market.activate_loan(loan_id, &borrower, &time)?;
    println!("loan {} active, funds sent to {:?}", loan_id, target);
    println!("  total ETH collateral: {}", market.total_collateral(&eth));

    controller.advance(Duration::minutes(10));
    let needed = {
        let loan = market.get_loan(loan_id)?;
        let debt = market.get_debt(loan_id)?;
        teller_market::collateral::required_collateral(debt.total_owed(), loan.collateral_ratio, Money::from_major(2_000))?
    };
    let surplus = Money::from_major(10) - needed;
    println!("  needed {} ETH, withdrawing surplus {}", needed, surplus);
    market.withdraw_collateral(loan_id, &borrower, surplus, &time)?;

    if let Err(e) = market.withdraw_collateral(loan_id, &borrower, Money::ONE, &time) {
        println!("  further withdrawal refused: {}", e);
    }

    let owed = market.get_debt(loan_id)?.total_owed();
    let result = market.repay_loan(loan_id, &borrower, owed, &time)?;
    println!(
        "  repaid {} (interest {}, principal {}), collateral returned {}",
        owed, result.application.to_interest, result.application.to_principal, result.collateral_returned
    );
    println!("  status: {}", market.get_loan(loan_id)?.status);

    // second loan: price drops and a liquidator steps in
    controller.advance(Duration::minutes(2));
    let loan_id = open(&mut market, 1)?;
    market.deposit_collateral(loan_id, &borrower, Money::from_major(8), Money::from_major(8), &time)?;
    market.activate_loan(loan_id, &borrower, &time)?;
    price.set_price(Money::from_major(1_500));

    let liquidator = Address::new([0x11; 32]);
    let outcome = market.liquidate_loan(loan_id, &liquidator, &time)?;
    println!(
        "\nloan {} liquidated ({:?}): {} ETH seized, {} DAI still owed",
        loan_id, outcome.trigger, outcome.collateral_seized, outcome.outstanding_debt
    );

    println!("\nevents:");
    for event in market.take_events() {
        println!("  {:?}", event);
    }
    println!("\ntransfers: {}", pool.transfers().len());
    Ok(())
}
