//! Market listing and creation through the factory boundary

use std::sync::Arc;

use distmarket_coordinator::*;
use distribution_model::Address;

fn params(description: &str) -> MarketParams {
    MarketParams {
        initial_mean: 50.0,
        initial_sigma: 5.0,
        k: 1.0,
        b: 25.0,
        price_feed_id: "ff".repeat(32),
        expiry: 1_900_000_000,
        collateral: Address::ZERO,
        description: description.into(),
        lp_name: "ETH LP".into(),
        lp_symbol: "ELP".into(),
        private: false,
        whitelist: Vec::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn created_market_shows_up_after_confirmation() {
    let (sim, first) = SimulatedMarket::with_market(Address([0xaa; 20]), &SimMarketParams::default()).unwrap();
    let sim = Arc::new(sim);
    let directory = MarketDirectory::new(sim.clone());

    assert!(directory.markets().is_pending());
    assert_eq!(directory.refresh().await, RemoteRead::Ready(vec![first]));

    directory.create_market(&params("ETH close")).await.unwrap();
    assert_eq!(directory.tracker().attempt().phase, TxPhase::Confirmed);

    let markets = directory.markets().ready().cloned().unwrap();
    assert_eq!(markets.len(), 2);

    // the new market is immediately tradable
    let coordinator = MarketCoordinator::mount(sim.clone(), markets[1], Address([0xaa; 20]), CoordinatorConfig::default()).await;
    let consensus = coordinator.consensus().ready().cloned().unwrap();
    assert_eq!((consensus.mean, consensus.sigma), (50.0, 5.0));
    assert_eq!(consensus.description, "ETH close");
}

#[tokio::test(start_paused = true)]
async fn invalid_market_params_never_reach_the_factory() {
    let (sim, _) = SimulatedMarket::with_market(Address([0xaa; 20]), &SimMarketParams::default()).unwrap();
    let sim = Arc::new(sim);
    let directory = MarketDirectory::new(sim.clone());

    let mut bad = params("broken");
    bad.b = -1.0;
    let err = directory.create_market(&bad).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(sim.calls_of(SimMethod::CreateMarket).is_empty());

    let attempt = directory.tracker().attempt();
    assert_eq!(attempt.phase, TxPhase::Idle);
    assert_eq!(attempt.error, Some(ErrorKind::InvalidInput));
}
