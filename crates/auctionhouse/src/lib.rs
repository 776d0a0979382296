pub mod api;
pub mod arguments;
pub mod bidding;
pub mod clock;
pub mod database;
pub mod deposits;
pub mod lifecycle;
pub mod maintenance;
pub mod notifications;
pub mod vault;

use {
    crate::{
        arguments::Arguments,
        bidding::Bidding,
        database::{
            Postgres,
            auctions::AuctionStoring,
            bids::BidRetrieving,
            deposits::DepositStoring,
            sealed_bids::SealedBidStoring,
        },
        deposits::DepositLedger,
        lifecycle::Lifecycle,
        maintenance::Maintenance,
        notifications::{LogSink, Notifier},
        vault::{SealedBidCipher, Vault},
    },
    std::sync::Arc,
};

pub async fn run(args: Arguments) {
    let postgres = Postgres::new(args.db_url.as_str()).expect("failed to create database");
    let cipher =
        SealedBidCipher::from_hex(&args.sealed_bid_key).expect("invalid sealed bid key");
    let clock = clock::system_clock();
    let notifier = Notifier::spawn(Arc::new(LogSink));

    let auctions: Arc<dyn AuctionStoring> = Arc::new(postgres.clone());
    let bids: Arc<dyn BidRetrieving> = Arc::new(postgres.clone());
    let deposits: Arc<dyn DepositStoring> = Arc::new(postgres.clone());
    let sealed_bids: Arc<dyn SealedBidStoring> = Arc::new(postgres.clone());

    let bidding = Arc::new(Bidding::new(
        auctions.clone(),
        bids.clone(),
        deposits.clone(),
        clock.clone(),
        notifier.clone(),
    ));
    let lifecycle = Arc::new(Lifecycle::new(
        auctions.clone(),
        bids.clone(),
        deposits.clone(),
        sealed_bids.clone(),
        clock.clone(),
        notifier.clone(),
    ));
    let ledger = Arc::new(DepositLedger::new(
        auctions.clone(),
        deposits.clone(),
        clock.clone(),
        notifier.clone(),
    ));
    let vault = Arc::new(Vault::new(
        auctions.clone(),
        sealed_bids,
        deposits,
        cipher,
        clock,
        notifier,
    ));

    let maintenance = Maintenance::new(lifecycle.clone(), vault.clone());
    tokio::task::spawn(maintenance.run_forever(args.maintenance_interval));

    let metrics_listener = tokio::net::TcpListener::bind(args.metrics_address)
        .await
        .expect("failed to bind metrics address");
    let metrics = observe::metrics::metrics_router(Arc::new(postgres));
    tokio::task::spawn(async move {
        axum::serve(metrics_listener, metrics)
            .await
            .expect("metrics server failed");
    });

    let app = api::handle_all_routes(api::AppState {
        bidding,
        lifecycle,
        deposits: ledger,
        vault,
        auctions,
        bids,
    });
    let listener = tokio::net::TcpListener::bind(args.bind_address)
        .await
        .expect("failed to bind api address");
    tracing::info!(address = %args.bind_address, "serving auction api");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("api server failed");
}

async fn shutdown_signal() {
    // Shut down cleanly when the process is asked to stop.
    tokio::signal::ctrl_c().await.ok();
}
