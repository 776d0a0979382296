use {auctionhouse::arguments::Arguments, clap::Parser};

#[tokio::main]
async fn main() {
    let args = Arguments::parse();
    observe::tracing::initialize(&args.log_filter);
    observe::metrics::setup_registry(Some("auctionhouse".into()), None);
    tracing::info!("running auctionhouse with validated arguments:\n{args}");
    auctionhouse::run(args).await;
}
