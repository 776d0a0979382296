use {
    std::{
        fmt,
        fmt::{Display, Formatter},
        net::SocketAddr,
        time::Duration,
    },
    url::Url,
};

#[derive(clap::Parser)]
#[command(about = "Auction bidding service")]
pub struct Arguments {
    #[clap(long, env, default_value = "warn,auctionhouse=debug,database=debug")]
    pub log_filter: String,

    /// Address the API server listens on.
    #[clap(long, env, default_value = "0.0.0.0:8080")]
    pub bind_address: SocketAddr,

    /// Address the metrics and liveness server listens on.
    #[clap(long, env, default_value = "127.0.0.1:9586")]
    pub metrics_address: SocketAddr,

    /// Url of the Postgres database. By default connects to locally running
    /// postgres.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// Hex encoded 32 byte key that encrypts sealed bid amounts at rest.
    #[clap(long, env, hide_env_values = true)]
    pub sealed_bid_key: String,

    /// How often scheduled auctions are activated and expired ones settled.
    #[clap(long, env, default_value = "10s", value_parser = humantime::parse_duration)]
    pub maintenance_interval: Duration,
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            log_filter,
            bind_address,
            metrics_address,
            db_url: _,
            sealed_bid_key: _,
            maintenance_interval,
        } = self;
        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "bind_address: {bind_address}")?;
        writeln!(f, "metrics_address: {metrics_address}")?;
        writeln!(f, "db_url: SECRET")?;
        writeln!(f, "sealed_bid_key: SECRET")?;
        writeln!(f, "maintenance_interval: {maintenance_interval:?}")?;
        Ok(())
    }
}
