//! Background sweep that keeps auction state moving without traffic:
//! scheduled auctions activate at their start time, expired open auctions
//! close and expired sealed-bid auctions settle through the vault.

use {
    crate::{lifecycle::Lifecycle, vault::Vault},
    std::sync::Arc,
};

pub struct Maintenance {
    lifecycle: Arc<Lifecycle>,
    vault: Arc<Vault>,
}

impl Maintenance {
    pub fn new(lifecycle: Arc<Lifecycle>, vault: Arc<Vault>) -> Self {
        Self { lifecycle, vault }
    }

    pub async fn run_forever(self, interval: std::time::Duration) -> ! {
        loop {
            self.sweep().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// One pass. Failures are logged and retried on the next pass.
    pub async fn sweep(&self) {
        match self.lifecycle.activate_due().await {
            Ok(started) if started > 0 => tracing::info!(started, "activated due auctions"),
            Ok(_) => (),
            Err(err) => tracing::error!(?err, "failed to activate due auctions"),
        }
        match self.lifecycle.close_expired().await {
            Ok(closed) if closed > 0 => tracing::info!(closed, "closed expired auctions"),
            Ok(_) => (),
            Err(err) => tracing::error!(?err, "failed to close expired auctions"),
        }
        match self.vault.settle_expired().await {
            Ok(settled) if settled > 0 => tracing::info!(settled, "settled sealed auctions"),
            Ok(_) => (),
            Err(err) => tracing::error!(?err, "failed to settle sealed auctions"),
        }
        Metrics::get().sweeps.inc();
    }
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "maintenance")]
struct Metrics {
    /// Number of completed maintenance sweeps.
    sweeps: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
