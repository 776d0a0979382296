use {
    axum::{Router, extract::State, http::StatusCode, routing::get},
    prometheus::Encoder,
    std::{collections::HashMap, sync::Arc, sync::OnceLock},
};

/// Global metrics registry used by all components.
static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Configure the global metrics registry.
///
/// This function allows specifying a common prefix that will be added to all
/// metric names, as well as common labels. It can be called at most once,
/// before any call to [`get_storage_registry`], ideally at the very beginning
/// of `main`.
///
/// # Panics
///
/// Panics if called twice, after any call to [`get_storage_registry`], or if
/// the registry configuration is invalid.
pub fn setup_registry(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).unwrap();
}

/// Like [`setup_registry`], but can be called multiple times in a row.
/// Later calls are ignored.
///
/// Useful for tests.
pub fn setup_registry_reentrant(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).ok();
}

/// Get the global instance of the metrics registry.
pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}

/// Get the global instance of the metric storage registry.
///
/// If the registry was not configured with [`setup_registry`] it is
/// initialized with a default value; panicking instead would make unit tests
/// miserable since there is no hook to run setup before every test.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

pub fn encode(registry: &prometheus::Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub const DEFAULT_METRICS_PORT: u16 = 9586;

#[async_trait::async_trait]
pub trait LivenessChecking: Send + Sync {
    async fn is_alive(&self) -> bool;
}

/// Router exposing encoded prometheus data and a liveness probe for the
/// monitoring system.
pub fn metrics_router(liveness: Arc<dyn LivenessChecking>) -> Router {
    async fn metrics_handler() -> String {
        encode(get_registry())
    }

    async fn liveness_handler(State(liveness): State<Arc<dyn LivenessChecking>>) -> StatusCode {
        if liveness.is_alive().await {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/liveness", get(liveness_handler).with_state(liveness))
}
