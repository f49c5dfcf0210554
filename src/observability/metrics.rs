use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{Arc, OnceLock};
use tracing::info;


// Declare the static OnceLock to hold the Metrics.
static METRICS_INSTANCE: OnceLock<Arc<Metrics>> = OnceLock::new();

/// Initializes on first use and gets a reference to the process-wide `Metrics`.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| {
        info!("Initializing Metrics ...");
        Metrics::new()
    })
}

/// Render every registered metric in the prometheus text format.
pub fn gather_text() -> anyhow::Result<String> {
    let families = get_metrics().registry.gather();
    Ok(TextEncoder::new().encode_to_string(&families)?)
}


#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Update metrics
    pub token_updates: IntCounterVec,
    pub update_failures: IntCounterVec,
    pub suppressed_errors: IntCounter,

    // Expiration metrics
    pub token_expirations: IntCounter,
    pub token_expiry_unix: IntGauge,

    // Notification metrics
    pub events_emitted: IntCounterVec,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("accessmanager".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Update
            token_updates: IntCounterVec::new(Opts::new("token_updates_total", "updateToken calls by outcome"), &["outcome"]).unwrap(),
            update_failures: IntCounterVec::new(Opts::new("token_update_failures_total", "Failed updates by reason"), &["reason"]).unwrap(),
            suppressed_errors: IntCounter::new("token_update_errors_suppressed_total", "Failures of superseded updates that were not reported").unwrap(),

            // Expiration
            token_expirations: IntCounter::new("token_expirations_total", "Expiration timers fired").unwrap(),
            token_expiry_unix: IntGauge::new("token_expiry_unix_seconds", "Expiry of the most recently installed token").unwrap(),

            // Notifications
            events_emitted: IntCounterVec::new(Opts::new("events_emitted_total", "Notifications emitted by kind"), &["kind"]).unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_updates.clone())).unwrap();
        reg.register(Box::new(metrics.update_failures.clone())).unwrap();
        reg.register(Box::new(metrics.suppressed_errors.clone())).unwrap();
        reg.register(Box::new(metrics.token_expirations.clone())).unwrap();
        reg.register(Box::new(metrics.token_expiry_unix.clone())).unwrap();
        reg.register(Box::new(metrics.events_emitted.clone())).unwrap();

        metrics
    }
}


#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::{gather_text, get_metrics};

    #[test]
    #[serial]
    fn text_exposition_contains_namespaced_metrics() {
        get_metrics().token_updates.with_label_values(&["ok"]).inc();
        let text = gather_text().unwrap();
        assert!(text.contains("accessmanager_token_updates_total"), "{text}");
    }
}
