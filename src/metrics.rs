use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::thread;

use crate::broadcast::BroadcastOutcome;

/// Counters for the send lifecycle and the refresh loop. Cheap to clone;
/// clones share the same series.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub builds: IntCounter,
    pub build_failures: IntCounter,
    pub broadcasts: IntCounterVec,
    pub refreshes: IntCounter,
    pub sync_faults: IntCounter,
    pub confirmed_balance: IntGauge,
    pub refreshing: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        // Prefix metrics with `padawan_` for namespacing.
        let builds = IntCounter::new(
            "padawan_builds_total",
            "Transaction build requests sent to the engine",
        )?;
        let build_failures =
            IntCounter::new("padawan_build_failures_total", "Builds rejected by the engine")?;
        let broadcasts = IntCounterVec::new(
            Opts::new("padawan_broadcasts_total", "Confirmed sends by outcome"),
            &["outcome"],
        )?;
        let refreshes = IntCounter::new(
            "padawan_refreshes_total",
            "Balance refreshes that reached the engine",
        )?;
        let sync_faults =
            IntCounter::new("padawan_sync_faults_total", "Failed balance synchronizations")?;
        let confirmed_balance = IntGauge::new(
            "padawan_confirmed_balance_sats",
            "Last published confirmed balance",
        )?;
        let refreshing =
            IntGauge::new("padawan_refreshing", "1 while a balance refresh is running")?;

        registry.register(Box::new(builds.clone()))?;
        registry.register(Box::new(build_failures.clone()))?;
        registry.register(Box::new(broadcasts.clone()))?;
        registry.register(Box::new(refreshes.clone()))?;
        registry.register(Box::new(sync_faults.clone()))?;
        registry.register(Box::new(confirmed_balance.clone()))?;
        registry.register(Box::new(refreshing.clone()))?;

        Ok(Self {
            registry,
            builds,
            build_failures,
            broadcasts,
            refreshes,
            sync_faults,
            confirmed_balance,
            refreshing,
        })
    }

    pub fn record_broadcast(&self, outcome: &BroadcastOutcome) {
        let label = if outcome.is_success() { "success" } else { "failure" };
        self.broadcasts.with_label_values(&[label]).inc();
    }

    pub fn set_balance(&self, sats: u64) {
        self.confirmed_balance.set(i64::try_from(sats).unwrap_or(i64::MAX));
    }

    /// Text exposition of every registered series.
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Serve the registry over plain HTTP on a background thread.
pub fn serve(cfg: &crate::config::Metrics, metrics: Metrics) -> Result<()> {
    let content_type: tiny_http::Header = "Content-Type: text/plain; version=0.0.4; charset=utf-8"
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid metrics content-type header"))?;

    let bind_addr = cfg.bind.clone();
    thread::spawn(move || {
        let server = match tiny_http::Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(bind = %bind_addr, error = %e, "could not start metrics server");
                return;
            }
        };
        tracing::info!(bind = %bind_addr, "metrics endpoint listening");

        for request in server.incoming_requests() {
            let buffer = match metrics.render() {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = %e, "could not encode metrics");
                    continue;
                }
            };
            let response = tiny_http::Response::from_data(buffer).with_header(content_type.clone());
            let _ = request.respond(response);
        }
    });

    Ok(())
}
