//! # Prometheus Metrics
//!
//! Exposes the state of the hosted deployment as gauges. Scraped by
//! Prometheus at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use valocracy_contracts::Deployment;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Pooled asset units held by the bound treasury.
    pub treasury_total_assets: IntGauge,
    /// Shares outstanding in the bound treasury.
    pub treasury_total_shares: IntGauge,
    /// Holders with a non-zero share balance in the bound treasury.
    pub treasury_holders: IntGauge,
    /// Certificates issued and not burned.
    pub certificates_outstanding: IntGauge,
    /// Sequence of the last committed event.
    pub committed_sequence: IntGauge,
    /// API requests served.
    pub api_requests_total: IntCounter,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Gauges are `i64`; clamp rather than wrap for totals beyond that range.
fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("valocracy".into()), None)?;

        let treasury_total_assets = gauge(
            &registry,
            "treasury_total_assets",
            "Pooled asset units held by the bound treasury",
        )?;
        let treasury_total_shares = gauge(
            &registry,
            "treasury_total_shares",
            "Shares outstanding in the bound treasury",
        )?;
        let treasury_holders = gauge(
            &registry,
            "treasury_holders",
            "Holders with a non-zero share balance in the bound treasury",
        )?;
        let certificates_outstanding = gauge(
            &registry,
            "certificates_outstanding",
            "Certificates issued and not burned",
        )?;
        let committed_sequence = gauge(
            &registry,
            "committed_sequence",
            "Sequence number of the last committed event",
        )?;

        let api_requests_total =
            IntCounter::new("api_requests_total", "Total number of API requests served")?;
        registry.register(Box::new(api_requests_total.clone()))?;

        Ok(Self {
            registry,
            treasury_total_assets,
            treasury_total_shares,
            treasury_holders,
            certificates_outstanding,
            committed_sequence,
            api_requests_total,
        })
    }

    /// Sets every gauge from the current deployment state.
    pub fn observe(&self, deployment: &Deployment) {
        if let Some(address) = deployment.bound_treasury() {
            if let Ok(treasury) = deployment.treasury(address) {
                self.treasury_total_assets
                    .set(clamp(treasury.total_assets(deployment.asset())));
                self.treasury_total_shares
                    .set(clamp(treasury.total_shares()));
                self.treasury_holders
                    .set(clamp(treasury.holder_count() as u64));
            }
        }
        self.certificates_outstanding
            .set(clamp(deployment.valocracy().total_supply()));
        self.committed_sequence.set(clamp(deployment.sequence()));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
