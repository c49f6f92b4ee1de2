//! # Prometheus Metrics
//!
//! Authentication counters, scraped at `/metrics` on the metrics port.
//!
//! Everything is registered in a dedicated [`prometheus::Registry`] with the
//! `nostr_auth` prefix, so nothing collides with the default global registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles shared by the handlers and the sweeper.
#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    pub challenges_issued_total: IntCounter,
    pub logins_succeeded_total: IntCounter,
    pub logins_failed_total: IntCounter,
    pub proofs_succeeded_total: IntCounter,
    pub proofs_failed_total: IntCounter,
    pub links_created_total: IntCounter,
    pub unlinks_total: IntCounter,
    pub challenges_swept_total: IntCounter,
    /// Challenges currently held by the store, consumed ones included.
    pub live_challenges: IntGauge,
    /// Wall time of `POST /auth/login`, account lookup and token issuance
    /// included.
    pub login_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("metric creation");
    registry
        .register(Box::new(c.clone()))
        .expect("metric registration");
    c
}

impl AuthMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("nostr_auth".into()), None)
            .expect("failed to create prometheus registry");

        let challenges_issued_total = counter(
            &registry,
            "challenges_issued_total",
            "Login and link challenges issued",
        );
        let logins_succeeded_total =
            counter(&registry, "logins_succeeded_total", "Successful key logins");
        let logins_failed_total =
            counter(&registry, "logins_failed_total", "Rejected key logins");
        let proofs_succeeded_total = counter(
            &registry,
            "proofs_succeeded_total",
            "Request proofs that verified",
        );
        let proofs_failed_total =
            counter(&registry, "proofs_failed_total", "Request proofs rejected");
        let links_created_total =
            counter(&registry, "links_created_total", "Keys linked to accounts");
        let unlinks_total = counter(&registry, "unlinks_total", "Keys unlinked from accounts");
        let challenges_swept_total = counter(
            &registry,
            "challenges_swept_total",
            "Expired challenges removed by the sweeper",
        );

        let live_challenges = IntGauge::new(
            "live_challenges",
            "Challenges currently held by the store",
        )
        .expect("metric creation");
        registry
            .register(Box::new(live_challenges.clone()))
            .expect("metric registration");

        let login_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("login_latency_seconds", "Login request latency in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(login_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            challenges_issued_total,
            logins_succeeded_total,
            logins_failed_total,
            proofs_succeeded_total,
            proofs_failed_total,
            links_created_total,
            unlinks_total,
            challenges_swept_total,
            live_challenges,
            login_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

pub type SharedMetrics = Arc<AuthMetrics>;

/// Renders `/metrics` in Prometheus text format.
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
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
