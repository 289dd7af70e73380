// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics of the sync engine and the `/metrics` endpoint.
//!
//! - `lifecycle_mgr_purgectrl_time` - duration of the last purge in seconds
//! - `lifecycle_mgr_purgectrl_requests_total` - number of purges performed
//! - `lifecycle_mgr_purgectrl_error` - purge failures per Kyma and category
//! - `lifecycle_mgr_crd_cache_size` - control-plane CRDs held in memory
//! - `lifecycle_mgr_skr_client_cache_size` - cached target clients

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static PURGE_TIME: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new(
        "lifecycle_mgr_purgectrl_time",
        "Duration of the last purge in seconds",
    )
    .expect("Failed to create PURGE_TIME metric - this should never happen")
});

static PURGE_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "lifecycle_mgr_purgectrl_requests_total",
        "Total number of purges",
    )
    .expect("Failed to create PURGE_REQUESTS metric - this should never happen")
});

static PURGE_ERRORS: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        Opts::new(
            "lifecycle_mgr_purgectrl_error",
            "Purge failures by Kyma and category",
        ),
        &["kyma", "category"],
    )
    .expect("Failed to create PURGE_ERRORS metric - this should never happen")
});

static CRD_CACHE_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "lifecycle_mgr_crd_cache_size",
        "Number of control-plane CRDs held in memory",
    )
    .expect("Failed to create CRD_CACHE_SIZE metric - this should never happen")
});

static CLIENT_CACHE_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "lifecycle_mgr_skr_client_cache_size",
        "Number of cached target clients",
    )
    .expect("Failed to create CLIENT_CACHE_SIZE metric - this should never happen")
});

/// Category label of a purge failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeErrorCategory {
    FinalizerRemoval,
    Cleanup,
}

impl PurgeErrorCategory {
    fn as_str(self) -> &'static str {
        match self {
            PurgeErrorCategory::FinalizerRemoval => "finalizer_removal",
            PurgeErrorCategory::Cleanup => "cleanup",
        }
    }
}

/// Register all metrics with the registry. Call once at startup.
pub fn register_metrics() -> anyhow::Result<()> {
    REGISTRY.register(Box::new(PURGE_TIME.clone()))?;
    REGISTRY.register(Box::new(PURGE_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(PURGE_ERRORS.clone()))?;
    REGISTRY.register(Box::new(CRD_CACHE_SIZE.clone()))?;
    REGISTRY.register(Box::new(CLIENT_CACHE_SIZE.clone()))?;
    Ok(())
}

pub fn count_purge() {
    PURGE_REQUESTS.inc();
}

pub fn record_purge_time(duration: Duration) {
    PURGE_TIME.set(duration.as_secs_f64());
}

pub fn set_purge_error(kyma: &str, category: PurgeErrorCategory) {
    PURGE_ERRORS
        .with_label_values(&[kyma, category.as_str()])
        .set(1.0);
}

fn clear_purge_error(kyma: &str, category: PurgeErrorCategory) {
    let _ = PURGE_ERRORS.remove_label_values(&[kyma, category.as_str()]);
}

pub fn clear_purge_errors(kyma: &str) {
    for category in [PurgeErrorCategory::FinalizerRemoval, PurgeErrorCategory::Cleanup] {
        clear_purge_error(kyma, category);
    }
}

pub fn set_crd_cache_size(size: usize) {
    CRD_CACHE_SIZE.set(size as i64);
}

pub fn set_client_cache_size(size: usize) {
    CLIENT_CACHE_SIZE.set(size as i64);
}

/// Serve `/metrics` and `/healthz` until the listener fails
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }));

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {}", e).into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_error_labels() {
        set_purge_error("kyma-metrics-test", PurgeErrorCategory::Cleanup);
        assert_eq!(
            PURGE_ERRORS
                .with_label_values(&["kyma-metrics-test", "cleanup"])
                .get(),
            1.0
        );

        clear_purge_errors("kyma-metrics-test");
        assert_eq!(
            PURGE_ERRORS
                .with_label_values(&["kyma-metrics-test", "cleanup"])
                .get(),
            0.0
        );
    }

    #[test]
    fn test_purge_count_and_time() {
        let before = PURGE_REQUESTS.get();
        count_purge();
        record_purge_time(Duration::from_millis(1500));
        assert!(PURGE_REQUESTS.get() > before);
        assert!(PURGE_TIME.get() > 0.0);
    }
}
