// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<Metrics> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the tagging series.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("tagging_calls_total", "Tagging calls that ran the matchers");
        describe_histogram!("tagging_duration_ms", "Tagging call latency in milliseconds");
        describe_counter!("tagging_cache_hits_total", "Tagging result cache hits");
        describe_counter!("tagging_cache_misses_total", "Tagging result cache misses");
        describe_counter!("tagging_reloads_total", "Rule reloads by outcome");
        describe_gauge!("tagging_rules_active", "Rules in the active snapshot");
        describe_counter!("tagging_cache_pruned_total", "Expired cache entries dropped by housekeeping");
        describe_counter!("tagging_catalog_errors_total", "Catalog fetches that failed at the transport level");
        describe_histogram!("tagging_catalog_fetch_ms", "Catalog fetch latency in milliseconds");
        describe_counter!("tagging_sync_failures_total", "Rule syncs where every source failed");

        Ok(Self { handle })
    }

    /// Process-wide instance; the recorder can only be installed once.
    pub fn global() -> anyhow::Result<&'static Metrics> {
        GLOBAL.get_or_try_init(Self::init)
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
