// src/telemetry.rs
//! Logging and metrics setup shared by the binary and tests.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "newsdesk=info,warn";

/// Register help text for every series the crate emits.
pub fn describe_metrics() {
    describe_counter!("newsdesk_cache_hits_total", "Fetches answered from the article cache.");
    describe_counter!(
        "newsdesk_cache_misses_total",
        "Fetches that had to load (one per single-flight leader)."
    );
    describe_counter!(
        "newsdesk_fetch_coalesced_total",
        "Callers that joined an in-flight fetch instead of starting one."
    );
    describe_counter!(
        "newsdesk_stale_puts_total",
        "Cache writes discarded because their generation was superseded."
    );
    describe_counter!("newsdesk_adapter_errors_total", "Adapter failures and timeouts.");
    describe_counter!(
        "newsdesk_adapter_results_total",
        "Raw records accepted from the adapter chain."
    );
    describe_counter!("newsdesk_upstream_status_total", "Non-2xx answers from search backends.");
    describe_counter!(
        "newsdesk_normalize_failures_total",
        "Model calls that failed or returned no usable JSON array."
    );
    describe_counter!("newsdesk_fallback_total", "Loads that fell back to raw-record mapping.");
    describe_histogram!("newsdesk_fetch_ms", "End-to-end fetch latency in milliseconds.");
    describe_histogram!("newsdesk_adapter_ms", "Per-adapter call latency in milliseconds.");
    describe_histogram!("newsdesk_model_ms", "Model call latency in milliseconds.");
    describe_histogram!("newsdesk_parse_ms", "Feed parse time in milliseconds.");
}

/// One-time variant of [`describe_metrics`].
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_metrics);
}

/// Install the global Prometheus recorder and describe all series.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing prometheus recorder")?;
    describe_metrics();
    Ok(handle)
}

/// Load `.env`, then install a compact fmt subscriber filtered by `RUST_LOG`
/// (default `newsdesk=info,warn`). Safe to call twice.
pub fn init_tracing() {
    let _ = dotenvy::dotenv();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("NEWSDESK_LOG_JSON").is_ok_and(|v| v == "1");
    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
