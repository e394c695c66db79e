use shuttle_axum::axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const POSTS_SERVED: &str = "feed_posts_served_total";
pub const PAGES_SERVED: &str = "feed_pages_served_total";
pub const SOURCE_FAILURES: &str = "feed_source_failures_total";
pub const GENERATOR_ERRORS: &str = "feed_generator_errors_total";
pub const PAGE_FETCH_MS: &str = "feed_page_fetch_ms";
pub const CONTINUATION_MISSES: &str = "feed_continuation_misses_total";
pub const CONTINUATION_SESSIONS: &str = "feed_continuation_sessions";
pub const CONTINUATION_TTL_SECS: &str = "feed_continuation_ttl_secs";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(POSTS_SERVED, "Posts returned to callers.");
        describe_counter!(PAGES_SERVED, "Feed pages returned to callers.");
        describe_counter!(
            SOURCE_FAILURES,
            "Sources dropped from a request (no generator, first fetch failed or timed out)."
        );
        describe_counter!(GENERATOR_ERRORS, "Page fetch failures inside generators.");
        describe_histogram!(PAGE_FETCH_MS, "Page fetch time per source in milliseconds.");
        describe_counter!(
            CONTINUATION_MISSES,
            "Requests carrying an unknown or expired page token."
        );
        describe_gauge!(CONTINUATION_SESSIONS, "Sessions held by the continuation cache.");
        describe_gauge!(CONTINUATION_TTL_SECS, "Idle TTL of continuation sessions.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the static cache TTL gauge.
    pub fn init(ttl_secs: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;

        ensure_metrics_described();
        gauge!(CONTINUATION_TTL_SECS).set(ttl_secs as f64);

        Ok(Self { handle })
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
