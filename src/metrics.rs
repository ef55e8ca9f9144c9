// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Register descriptions for every enrichment metric (once per process).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "enrich_stage_attempts_total",
            "Capability invocations per stage, retries included."
        );
        describe_counter!(
            "enrich_stage_outcomes_total",
            "Finished stages by outcome (success, partial_success, failed, skipped)."
        );
        describe_histogram!(
            "enrich_stage_duration_ms",
            Unit::Milliseconds,
            "Wall time of one stage for one article."
        );
        describe_counter!("enrich_articles_total", "Articles finished per derived status.");
        describe_counter!(
            "gate_rejections_total",
            "Calls refused by an admission gate because the window budget was spent."
        );
        describe_gauge!(
            "enrich_batch_last_run_ts",
            "Unix timestamp (s) of the last finished batch."
        );
    });
}

/// Prometheus recorder for the binary. The library only talks to the `metrics` facade.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Prometheus exposition text of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
