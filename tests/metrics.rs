// tests/metrics.rs
// Installs the global Prometheus recorder, so this file holds a single test.

mod common;

use common::*;
use hyperlocal_news::metrics::Metrics;
use hyperlocal_news::{
    ArticleBuilder, CancelSignal, LangCode, LanguageSet, Orchestrator, OrchestratorConfig,
    StagePolicies,
};

#[tokio::test]
async fn batch_run_exposes_expected_series() {
    let metrics = Metrics::init().expect("recorder installs once per test binary");

    let fakes = Fakes::healthy();
    let orch = Orchestrator::new(fakes.caps(), StagePolicies::default(), OrchestratorConfig::default());
    let targets: LanguageSet = [LangCode::Mr].into_iter().collect();
    let batch = orch
        .process_raw(
            vec![nmc_item(), item(2)],
            &ArticleBuilder::default(),
            None,
            &targets,
            &CancelSignal::new(),
        )
        .await;
    assert_eq!(batch.total(), 2);

    let text = metrics.render();
    for needle in [
        "enrich_stage_attempts_total",
        "enrich_stage_outcomes_total",
        "enrich_stage_duration_ms",
        "enrich_articles_total",
        "enrich_batch_last_run_ts",
        "ingest_built_total",
    ] {
        assert!(text.contains(needle), "missing {needle} in:\n{text}");
    }
    assert!(text.contains(r#"status="fully_enriched""#));
    assert!(text.contains(r#"stage="translation""#));
}
