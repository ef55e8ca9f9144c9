// src/orchestrator/mod.rs
//! Enrichment orchestrator: drives the stage plan for every article of a batch.
//!
//! Articles run with bounded parallelism (`max_in_flight`); within one article the plan
//! layers run in order and the steps of a layer run concurrently. Stage results are merged
//! into the article after each layer. A layer is a barrier: geotagging starts only once
//! translation and summarization have finished too, so every step of a layer sees the same
//! merged article and cancellation is checked at one point. Nothing here returns an error: every failure ends up
//! as a `StageResult` and, through it, in the article status.

pub mod cancel;
pub mod plan;
pub(crate) mod stages;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};

use crate::batch::EnrichmentBatchResult;
use crate::gate::GateLifecycle;
use crate::ingest::types::RawFeedItem;
use crate::ingest::ArticleBuilder;
use crate::lang::LanguageSet;
use crate::model::{Article, StageName, StageOutcome};
use crate::ports::Capabilities;
use crate::runner::{self, StagePolicy};

pub use cancel::CancelSignal;
pub use plan::{Step, PIPELINE};

use stages::StageContext;

/// One policy per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagePolicies {
    pub translation: StagePolicy,
    pub summary: StagePolicy,
    pub entities: StagePolicy,
    pub geotagging: StagePolicy,
    pub speech: StagePolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self {
            translation: StagePolicy::default(),
            summary: StagePolicy {
                fallback: true,
                ..StagePolicy::default()
            },
            entities: StagePolicy::default(),
            geotagging: StagePolicy::default(),
            speech: StagePolicy {
                timeout_ms: 30_000,
                ..StagePolicy::default()
            },
        }
    }
}

impl StagePolicies {
    /// The same policy for every stage.
    pub fn uniform(policy: StagePolicy) -> Self {
        Self {
            translation: policy,
            summary: policy,
            entities: policy,
            geotagging: policy,
            speech: policy,
        }
    }

    pub fn for_stage(&self, stage: StageName) -> &StagePolicy {
        match stage {
            StageName::Translation => &self.translation,
            StageName::Summary => &self.summary,
            StageName::Entities => &self.entities,
            StageName::Geotagging => &self.geotagging,
            StageName::Speech => &self.speech,
        }
    }

    pub fn sanitized(self) -> Self {
        Self {
            translation: self.translation.sanitized(),
            summary: self.summary.sanitized(),
            entities: self.entities.sanitized(),
            geotagging: self.geotagging.sanitized(),
            speech: self.speech.sanitized(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_in_flight: usize,
    pub gate_lifecycle: GateLifecycle,
    pub geotag_partial_counts_as_success: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            gate_lifecycle: GateLifecycle::PerBatch,
            geotag_partial_counts_as_success: true,
        }
    }
}

pub struct Orchestrator {
    caps: Capabilities,
    policies: StagePolicies,
    config: OrchestratorConfig,
    /// Dispatch barriers, computed once from `PIPELINE`.
    layers: Vec<Vec<Step>>,
}

impl Orchestrator {
    pub fn new(caps: Capabilities, policies: StagePolicies, config: OrchestratorConfig) -> Self {
        Self {
            caps,
            policies: policies.sanitized(),
            config: OrchestratorConfig {
                max_in_flight: config.max_in_flight.max(1),
                ..config
            },
            layers: plan::layers(&PIPELINE),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn policies(&self) -> &StagePolicies {
        &self.policies
    }

    /// Build articles from raw items, then enrich them. Items the builder rejects (and
    /// duplicates, and anything past `max_total`) are reported as dropped.
    pub async fn process_raw(
        &self,
        items: Vec<RawFeedItem>,
        builder: &ArticleBuilder,
        max_total: Option<usize>,
        targets: &LanguageSet,
        cancel: &CancelSignal,
    ) -> EnrichmentBatchResult {
        let built = builder.build_batch(items, max_total);
        let mut result = self.process(built.articles, targets, cancel).await;
        result.set_dropped(built.dropped);
        result
    }

    /// Enrich a batch. Output keeps input order and holds exactly one entry per article,
    /// including articles never started because the batch was cancelled.
    ///
    /// Articles that already carry results (an earlier pass) are resumed: steps whose stage
    /// already succeeded are not repeated unless one of their dependencies ran again.
    pub async fn process(
        &self,
        articles: Vec<Article>,
        targets: &LanguageSet,
        cancel: &CancelSignal,
    ) -> EnrichmentBatchResult {
        crate::metrics::ensure_described();
        let started = Instant::now();

        if self.config.gate_lifecycle == GateLifecycle::PerBatch {
            for (cap, gate) in self.caps.gates() {
                gate.reset();
                debug!(target: "enrich", capability = cap.as_str(), gate = gate.name(), "gate window reset");
            }
        }

        let ctx = StageContext {
            caps: &self.caps,
            policies: &self.policies,
            targets,
        };
        let total = articles.len();
        info!(
            target: "enrich",
            articles = total,
            targets = ?targets,
            max_in_flight = self.config.max_in_flight,
            "batch started"
        );

        let ctx = &ctx;
        let mut done: Vec<(usize, Article)> = stream::iter(articles.into_iter().enumerate())
            .map(|(idx, article)| async move { (idx, self.enrich_article(article, ctx, cancel).await) })
            .buffer_unordered(self.config.max_in_flight)
            .collect()
            .await;
        done.sort_by_key(|(idx, _)| *idx);
        let articles: Vec<Article> = done.into_iter().map(|(_, a)| a).collect();

        for a in &articles {
            counter!("enrich_articles_total", "status" => a.status().as_str()).increment(1);
        }
        gauge!("enrich_batch_last_run_ts").set(Utc::now().timestamp() as f64);

        let result = EnrichmentBatchResult::new(articles, targets.clone(), cancel.is_cancelled());
        info!(
            target: "enrich",
            total = result.total(),
            cancelled = result.cancelled(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        result
    }

    /// Enrich one article outside of a batch (gates are not reset).
    pub async fn enrich(&self, article: Article, targets: &LanguageSet, cancel: &CancelSignal) -> Article {
        let ctx = StageContext {
            caps: &self.caps,
            policies: &self.policies,
            targets,
        };
        self.enrich_article(article, &ctx, cancel).await
    }

    async fn enrich_article(
        &self,
        mut article: Article,
        ctx: &StageContext<'_>,
        cancel: &CancelSignal,
    ) -> Article {
        article.set_geotag_policy(self.config.geotag_partial_counts_as_success);

        // Steps that produced a fresh result in this pass.
        let mut rerun: HashSet<Step> = HashSet::new();

        for layer in &self.layers {
            if cancel.is_cancelled() {
                debug!(target: "enrich", article = article.id(), "cancelled before dispatch");
                break;
            }

            let due: Vec<Step> = layer
                .iter()
                .copied()
                .filter(|step| {
                    let dep_rerun = step.depends_on().iter().any(|d| rerun.contains(d));
                    dep_rerun || !step.is_satisfied(&article)
                })
                .collect();
            if due.is_empty() {
                continue;
            }

            let snapshot = &article;
            let fresh = &rerun;
            let results = join_all(due.iter().map(|&step| async move {
                let t0 = Instant::now();
                let res = stages::execute(step, snapshot, ctx, fresh).await;
                (step, res, t0)
            }))
            .await;

            for (step, res, t0) in results {
                let Some(res) = res else { continue };
                runner::observe(&res, t0);
                debug!(
                    target: "enrich",
                    article = article.id(),
                    step = step.as_str(),
                    outcome = res.outcome.as_str(),
                    attempts = res.attempts,
                    "step finished"
                );
                // A skipped stage hands nothing new to its dependents.
                if res.outcome != StageOutcome::Skipped {
                    rerun.insert(step);
                }
                article.record(res);
            }
        }

        info!(
            target: "enrich",
            article = article.id(),
            status = article.status().as_str(),
            "article finished"
        );
        article
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::LangCode;
    use crate::ports::local::{GazetteerGeocoder, LeadSummarizer, PatternEntityExtractor};
    use crate::ports::Gated;
    use crate::model::ArticleStatus;
    use std::sync::Arc;

    fn local_caps() -> Capabilities {
        Capabilities::default()
            .with_summarizer(Gated::ungated(Arc::new(LeadSummarizer {
                max_chars: 40,
                max_input_chars: 10_000,
            })))
            .with_extractor(Gated::ungated(Arc::new(PatternEntityExtractor::builtin())))
            .with_geocoder(Gated::ungated(Arc::new(GazetteerGeocoder)))
    }

    fn raw(title: &str, body: &str) -> RawFeedItem {
        RawFeedItem {
            source: "Lokmat Nagpur".into(),
            language: Some("en".into()),
            title: title.into(),
            body: body.into(),
            url: Some(format!("https://lokmat.test/{}", title.len())),
            ..Default::default()
        }
    }

    #[test]
    fn summary_policy_falls_back_by_default() {
        let p = StagePolicies::default();
        assert!(p.for_stage(StageName::Summary).fallback);
        assert!(!p.for_stage(StageName::Translation).fallback);
    }

    #[tokio::test]
    async fn local_adapters_enrich_without_translation_or_speech() {
        let orch = Orchestrator::new(local_caps(), StagePolicies::default(), OrchestratorConfig::default());
        let targets: LanguageSet = [LangCode::Mr].into_iter().collect();
        let batch = orch
            .process_raw(
                vec![
                    raw(
                        "NMC launches drive",
                        "Nagpur Municipal Corporation launches waste segregation drive in ward 12. Residents were asked to sort waste.",
                    ),
                    raw("", ""),
                ],
                &ArticleBuilder::default(),
                None,
                &targets,
                &CancelSignal::new(),
            )
            .await;

        assert_eq!(batch.total(), 1);
        assert_eq!(batch.dropped().len(), 1);
        let a = &batch.articles()[0];
        assert_eq!(a.outcome(StageName::Translation), Some(StageOutcome::Skipped));
        assert_eq!(a.outcome(StageName::Speech), Some(StageOutcome::Skipped));
        assert_eq!(a.status(), ArticleStatus::FullyEnriched);
        let loc = a.primary_location().unwrap();
        assert_eq!(loc.text, "Nagpur");
    }

    #[tokio::test]
    async fn default_offline_summary_is_shorter_than_the_body() {
        let caps = local_caps().with_summarizer(Gated::ungated(Arc::new(LeadSummarizer::default())));
        let orch = Orchestrator::new(caps, StagePolicies::default(), OrchestratorConfig::default());
        let body = "Nagpur Municipal Corporation launches waste segregation drive in ward 12.";
        let batch = orch
            .process_raw(
                vec![raw("NMC launches drive", body)],
                &ArticleBuilder::default(),
                None,
                &LanguageSet::new(),
                &CancelSignal::new(),
            )
            .await;
        let a = &batch.articles()[0];
        assert_eq!(a.outcome(StageName::Summary), Some(StageOutcome::Success));
        let summary = a.summary().unwrap();
        assert!(!summary.is_empty());
        assert!(summary.chars().count() < body.chars().count());
    }

    #[tokio::test]
    async fn cancelled_before_start_leaves_articles_pending() {
        let orch = Orchestrator::new(local_caps(), StagePolicies::default(), OrchestratorConfig::default());
        let cancel = CancelSignal::new();
        cancel.cancel();
        let batch = orch
            .process_raw(
                vec![raw("Water cut", "Water supply cut in Nagpur on Friday.")],
                &ArticleBuilder::default(),
                None,
                &LanguageSet::new(),
                &cancel,
            )
            .await;
        assert!(batch.cancelled());
        assert_eq!(batch.total(), 1);
        assert_eq!(batch.articles()[0].status(), ArticleStatus::Pending);
        assert!(batch.articles()[0].enrichment().is_empty());
    }
}
