// tests/gate_sharing.rs
// One admission gate per capability, shared by every article in flight.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use hyperlocal_news::gate::{AdmissionGate, GateLifecycle, RateBudget, RateLimitGate};
use hyperlocal_news::ports::{Gated, Summarizer};
use hyperlocal_news::{
    ArticleBuilder, CancelSignal, EnrichmentBatchResult, ErrorKind, LangCode, LanguageSet,
    Orchestrator, OrchestratorConfig, StageName, StageOutcome, StagePolicies,
};

fn summarize_budget_of_two() -> Arc<RateLimitGate> {
    Arc::new(RateLimitGate::new(
        "summarize",
        RateBudget {
            calls_per_window: 2,
            window: Duration::from_secs(3600),
        },
        4,
    ))
}

fn orchestrator(fakes: &Fakes, gate: Arc<RateLimitGate>, lifecycle: GateLifecycle) -> Orchestrator {
    let summarizer: Arc<dyn Summarizer> = fakes.summarizer.clone();
    let gate: Arc<dyn AdmissionGate> = gate;
    let caps = fakes.caps().with_summarizer(Gated::new(summarizer, gate));
    Orchestrator::new(
        caps,
        StagePolicies::uniform(fast_policy(1)),
        OrchestratorConfig {
            gate_lifecycle: lifecycle,
            ..OrchestratorConfig::default()
        },
    )
}

async fn three_articles(orch: &Orchestrator) -> EnrichmentBatchResult {
    let targets: LanguageSet = [LangCode::Mr].into_iter().collect();
    orch.process_raw(
        vec![item(1), item(2), item(3)],
        &ArticleBuilder::default(),
        None,
        &targets,
        &CancelSignal::new(),
    )
    .await
}

fn summary_outcomes(batch: &EnrichmentBatchResult) -> (usize, usize) {
    let mut ok = 0;
    let mut limited = 0;
    for a in batch.articles() {
        let s = a.stage(StageName::Summary).unwrap();
        match s.outcome {
            StageOutcome::Success => ok += 1,
            StageOutcome::Failed => {
                assert_eq!(s.error.as_ref().unwrap().kind, ErrorKind::RateLimited);
                limited += 1;
            }
            other => panic!("unexpected summary outcome {other:?}"),
        }
    }
    (ok, limited)
}

#[tokio::test]
async fn budget_is_shared_across_articles() {
    let fakes = Fakes::healthy();
    let gate = summarize_budget_of_two();
    let orch = orchestrator(&fakes, gate.clone(), GateLifecycle::PerBatch);

    let batch = three_articles(&orch).await;

    assert_eq!(summary_outcomes(&batch), (2, 1));
    // The gate refused before the port was reached.
    assert_eq!(fakes.summarizer.script.calls(), 2);
    assert_eq!(gate.remaining(), 0);
}

#[tokio::test]
async fn per_batch_gates_start_each_batch_fresh() {
    let fakes = Fakes::healthy();
    let orch = orchestrator(&fakes, summarize_budget_of_two(), GateLifecycle::PerBatch);

    assert_eq!(summary_outcomes(&three_articles(&orch).await), (2, 1));
    assert_eq!(summary_outcomes(&three_articles(&orch).await), (2, 1));
    assert_eq!(fakes.summarizer.script.calls(), 4);
}

#[tokio::test]
async fn long_lived_gates_keep_their_window() {
    let fakes = Fakes::healthy();
    let orch = orchestrator(&fakes, summarize_budget_of_two(), GateLifecycle::LongLived);

    assert_eq!(summary_outcomes(&three_articles(&orch).await), (2, 1));
    assert_eq!(summary_outcomes(&three_articles(&orch).await), (0, 3));
    assert_eq!(fakes.summarizer.script.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn queueing_on_a_single_slot_does_not_time_out() {
    let fakes = Fakes::healthy().with_summarizer(Behavior::Delay(Duration::from_millis(600)));
    let one_slot = Arc::new(RateLimitGate::new(
        "summarize",
        RateBudget {
            calls_per_window: 100,
            window: Duration::from_secs(3600),
        },
        1,
    ));
    let orch = orchestrator(&fakes, one_slot, GateLifecycle::PerBatch);

    let batch = three_articles(&orch).await;

    // Each call takes 600ms of a 1000ms timeout; the third waits 1200ms for the slot.
    assert_eq!(summary_outcomes(&batch), (3, 0));
    for a in batch.articles() {
        assert_eq!(a.stage(StageName::Summary).unwrap().attempts, 1);
    }
    assert_eq!(fakes.summarizer.script.calls(), 3);
}
