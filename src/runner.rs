// src/runner.rs
//! Stage runner: wraps capability calls with admission, timeout, retry and isolation.
//!
//! `invoke` is the per-call primitive (multi-call stages such as translation use it once
//! per language); `run` turns one call into a complete `StageResult`, applying the stage's
//! fallback payload when allowed. Neither ever returns an error or lets a panic escape.

use futures::FutureExt;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::gate::AdmissionGate;
use crate::model::{StageIssue, StageName, StagePayload, StageResult};
use crate::ports::{CapResult, CapabilityError};

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}

/// Per-stage timeout/retry/degradation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePolicy {
    /// Maximum duration of one capability call. Time spent waiting at the gate is not counted.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total attempts for transient failures (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Use the stage's fallback payload (if it has one) when every attempt failed.
    #[serde(default)]
    pub fallback: bool,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            fallback: false,
        }
    }
}

impl StagePolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay after the `attempt`-th failure (1-based): base * 2^(attempt-1), capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    pub fn sanitized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        self.timeout_ms = self.timeout_ms.max(1);
        if self.backoff_max_ms < self.backoff_base_ms {
            self.backoff_max_ms = self.backoff_base_ms;
        }
        self
    }
}

/// Result of one logical capability call after retries.
#[derive(Debug)]
pub struct Invocation<T> {
    pub result: CapResult<T>,
    pub attempts: u32,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "capability panicked".to_string()
    }
}

/// Call a capability under `policy`: admit through `gate`, bound by timeout, retry
/// transient failures with exponential backoff, convert panics into `Internal`.
pub async fn invoke<T, F, Fut>(
    stage: StageName,
    gate: &dyn AdmissionGate,
    policy: &StagePolicy,
    mut call: F,
) -> Invocation<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CapResult<T>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        counter!("enrich_stage_attempts_total", "stage" => stage.as_str()).increment(1);

        // Waiting for a gate slot is queueing, not capability time: only the call is timed.
        let res = match gate.admit().await {
            Ok(_permit) => {
                let attempt = AssertUnwindSafe(call()).catch_unwind();
                match tokio::time::timeout(policy.timeout(), attempt).await {
                    Ok(Ok(r)) => r,
                    Ok(Err(panic)) => {
                        Err(CapabilityError::Internal(panic_message(panic.as_ref())))
                    }
                    Err(_) => Err(CapabilityError::Timeout(policy.timeout_ms)),
                }
            }
            Err(e) => Err(e),
        };

        match res {
            Ok(v) => {
                return Invocation {
                    result: Ok(v),
                    attempts,
                }
            }
            Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                let delay = policy.backoff_for(attempts);
                warn!(
                    target: "runner",
                    stage = stage.as_str(),
                    attempt = attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient capability failure, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!(
                    target: "runner",
                    stage = stage.as_str(),
                    attempts,
                    kind = e.kind().as_str(),
                    "capability call gave up"
                );
                return Invocation {
                    result: Err(e),
                    attempts,
                };
            }
        }
    }
}

/// Run a single-call stage to a `StageResult`.
///
/// `fallback` is the degraded payload for this stage, used only when `policy.fallback` is
/// set; the outcome is then `PartialSuccess` with the failure kept as an issue.
pub async fn run<T, F, Fut>(
    stage: StageName,
    gate: &dyn AdmissionGate,
    policy: &StagePolicy,
    call: F,
    to_payload: impl FnOnce(T) -> StagePayload,
    fallback: Option<StagePayload>,
) -> StageResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CapResult<T>>,
{
    let inv = invoke(stage, gate, policy, call).await;
    match inv.result {
        Ok(v) => StageResult::success(stage, to_payload(v), inv.attempts),
        Err(e) => match fallback.filter(|_| policy.fallback) {
            Some(payload) => StageResult::partial(
                stage,
                payload,
                inv.attempts,
                vec![StageIssue {
                    key: stage.as_str().to_string(),
                    kind: e.kind(),
                    message: format!("fallback used: {e}"),
                }],
            ),
            None => StageResult::failed(stage, e.kind(), e.to_string(), inv.attempts),
        },
    }
}

/// Record outcome + duration metrics for a finished stage.
pub fn observe(result: &StageResult, started: Instant) {
    let stage = result.stage.as_str();
    counter!(
        "enrich_stage_outcomes_total",
        "stage" => stage,
        "outcome" => result.outcome.as_str()
    )
    .increment(1);
    histogram!("enrich_stage_duration_ms", "stage" => stage)
        .record(started.elapsed().as_secs_f64() * 1000.0);
}
