// src/gate.rs
//! Admission gates: the one cross-article coordination point.
//!
//! Each capability gets a single gate shared by every in-flight article. A gate bounds
//! concurrent calls (semaphore) and enforces a call budget per time window. Going over
//! budget is reported as `CapabilityError::RateLimited` so the stage runner treats it as
//! transient and backs off.
//!
//! Gates are plain injectable objects: the orchestrator resets them at batch start when
//! configured with `GateLifecycle::PerBatch`; long-lived gates keep their window across
//! batches.

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::ports::CapabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateLifecycle {
    /// Budget windows restart at the beginning of every batch.
    #[default]
    PerBatch,
    /// Budget windows survive across batches (shared external quota).
    LongLived,
}

/// Held for the duration of one capability call; releases the concurrency slot on drop.
#[derive(Debug)]
pub struct GatePermit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl GatePermit {
    pub fn unbounded() -> Self {
        Self { _slot: None }
    }
}

#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Wait for a concurrency slot, then charge one call against the budget.
    async fn admit(&self) -> Result<GatePermit, CapabilityError>;
    /// Forget the current budget window.
    fn reset(&self);
    fn name(&self) -> &str;
}

/// No throttling at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedGate;

#[async_trait]
impl AdmissionGate for UnlimitedGate {
    async fn admit(&self) -> Result<GatePermit, CapabilityError> {
        Ok(GatePermit::unbounded())
    }
    fn reset(&self) {}
    fn name(&self) -> &str {
        "unlimited"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub calls_per_window: u32,
    pub window: Duration,
}

#[derive(Debug)]
struct WindowCounter {
    started: Instant,
    used: u32,
}

impl WindowCounter {
    fn fresh() -> Self {
        Self {
            started: Instant::now(),
            used: 0,
        }
    }
    fn is_expired(&self, window: Duration) -> bool {
        self.started.elapsed() >= window
    }
}

/// Semaphore for concurrency + fixed-window call counter for the budget.
#[derive(Debug)]
pub struct RateLimitGate {
    name: String,
    budget: RateBudget,
    slots: Arc<Semaphore>,
    counter: Mutex<WindowCounter>,
}

impl RateLimitGate {
    pub fn new(name: impl Into<String>, budget: RateBudget, max_concurrent: usize) -> Self {
        Self {
            name: name.into(),
            budget,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            counter: Mutex::new(WindowCounter::fresh()),
        }
    }

    /// Calls still available in the current window.
    pub fn remaining(&self) -> u32 {
        let g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        if g.is_expired(self.budget.window) {
            self.budget.calls_per_window
        } else {
            self.budget.calls_per_window.saturating_sub(g.used)
        }
    }

    fn charge(&self) -> Result<(), CapabilityError> {
        let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        if g.is_expired(self.budget.window) {
            *g = WindowCounter::fresh();
        }
        if g.used >= self.budget.calls_per_window {
            return Err(CapabilityError::RateLimited(self.name.clone()));
        }
        g.used = g.used.saturating_add(1);
        Ok(())
    }
}

#[async_trait]
impl AdmissionGate for RateLimitGate {
    async fn admit(&self) -> Result<GatePermit, CapabilityError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| CapabilityError::ServiceUnavailable(format!("{} gate closed", self.name)))?;

        if let Err(e) = self.charge() {
            counter!("gate_rejections_total", "capability" => self.name.clone()).increment(1);
            tracing::debug!(target: "gate", gate = %self.name, "call budget exhausted");
            return Err(e);
        }
        Ok(GatePermit { _slot: Some(slot) })
    }

    fn reset(&self) {
        let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        *g = WindowCounter::fresh();
    }

    fn name(&self) -> &str {
        &self.name
    }
}
