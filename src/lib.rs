// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod batch;
pub mod bootstrap;
pub mod config;
pub mod gate;
pub mod ingest;
pub mod lang;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod ports;
pub mod report;
pub mod runner;

// ---- Re-exports for stable public API ----
pub use crate::batch::{BatchStats, EnrichmentBatchResult};
pub use crate::ingest::types::{FeedSource, JsonFileFeed, RawFeedItem};
pub use crate::ingest::{ArticleBuilder, DroppedItem, ValidationError};
pub use crate::lang::{LangCode, LanguageSet};
pub use crate::model::{Article, ArticleStatus, StageName, StageOutcome, StageResult};
pub use crate::orchestrator::{CancelSignal, Orchestrator, OrchestratorConfig, StagePolicies};
pub use crate::ports::{CapabilityError, Capabilities, ErrorKind};
pub use crate::report::{ReportAggregator, ReportDocument, ReportFormat};
pub use crate::runner::StagePolicy;
