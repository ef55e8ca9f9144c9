// src/ports/mod.rs
//! Capability ports: the only points where enrichment touches the outside world.
//!
//! Every port is a narrow async contract returning typed output or a `CapabilityError`.
//! Concrete adapters live in `http` (remote services) and `local` (offline heuristics).
//! A port that is not configured is simply absent from `Capabilities`; its stage is then
//! recorded as `Skipped`.

pub mod http;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::gate::{AdmissionGate, UnlimitedGate};
use crate::lang::LangCode;
use crate::model::{AudioRef, Coordinates, Entity};

/// Classified failure kinds. Drives retry policy and is recorded in stage results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ServiceUnavailable,
    RateLimited,
    Timeout,
    UnsupportedLanguagePair,
    UnsupportedLanguage,
    NotFound,
    InputTooLong,
    Validation,
    /// Capability panicked or returned something unusable.
    Internal,
    /// A dependency stage produced no usable input.
    DependencyFailed,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::ServiceUnavailable | ErrorKind::RateLimited | ErrorKind::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnsupportedLanguagePair => "unsupported_language_pair",
            ErrorKind::UnsupportedLanguage => "unsupported_language",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InputTooLong => "input_too_long",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
            ErrorKind::DependencyFailed => "dependency_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("unsupported language pair {from}->{to}")]
    UnsupportedLanguagePair { from: LangCode, to: LangCode },

    #[error("unsupported language {0}")]
    UnsupportedLanguage(LangCode),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("input too long: {len} chars (max {max})")]
    InputTooLong { len: usize, max: usize },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("internal capability error: {0}")]
    Internal(String),
}

impl CapabilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CapabilityError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            CapabilityError::RateLimited(_) => ErrorKind::RateLimited,
            CapabilityError::Timeout(_) => ErrorKind::Timeout,
            CapabilityError::UnsupportedLanguagePair { .. } => ErrorKind::UnsupportedLanguagePair,
            CapabilityError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            CapabilityError::NotFound(_) => ErrorKind::NotFound,
            CapabilityError::InputTooLong { .. } => ErrorKind::InputTooLong,
            CapabilityError::Validation(_) => ErrorKind::Validation,
            CapabilityError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

pub type CapResult<T> = Result<T, CapabilityError>;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: LangCode, target: LangCode) -> CapResult<String>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> CapResult<String>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> CapResult<Vec<Entity>>;
    fn name(&self) -> &'static str;
}

/// Resolved location: coordinates plus the service's canonical name, if it gave one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub coordinates: Coordinates,
    pub resolved_name: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, location: &str) -> CapResult<GeoPoint>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, lang: LangCode) -> CapResult<AudioRef>;
    fn name(&self) -> &'static str;
}

/// Identifies a capability (and its admission gate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Translate,
    Summarize,
    ExtractEntities,
    Geocode,
    SynthesizeSpeech,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Translate,
        Capability::Summarize,
        Capability::ExtractEntities,
        Capability::Geocode,
        Capability::SynthesizeSpeech,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Translate => "translate",
            Capability::Summarize => "summarize",
            Capability::ExtractEntities => "extract_entities",
            Capability::Geocode => "geocode",
            Capability::SynthesizeSpeech => "synthesize_speech",
        }
    }
}

/// A port together with the admission gate shared by every article using it.
pub struct Gated<T: ?Sized> {
    pub port: Arc<T>,
    pub gate: Arc<dyn AdmissionGate>,
}

impl<T: ?Sized> Clone for Gated<T> {
    fn clone(&self) -> Self {
        Self {
            port: Arc::clone(&self.port),
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<T: ?Sized> Gated<T> {
    pub fn new(port: Arc<T>, gate: Arc<dyn AdmissionGate>) -> Self {
        Self { port, gate }
    }

    /// Port with no throttling; handy for local adapters and tests.
    pub fn ungated(port: Arc<T>) -> Self {
        Self {
            port,
            gate: Arc::new(UnlimitedGate),
        }
    }
}

/// The set of ports available to one orchestrator. `None` = capability disabled.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub translator: Option<Gated<dyn Translator>>,
    pub summarizer: Option<Gated<dyn Summarizer>>,
    pub extractor: Option<Gated<dyn EntityExtractor>>,
    pub geocoder: Option<Gated<dyn Geocoder>>,
    pub speech: Option<Gated<dyn SpeechSynthesizer>>,
}

impl Capabilities {
    pub fn with_translator(mut self, p: Gated<dyn Translator>) -> Self {
        self.translator = Some(p);
        self
    }

    pub fn with_summarizer(mut self, p: Gated<dyn Summarizer>) -> Self {
        self.summarizer = Some(p);
        self
    }

    pub fn with_extractor(mut self, p: Gated<dyn EntityExtractor>) -> Self {
        self.extractor = Some(p);
        self
    }

    pub fn with_geocoder(mut self, p: Gated<dyn Geocoder>) -> Self {
        self.geocoder = Some(p);
        self
    }

    pub fn with_speech(mut self, p: Gated<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(p);
        self
    }

    /// Every configured gate, keyed by capability.
    pub fn gates(&self) -> Vec<(Capability, Arc<dyn AdmissionGate>)> {
        let mut out = Vec::new();
        if let Some(p) = &self.translator {
            out.push((Capability::Translate, Arc::clone(&p.gate)));
        }
        if let Some(p) = &self.summarizer {
            out.push((Capability::Summarize, Arc::clone(&p.gate)));
        }
        if let Some(p) = &self.extractor {
            out.push((Capability::ExtractEntities, Arc::clone(&p.gate)));
        }
        if let Some(p) = &self.geocoder {
            out.push((Capability::Geocode, Arc::clone(&p.gate)));
        }
        if let Some(p) = &self.speech {
            out.push((Capability::SynthesizeSpeech, Arc::clone(&p.gate)));
        }
        out
    }
}
