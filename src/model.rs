// src/model.rs
//! Article data model: raw content (frozen at creation), per-stage results, and the
//! derived article status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::lang::LangCode;
use crate::ports::ErrorKind;

/// Enrichment stages, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Translation,
    Summary,
    Entities,
    Geotagging,
    Speech,
}

impl StageName {
    pub const ALL: [StageName; 5] = [
        StageName::Translation,
        StageName::Summary,
        StageName::Entities,
        StageName::Geotagging,
        StageName::Speech,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Translation => "translation",
            StageName::Summary => "summary",
            StageName::Entities => "entities",
            StageName::Geotagging => "geotagging",
            StageName::Speech => "speech",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    PartialSuccess,
    Failed,
    Skipped,
}

impl StageOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StageOutcome::Success => "success",
            StageOutcome::PartialSuccess => "partial_success",
            StageOutcome::Failed => "failed",
            StageOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Pending,
    PartiallyEnriched,
    FullyEnriched,
    Failed,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 4] = [
        ArticleStatus::Pending,
        ArticleStatus::PartiallyEnriched,
        ArticleStatus::FullyEnriched,
        ArticleStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::PartiallyEnriched => "partially_enriched",
            ArticleStatus::FullyEnriched => "fully_enriched",
            ArticleStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Person,
    Organization,
    Location,
    Date,
    Event,
}

impl EntityCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityCategory::Person => "Person",
            EntityCategory::Organization => "Organization",
            EntityCategory::Location => "Location",
            EntityCategory::Date => "Date",
            EntityCategory::Event => "Event",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// "Lat: 21.1458°N, Long: 79.0882°E"
    pub fn display(&self) -> String {
        let ns = if self.lat >= 0.0 { 'N' } else { 'S' };
        let ew = if self.lon >= 0.0 { 'E' } else { 'W' };
        format!(
            "Lat: {:.4}°{ns}, Long: {:.4}°{ew}",
            self.lat.abs(),
            self.lon.abs()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub category: EntityCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Entity {
    pub fn new(text: impl Into<String>, category: EntityCategory) -> Self {
        Self {
            text: text.into(),
            category,
            normalized: None,
            coordinates: None,
        }
    }
}

/// Opaque handle to synthesized audio (path or URI). Never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(pub String);

impl AudioRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One language's entry under the `translation` stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedText {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StagePayload {
    None,
    Translations(BTreeMap<LangCode, TranslatedText>),
    Summary(String),
    Entities(Vec<Entity>),
    Geotags(Vec<Entity>),
    Audio(BTreeMap<LangCode, AudioRef>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

/// A sub-result that did not make it (one language, one location) without failing the stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageIssue {
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub outcome: StageOutcome,
    pub payload: StagePayload,
    /// Present iff `outcome == Failed`.
    pub error: Option<StageError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<StageIssue>,
    pub attempts: u32,
    /// Assigned on merge; strictly increasing per article.
    #[serde(default)]
    pub revision: u64,
}

impl StageResult {
    pub fn success(stage: StageName, payload: StagePayload, attempts: u32) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Success,
            payload,
            error: None,
            issues: Vec::new(),
            attempts,
            revision: 0,
        }
    }

    pub fn partial(
        stage: StageName,
        payload: StagePayload,
        attempts: u32,
        issues: Vec<StageIssue>,
    ) -> Self {
        Self {
            stage,
            outcome: StageOutcome::PartialSuccess,
            payload,
            error: None,
            issues,
            attempts,
            revision: 0,
        }
    }

    pub fn failed(stage: StageName, kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Failed,
            payload: StagePayload::None,
            error: Some(StageError {
                kind,
                message: message.into(),
            }),
            issues: Vec::new(),
            attempts,
            revision: 0,
        }
    }

    pub fn skipped(stage: StageName) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            payload: StagePayload::None,
            error: None,
            issues: Vec::new(),
            attempts: 0,
            revision: 0,
        }
    }

    pub fn with_issues(mut self, issues: Vec<StageIssue>) -> Self {
        self.issues = issues;
        self
    }
}

/// Canonical working unit. Raw content is private and read-only after creation; the
/// enrichment map is only touched through `record`. Serialize-only; articles come from the
/// builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    id: String,
    source: String,
    url: Option<String>,
    source_language: LangCode,
    title: String,
    body: String,
    published_at: Option<DateTime<Utc>>,
    enrichment: BTreeMap<StageName, StageResult>,
    status: ArticleStatus,
    next_revision: u64,
    #[serde(skip)]
    geotag_partial_counts_as_success: bool,
}

impl Article {
    pub(crate) fn new(
        id: String,
        source: String,
        url: Option<String>,
        source_language: LangCode,
        title: String,
        body: String,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            source,
            url,
            source_language,
            title,
            body,
            published_at,
            enrichment: BTreeMap::new(),
            status: ArticleStatus::Pending,
            next_revision: 1,
            geotag_partial_counts_as_success: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
    pub fn source_language(&self) -> LangCode {
        self.source_language
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn body(&self) -> &str {
        &self.body
    }
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
    pub fn status(&self) -> ArticleStatus {
        self.status
    }

    /// Text that source-language stages operate on: the body, or the title if the
    /// feed carried no body.
    pub fn source_text(&self) -> &str {
        if self.body.is_empty() {
            &self.title
        } else {
            &self.body
        }
    }

    pub fn enrichment(&self) -> &BTreeMap<StageName, StageResult> {
        &self.enrichment
    }

    pub fn stage(&self, stage: StageName) -> Option<&StageResult> {
        self.enrichment.get(&stage)
    }

    pub fn outcome(&self, stage: StageName) -> Option<StageOutcome> {
        self.enrichment.get(&stage).map(|r| r.outcome)
    }

    pub fn summary(&self) -> Option<&str> {
        match self.stage(StageName::Summary).map(|r| &r.payload) {
            Some(StagePayload::Summary(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn translations(&self) -> Option<&BTreeMap<LangCode, TranslatedText>> {
        match self.stage(StageName::Translation).map(|r| &r.payload) {
            Some(StagePayload::Translations(m)) => Some(m),
            _ => None,
        }
    }

    pub fn entities(&self) -> &[Entity] {
        match self.stage(StageName::Entities).map(|r| &r.payload) {
            Some(StagePayload::Entities(v)) => v,
            _ => &[],
        }
    }

    pub fn geotags(&self) -> &[Entity] {
        match self.stage(StageName::Geotagging).map(|r| &r.payload) {
            Some(StagePayload::Geotags(v)) => v,
            _ => &[],
        }
    }

    /// First location that resolved to coordinates.
    pub fn primary_location(&self) -> Option<&Entity> {
        self.geotags().iter().find(|e| e.coordinates.is_some())
    }

    pub fn audio(&self) -> Option<&BTreeMap<LangCode, AudioRef>> {
        match self.stage(StageName::Speech).map(|r| &r.payload) {
            Some(StagePayload::Audio(m)) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn set_geotag_policy(&mut self, partial_counts_as_success: bool) {
        self.geotag_partial_counts_as_success = partial_counts_as_success;
        self.status = self.derive_status();
    }

    /// Merge a stage result. Replaces any earlier result for the same stage (the new one
    /// gets a strictly higher revision) and recomputes status.
    pub(crate) fn record(&mut self, mut result: StageResult) {
        result.revision = self.next_revision;
        self.next_revision += 1;
        self.enrichment.insert(result.stage, result);
        self.status = self.derive_status();
    }

    /// Status over every stage: skipped stages are not configured; a missing result is a
    /// configured stage that was never dispatched.
    fn derive_status(&self) -> ArticleStatus {
        if self.enrichment.is_empty() {
            return ArticleStatus::Pending;
        }

        let mut configured = 0usize;
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut attempted = 0usize;

        for stage in StageName::ALL {
            match self.enrichment.get(&stage).map(|r| r.outcome) {
                Some(StageOutcome::Skipped) => continue,
                None => configured += 1,
                Some(outcome) => {
                    configured += 1;
                    attempted += 1;
                    match outcome {
                        StageOutcome::Success => succeeded += 1,
                        StageOutcome::PartialSuccess
                            if stage == StageName::Geotagging
                                && self.geotag_partial_counts_as_success =>
                        {
                            succeeded += 1
                        }
                        StageOutcome::Failed => failed += 1,
                        _ => {}
                    }
                }
            }
        }

        if succeeded == configured {
            ArticleStatus::FullyEnriched
        } else if failed == configured {
            ArticleStatus::Failed
        } else if attempted == 0 {
            ArticleStatus::Pending
        } else {
            ArticleStatus::PartiallyEnriched
        }
    }
}
