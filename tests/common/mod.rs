// tests/common/mod.rs
// Scripted capability fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyperlocal_news::model::{AudioRef, Coordinates, Entity, EntityCategory};
use hyperlocal_news::orchestrator::CancelSignal;
use hyperlocal_news::ports::{
    CapResult, CapabilityError, Capabilities, EntityExtractor, GeoPoint, Geocoder, Gated,
    SpeechSynthesizer, Summarizer, Translator,
};
use hyperlocal_news::{LangCode, RawFeedItem, StagePolicy};

pub const NMC_BODY: &str =
    "Nagpur Municipal Corporation launches waste segregation drive in ward 12.";
pub const NMC_SUMMARY: &str = "NMC starts waste segregation in ward 12.";

/// What a fake does on each call.
#[derive(Debug, Clone)]
pub enum Behavior {
    Ok,
    Always(CapabilityError),
    /// Fail the first N calls, then succeed.
    FailFirst(u32, CapabilityError),
    Panic,
    /// Succeed after a (virtual) delay.
    Delay(Duration),
    /// Succeed, but raise the cancel flag first.
    CancelThenOk(CancelSignal),
}

/// Calls currently suspended inside a fake, and the most seen at once.
#[derive(Debug, Default)]
pub struct InFlight {
    now: AtomicU32,
    peak: AtomicU32,
}

impl InFlight {
    pub fn peak(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let n = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(n, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.now.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct Script {
    behavior: Behavior,
    calls: AtomicU32,
    pub in_flight: InFlight,
}

impl Script {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicU32::new(0),
            in_flight: InFlight::default(),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn step(&self) -> CapResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            Behavior::Ok => Ok(()),
            Behavior::Always(e) => Err(e.clone()),
            Behavior::FailFirst(k, e) if n <= *k => Err(e.clone()),
            Behavior::FailFirst(..) => Ok(()),
            Behavior::Panic => panic!("capability blew up"),
            Behavior::Delay(d) => {
                self.in_flight.enter();
                tokio::time::sleep(*d).await;
                self.in_flight.exit();
                Ok(())
            }
            Behavior::CancelThenOk(c) => {
                c.cancel();
                Ok(())
            }
        }
    }
}

pub struct FakeTranslator(pub Script);

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, _source: LangCode, target: LangCode) -> CapResult<String> {
        self.0.step().await?;
        Ok(format!("[{}] {}", target.code(), text))
    }
    fn name(&self) -> &'static str {
        "fake-translator"
    }
}

pub struct FakeSummarizer {
    pub script: Script,
    pub summary: String,
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, _text: &str) -> CapResult<String> {
        self.script.step().await?;
        Ok(self.summary.clone())
    }
    fn name(&self) -> &'static str {
        "fake-summarizer"
    }
}

pub struct FakeExtractor {
    pub script: Script,
    pub entities: Vec<Entity>,
}

#[async_trait]
impl EntityExtractor for FakeExtractor {
    async fn extract(&self, _text: &str) -> CapResult<Vec<Entity>> {
        self.script.step().await?;
        Ok(self.entities.clone())
    }
    fn name(&self) -> &'static str {
        "fake-extractor"
    }
}

/// Knows a handful of places; everything else is `NotFound`.
pub struct FakeGeocoder(pub Script);

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, location: &str) -> CapResult<GeoPoint> {
        self.0.step().await?;
        let (lat, lon) = match location {
            "Nagpur" => (21.1458, 79.0882),
            "Pune" => (18.5204, 73.8567),
            other => return Err(CapabilityError::NotFound(other.to_string())),
        };
        Ok(GeoPoint {
            coordinates: Coordinates { lat, lon },
            resolved_name: Some(format!("{location}, India")),
        })
    }
    fn name(&self) -> &'static str {
        "fake-geocoder"
    }
}

pub struct FakeSpeech {
    pub script: Script,
    pub unsupported: Vec<LangCode>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, _text: &str, lang: LangCode) -> CapResult<AudioRef> {
        self.script.step().await?;
        if self.unsupported.contains(&lang) {
            return Err(CapabilityError::UnsupportedLanguage(lang));
        }
        Ok(AudioRef(format!("audio/{}.mp3", lang.code())))
    }
    fn name(&self) -> &'static str {
        "fake-speech"
    }
}

/// One fake per port, kept as `Arc`s so tests can read call counters afterwards.
pub struct Fakes {
    pub translator: Arc<FakeTranslator>,
    pub summarizer: Arc<FakeSummarizer>,
    pub extractor: Arc<FakeExtractor>,
    pub geocoder: Arc<FakeGeocoder>,
    pub speech: Arc<FakeSpeech>,
}

impl Fakes {
    /// Every port succeeds; the extractor reports the NMC entities.
    pub fn healthy() -> Self {
        Self {
            translator: Arc::new(FakeTranslator(Script::new(Behavior::Ok))),
            summarizer: Arc::new(FakeSummarizer {
                script: Script::new(Behavior::Ok),
                summary: NMC_SUMMARY.to_string(),
            }),
            extractor: Arc::new(FakeExtractor {
                script: Script::new(Behavior::Ok),
                entities: nmc_entities(),
            }),
            geocoder: Arc::new(FakeGeocoder(Script::new(Behavior::Ok))),
            speech: Arc::new(FakeSpeech {
                script: Script::new(Behavior::Ok),
                unsupported: Vec::new(),
            }),
        }
    }

    pub fn with_translator(mut self, b: Behavior) -> Self {
        self.translator = Arc::new(FakeTranslator(Script::new(b)));
        self
    }

    pub fn with_summarizer(mut self, b: Behavior) -> Self {
        self.summarizer = Arc::new(FakeSummarizer {
            script: Script::new(b),
            summary: NMC_SUMMARY.to_string(),
        });
        self
    }

    pub fn with_extractor(mut self, b: Behavior) -> Self {
        self.extractor = Arc::new(FakeExtractor {
            script: Script::new(b),
            entities: nmc_entities(),
        });
        self
    }

    pub fn with_speech(mut self, b: Behavior) -> Self {
        self.speech = Arc::new(FakeSpeech {
            script: Script::new(b),
            unsupported: Vec::new(),
        });
        self
    }

    /// Ungated capabilities backed by these fakes.
    pub fn caps(&self) -> Capabilities {
        let translator: Arc<dyn Translator> = self.translator.clone();
        let summarizer: Arc<dyn Summarizer> = self.summarizer.clone();
        let extractor: Arc<dyn EntityExtractor> = self.extractor.clone();
        let geocoder: Arc<dyn Geocoder> = self.geocoder.clone();
        let speech: Arc<dyn SpeechSynthesizer> = self.speech.clone();
        Capabilities::default()
            .with_translator(Gated::ungated(translator))
            .with_summarizer(Gated::ungated(summarizer))
            .with_extractor(Gated::ungated(extractor))
            .with_geocoder(Gated::ungated(geocoder))
            .with_speech(Gated::ungated(speech))
    }
}

pub fn nmc_entities() -> Vec<Entity> {
    vec![
        Entity::new("Nagpur Municipal Corporation", EntityCategory::Organization),
        Entity::new("Nagpur", EntityCategory::Location),
    ]
}

pub fn nmc_item() -> RawFeedItem {
    RawFeedItem {
        source: "Lokmat Nagpur".into(),
        language: Some("en".into()),
        title: "NMC launches drive".into(),
        body: NMC_BODY.into(),
        published: Some("2025-10-06T04:30:00Z".into()),
        url: Some("https://lokmat.test/nmc-drive".into()),
    }
}

pub fn item(n: u32) -> RawFeedItem {
    RawFeedItem {
        source: "Hitavada".into(),
        language: Some("en".into()),
        title: format!("Ward {n} water supply update"),
        body: format!("Nagpur Municipal Corporation restores water supply in ward {n} after repairs."),
        published: Some(format!("2025-10-{:02}T06:00:00Z", n.clamp(1, 28))),
        url: Some(format!("https://hitavada.test/{n}")),
    }
}

/// Fast policy for every stage: short backoff, no fallback.
pub fn fast_policy(max_attempts: u32) -> StagePolicy {
    StagePolicy {
        timeout_ms: 1_000,
        max_attempts,
        backoff_base_ms: 10,
        backoff_max_ms: 40,
        fallback: false,
    }
}
