// src/bootstrap.rs
//! Wires configuration into a ready-to-run orchestrator: one adapter and one shared
//! admission gate per enabled capability.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::batch::EnrichmentBatchResult;
use crate::config::{EnricherConfig, PortConfig};
use crate::ingest::types::RawFeedItem;
use crate::ingest::ArticleBuilder;
use crate::lang::LanguageSet;
use crate::orchestrator::{CancelSignal, Orchestrator};
use crate::ports::http::{
    HttpCapabilityClient, HttpEntityExtractor, HttpGeocoder, HttpSpeechSynthesizer,
    HttpSummarizer, HttpTranslator,
};
use crate::ports::local::{GazetteerGeocoder, LeadSummarizer, PatternEntityExtractor};
use crate::ports::{Capabilities, Capability, Gated};

fn http_client(cap: Capability, port: &PortConfig, endpoint: &str) -> Result<HttpCapabilityClient> {
    HttpCapabilityClient::new(
        cap.as_str(),
        endpoint,
        port.api_key.clone(),
        Duration::from_millis(port.timeout_ms),
    )
}

fn log_port(cap: Capability, adapter: &str, port: &PortConfig) {
    // Only key length, never the key.
    info!(
        target: "config",
        capability = cap.as_str(),
        adapter,
        enabled = port.enabled,
        budget = ?port.calls_per_window,
        key_len = port.api_key.as_deref().map_or(0, str::len),
        "capability configured"
    );
}

/// Remote adapter when an endpoint is configured; offline adapter otherwise (summaries,
/// entities and geocoding only). Disabled ports are left out, so their stages are skipped.
pub fn build_capabilities(cfg: &EnricherConfig) -> Result<Capabilities> {
    let mut caps = Capabilities::default();

    for cap in Capability::ALL {
        let port = cfg.ports.get(cap);
        if !port.enabled {
            log_port(cap, "disabled", port);
            continue;
        }
        let gate = port.gate(cap);

        match (cap, port.endpoint()) {
            (Capability::Translate, Some(url)) => {
                caps = caps.with_translator(Gated::new(
                    Arc::new(HttpTranslator::new(http_client(cap, port, url)?)),
                    gate,
                ));
            }
            (Capability::Summarize, Some(url)) => {
                caps = caps.with_summarizer(Gated::new(
                    Arc::new(HttpSummarizer::new(http_client(cap, port, url)?)),
                    gate,
                ));
            }
            (Capability::Summarize, None) => {
                caps = caps.with_summarizer(Gated::new(Arc::new(LeadSummarizer::default()), gate));
            }
            (Capability::ExtractEntities, Some(url)) => {
                caps = caps.with_extractor(Gated::new(
                    Arc::new(HttpEntityExtractor::new(http_client(cap, port, url)?)),
                    gate,
                ));
            }
            (Capability::ExtractEntities, None) => {
                let mut extractor = PatternEntityExtractor::builtin();
                if let Some(path) = &cfg.entity_patterns {
                    extractor = extractor.with_patterns_from(path)?;
                }
                caps = caps.with_extractor(Gated::new(Arc::new(extractor), gate));
            }
            (Capability::Geocode, Some(url)) => {
                caps = caps.with_geocoder(Gated::new(
                    Arc::new(HttpGeocoder::new(http_client(cap, port, url)?)),
                    gate,
                ));
            }
            (Capability::Geocode, None) => {
                caps = caps.with_geocoder(Gated::new(Arc::new(GazetteerGeocoder), gate));
            }
            (Capability::SynthesizeSpeech, Some(url)) => {
                caps = caps.with_speech(Gated::new(
                    Arc::new(HttpSpeechSynthesizer::new(http_client(cap, port, url)?)),
                    gate,
                ));
            }
            (Capability::Translate | Capability::SynthesizeSpeech, None) => {
                warn!(
                    target: "config",
                    capability = cap.as_str(),
                    "no endpoint configured; stage will be skipped"
                );
                continue;
            }
        }
        let adapter = if port.endpoint().is_some() { "http" } else { "local" };
        log_port(cap, adapter, port);
    }
    Ok(caps)
}

/// Everything the binary needs for one run.
pub struct EnricherRuntime {
    pub cfg: EnricherConfig,
    pub orchestrator: Orchestrator,
    pub builder: ArticleBuilder,
}

impl EnricherRuntime {
    pub fn from_config(cfg: EnricherConfig) -> Result<Self> {
        let caps = build_capabilities(&cfg)?;
        let orchestrator = Orchestrator::new(caps, cfg.stages, cfg.orchestrator_config());
        let builder = cfg.article_builder();
        info!(
            target: "config",
            targets = ?cfg.target_languages,
            max_in_flight = cfg.max_in_flight,
            "enricher runtime ready"
        );
        Ok(Self {
            cfg,
            orchestrator,
            builder,
        })
    }

    pub fn from_default() -> Result<Self> {
        Self::from_config(EnricherConfig::load_default()?)
    }

    pub fn targets(&self) -> &LanguageSet {
        &self.cfg.target_languages
    }

    pub async fn run(&self, items: Vec<RawFeedItem>, cancel: &CancelSignal) -> EnrichmentBatchResult {
        self.orchestrator
            .process_raw(items, &self.builder, self.cfg.max_total, self.targets(), cancel)
            .await
    }
}
