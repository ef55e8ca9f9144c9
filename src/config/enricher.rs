// src/config/enricher.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::gate::{AdmissionGate, GateLifecycle, RateBudget, RateLimitGate, UnlimitedGate};
use crate::ingest::ArticleBuilder;
use crate::lang::{LangCode, LanguageSet};
use crate::orchestrator::{OrchestratorConfig, StagePolicies};
use crate::ports::Capability;

pub const ENV_CONFIG_PATH: &str = "ENRICHER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/enricher.toml";

fn de_lang_set<'de, D: Deserializer<'de>>(d: D) -> Result<LanguageSet, D::Error> {
    let raw = Vec::<String>::deserialize(d)?;
    raw.iter()
        .map(|s| s.parse::<LangCode>().map_err(serde::de::Error::custom))
        .collect()
}

fn de_lang<'de, D: Deserializer<'de>>(d: D) -> Result<LangCode, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse::<LangCode>().map_err(serde::de::Error::custom)
}

fn default_true() -> bool {
    true
}
fn default_window_secs() -> u64 {
    60
}
fn default_max_concurrent() -> usize {
    4
}
fn default_port_timeout_ms() -> u64 {
    15_000
}

/// Settings for one capability port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Remote service URL. Without one, the offline adapter is used where there is one.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Literal key, or "ENV" to read `ENRICHER_<PORT>_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Call budget per window; absent = no budget (concurrency cap still applies).
    #[serde(default)]
    pub calls_per_window: Option<u32>,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// HTTP client timeout for remote adapters.
    #[serde(default = "default_port_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            api_key: None,
            calls_per_window: None,
            window_secs: default_window_secs(),
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_port_timeout_ms(),
        }
    }
}

impl PortConfig {
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// Shared admission gate for this port.
    pub fn gate(&self, cap: Capability) -> Arc<dyn AdmissionGate> {
        match self.calls_per_window {
            Some(calls) => Arc::new(RateLimitGate::new(
                cap.as_str(),
                RateBudget {
                    calls_per_window: calls,
                    window: Duration::from_secs(self.window_secs),
                },
                self.max_concurrent,
            )),
            None if self.endpoint().is_some() => Arc::new(RateLimitGate::new(
                cap.as_str(),
                RateBudget {
                    calls_per_window: u32::MAX,
                    window: Duration::from_secs(self.window_secs),
                },
                self.max_concurrent,
            )),
            None => Arc::new(UnlimitedGate),
        }
    }

    fn sanitize(&mut self) {
        self.window_secs = self.window_secs.max(1);
        self.max_concurrent = self.max_concurrent.max(1);
        self.timeout_ms = self.timeout_ms.max(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub translate: PortConfig,
    pub summarize: PortConfig,
    pub extract_entities: PortConfig,
    pub geocode: PortConfig,
    pub synthesize_speech: PortConfig,
}

impl PortsConfig {
    pub fn get(&self, cap: Capability) -> &PortConfig {
        match cap {
            Capability::Translate => &self.translate,
            Capability::Summarize => &self.summarize,
            Capability::ExtractEntities => &self.extract_entities,
            Capability::Geocode => &self.geocode,
            Capability::SynthesizeSpeech => &self.synthesize_speech,
        }
    }

    fn get_mut(&mut self, cap: Capability) -> &mut PortConfig {
        match cap {
            Capability::Translate => &mut self.translate,
            Capability::Summarize => &mut self.summarize,
            Capability::ExtractEntities => &mut self.extract_entities,
            Capability::Geocode => &mut self.geocode,
            Capability::SynthesizeSpeech => &mut self.synthesize_speech,
        }
    }
}

/// Env var holding the API key for `cap`, e.g. `ENRICHER_TRANSLATE_API_KEY`.
pub fn api_key_env(cap: Capability) -> String {
    format!("ENRICHER_{}_API_KEY", cap.as_str().to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnricherConfig {
    #[serde(deserialize_with = "de_lang_set")]
    pub target_languages: LanguageSet,
    /// Used when neither the feed nor script detection gives a language.
    #[serde(deserialize_with = "de_lang")]
    pub default_source_language: LangCode,
    pub max_in_flight: usize,
    /// Keep only the newest N articles of a batch.
    pub max_total: Option<usize>,
    pub max_body_chars: usize,
    pub gate_lifecycle: GateLifecycle,
    pub geotag_partial_counts_as_success: bool,
    /// Extra entity patterns (JSON) for the offline extractor.
    pub entity_patterns: Option<PathBuf>,
    pub stages: StagePolicies,
    pub ports: PortsConfig,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            target_languages: [LangCode::En, LangCode::Mr, LangCode::Hi].into_iter().collect(),
            default_source_language: LangCode::En,
            max_in_flight: 4,
            max_total: None,
            max_body_chars: 5_000,
            gate_lifecycle: GateLifecycle::PerBatch,
            geotag_partial_counts_as_success: true,
            entity_patterns: None,
            stages: StagePolicies::default(),
            ports: PortsConfig::default(),
        }
    }
}

impl EnricherConfig {
    /// Parse TOML, resolve "ENV" keys, sanitize.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EnricherConfig = toml::from_str(s).context("parsing enricher config")?;
        let mut cfg = cfg.sanitized();
        cfg.resolve_api_keys()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading enricher config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Resolution order:
    /// 1) $ENRICHER_CONFIG_PATH (must exist)
    /// 2) config/enricher.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        tracing::info!(target: "config", "no enricher config found, using defaults");
        Ok(Self::default())
    }

    pub fn sanitized(mut self) -> Self {
        self.max_in_flight = self.max_in_flight.max(1);
        self.max_body_chars = self.max_body_chars.max(1);
        self.stages = self.stages.sanitized();
        for cap in Capability::ALL {
            self.ports.get_mut(cap).sanitize();
        }
        self
    }

    /// Replace `api_key = "ENV"` by the matching env var. Only enabled ports with an
    /// endpoint need the key to exist.
    fn resolve_api_keys(&mut self) -> Result<()> {
        for cap in Capability::ALL {
            let port = self.ports.get_mut(cap);
            let wants_env = port
                .api_key
                .as_deref()
                .is_some_and(|k| k.trim().eq_ignore_ascii_case("env"));
            if !wants_env {
                continue;
            }
            let var = api_key_env(cap);
            match env::var(&var) {
                Ok(v) => port.api_key = Some(v),
                Err(_) if port.enabled && port.endpoint().is_some() => {
                    return Err(anyhow!("Missing {var} env var"));
                }
                Err(_) => port.api_key = None,
            }
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_in_flight: self.max_in_flight,
            gate_lifecycle: self.gate_lifecycle,
            geotag_partial_counts_as_success: self.geotag_partial_counts_as_success,
        }
    }

    pub fn article_builder(&self) -> ArticleBuilder {
        ArticleBuilder::new(self.default_source_language).with_max_body_chars(self.max_body_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn parses_and_sanitizes() {
        let cfg = EnricherConfig::from_toml_str(
            r#"
            target_languages = ["mr", "hi-IN"]
            default_source_language = "en"
            max_in_flight = 0
            gate_lifecycle = "long_lived"

            [stages.translation]
            max_attempts = 0
            timeout_ms = 2000

            [ports.translate]
            endpoint = "https://translate.example/api"
            calls_per_window = 60
            window_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.target_languages,
            [LangCode::Mr, LangCode::Hi].into_iter().collect::<LanguageSet>()
        );
        assert_eq!(cfg.max_in_flight, 1);
        assert_eq!(cfg.gate_lifecycle, GateLifecycle::LongLived);
        assert_eq!(cfg.stages.translation.max_attempts, 1);
        assert_eq!(cfg.stages.translation.timeout_ms, 2000);
        assert!(cfg.stages.summary.fallback, "untouched stages keep defaults");
        assert_eq!(cfg.ports.translate.window_secs, 1);
        assert_eq!(cfg.ports.translate.calls_per_window, Some(60));
        assert!(cfg.ports.geocode.enabled);
    }

    #[test]
    fn unknown_language_is_rejected() {
        let err = EnricherConfig::from_toml_str(r#"target_languages = ["mr", "klingon"]"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("klingon"));
    }

    #[serial_test::serial]
    #[test]
    fn env_api_key_resolution() {
        let var = api_key_env(Capability::Translate);
        assert_eq!(var, "ENRICHER_TRANSLATE_API_KEY");
        let toml = r#"
            [ports.translate]
            endpoint = "https://translate.example/api"
            api_key = "ENV"
        "#;

        env::remove_var(&var);
        assert!(EnricherConfig::from_toml_str(toml).is_err());

        env::set_var(&var, "sekret");
        let cfg = EnricherConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.ports.translate.api_key.as_deref(), Some("sekret"));
        env::remove_var(&var);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_file_then_builtin() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        let cfg = EnricherConfig::load_default().unwrap();
        assert_eq!(cfg, EnricherConfig::default());

        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_PATH), "max_in_flight = 7\n").unwrap();
        assert_eq!(EnricherConfig::load_default().unwrap().max_in_flight, 7);

        let explicit = tmp.path().join("other.toml");
        fs::write(&explicit, "max_in_flight = 9\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, explicit.display().to_string());
        assert_eq!(EnricherConfig::load_default().unwrap().max_in_flight, 9);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(EnricherConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
