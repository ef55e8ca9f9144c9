// src/ports/local.rs
//! Offline capability adapters for fast runs without remote services:
//! lead-sentence summaries, regex entity extraction, and a small city gazetteer.
//!
//! Entity patterns can be extended from a JSON file shaped like
//! `{ "patterns": [ { "regex": "...", "category": "Location" } ] }`.
//! Regexes must be compatible with the `regex` crate (no lookarounds); when a pattern has a
//! capture group, group 1 is the entity text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::ingest::lead_sentences;
use crate::model::{Coordinates, Entity, EntityCategory};
use crate::ports::{
    CapResult, CapabilityError, EntityExtractor, GeoPoint, Geocoder, Summarizer,
};

/// Extractive summary: leading sentences up to `max_chars`, always shorter than the input.
#[derive(Debug, Clone)]
pub struct LeadSummarizer {
    pub max_chars: usize,
    pub max_input_chars: usize,
}

impl Default for LeadSummarizer {
    fn default() -> Self {
        Self {
            max_chars: 200,
            max_input_chars: 20_000,
        }
    }
}

#[async_trait]
impl Summarizer for LeadSummarizer {
    async fn summarize(&self, text: &str) -> CapResult<String> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(CapabilityError::InputTooLong {
                len,
                max: self.max_input_chars,
            });
        }
        let text = text.trim();
        let len = text.chars().count();
        let mut out = lead_sentences(text, self.max_chars);
        if out.chars().count() >= len {
            // The lead is the whole text: drop the last sentence, or the last words.
            out = lead_sentences(text, len.saturating_sub(1));
        }
        if out.is_empty() || out.chars().count() >= len {
            return Err(CapabilityError::Validation("text too short to summarize".into()));
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "lead"
    }
}

#[derive(Debug, Deserialize)]
struct PatternSpec {
    regex: String,
    category: EntityCategory,
}

#[derive(Debug, Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: Vec<PatternSpec>,
}

const MONTHS: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";

fn builtin_patterns() -> Vec<(&'static str, EntityCategory)> {
    vec![
        (
            r"\b((?:[A-Z][a-z]+\s+)+(?:Municipal Corporation|Corporation|Police|University|Hospital|Council|Board|Authority|Ministry|Department|Bank|Trust|Committee|Party))\b",
            EntityCategory::Organization,
        ),
        (
            r"\b([A-Z][a-z]+)\s+(?:Municipal|Corporation|District|Division)\b",
            EntityCategory::Location,
        ),
        (
            r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\s+Nagar)\b",
            EntityCategory::Location,
        ),
        (
            r"\b(?:Mr|Mrs|Ms|Dr|Shri|Smt)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
            EntityCategory::Person,
        ),
        (
            r"\b((?:[A-Z][a-z]+\s+)*(?:Festival|Mahotsav|Utsav|Marathon|Summit|Expo|Fair|Elections?|Conference))\b",
            EntityCategory::Event,
        ),
        (
            r"(?i)\b(today|yesterday|tomorrow|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
            EntityCategory::Date,
        ),
    ]
}

/// Regex-driven entity extraction (plus gazetteer city names as locations).
pub struct PatternEntityExtractor {
    patterns: Vec<(Regex, EntityCategory)>,
    gazetteer: Vec<(Regex, &'static str)>,
}

impl Default for PatternEntityExtractor {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternEntityExtractor {
    pub fn builtin() -> Self {
        let mut patterns: Vec<(Regex, EntityCategory)> = builtin_patterns()
            .into_iter()
            .filter_map(|(re, cat)| Regex::new(re).ok().map(|r| (r, cat)))
            .collect();
        for re in [
            format!(r"\b(\d{{1,2}}\s+(?:{MONTHS})(?:\s+\d{{4}})?)\b"),
            format!(r"\b((?:{MONTHS})\s+\d{{1,2}}(?:,\s*\d{{4}})?)\b"),
        ] {
            if let Ok(r) = Regex::new(&re) {
                patterns.push((r, EntityCategory::Date));
            }
        }

        let gazetteer = KNOWN_PLACES
            .iter()
            .filter_map(|(name, _, _)| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
                    .ok()
                    .map(|r| (r, *name))
            })
            .collect();

        Self {
            patterns,
            gazetteer,
        }
    }

    /// Add patterns from a JSON file. Invalid regexes are skipped with a warning.
    pub fn with_patterns_from(mut self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading entity patterns from {}", path.display()))?;
        let file: PatternFile = serde_json::from_str(&content)
            .with_context(|| format!("parsing entity patterns in {}", path.display()))?;
        for p in file.patterns {
            match Regex::new(&p.regex) {
                Ok(r) => self.patterns.push((r, p.category)),
                Err(e) => tracing::warn!(target: "ports", pattern = %p.regex, error = %e, "skipping invalid entity pattern"),
            }
        }
        Ok(self)
    }

    pub fn extract_sync(&self, text: &str) -> Vec<Entity> {
        let mut seen: HashSet<(EntityCategory, String)> = HashSet::new();
        let mut out = Vec::new();
        let mut push = |text: &str, cat: EntityCategory| {
            let t = text.trim();
            if !t.is_empty() && seen.insert((cat, t.to_lowercase())) {
                out.push(Entity::new(t, cat));
            }
        };

        for (re, cat) in &self.patterns {
            for caps in re.captures_iter(text) {
                if let Some(m) = caps.get(1).or_else(|| caps.get(0)) {
                    push(m.as_str(), *cat);
                }
            }
        }
        for (re, name) in &self.gazetteer {
            if re.is_match(text) {
                push(name, EntityCategory::Location);
            }
        }
        out
    }
}

#[async_trait]
impl EntityExtractor for PatternEntityExtractor {
    async fn extract(&self, text: &str) -> CapResult<Vec<Entity>> {
        Ok(self.extract_sync(text))
    }

    fn name(&self) -> &'static str {
        "patterns"
    }
}

/// (name, lat, lon)
const KNOWN_PLACES: &[(&str, f64, f64)] = &[
    ("Nagpur", 21.1458, 79.0882),
    ("Mumbai", 19.0760, 72.8777),
    ("Delhi", 28.6139, 77.2090),
    ("Bangalore", 12.9716, 77.5946),
    ("Pune", 18.5204, 73.8567),
    ("Hyderabad", 17.3850, 78.4867),
    ("Chennai", 13.0827, 80.2707),
    ("Kolkata", 22.5726, 88.3639),
    ("Nashik", 19.9975, 73.7898),
    ("Amravati", 20.9374, 77.7796),
    ("Wardha", 20.7453, 78.6022),
    ("Chandrapur", 19.9615, 79.2961),
];

const FUZZY_THRESHOLD: f64 = 0.93;

/// Resolves well-known city names without any network call. Near-miss spellings
/// ("Nagpure", "Banglore") resolve through Jaro-Winkler similarity.
#[derive(Debug, Clone, Default)]
pub struct GazetteerGeocoder;

impl GazetteerGeocoder {
    pub fn lookup(&self, location: &str) -> Option<GeoPoint> {
        let key = location.trim().to_lowercase();
        let key = key.trim_end_matches(", india").trim();
        if key.is_empty() {
            return None;
        }

        let exact = KNOWN_PLACES
            .iter()
            .find(|(name, _, _)| name.to_lowercase() == key);
        let hit = exact.or_else(|| {
            KNOWN_PLACES
                .iter()
                .map(|p| (p, strsim::jaro_winkler(&p.0.to_lowercase(), key)))
                .filter(|(_, score)| *score >= FUZZY_THRESHOLD)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(p, _)| p)
        })?;

        Some(GeoPoint {
            coordinates: Coordinates {
                lat: hit.1,
                lon: hit.2,
            },
            resolved_name: Some(format!("{}, India", hit.0)),
        })
    }
}

#[async_trait]
impl Geocoder for GazetteerGeocoder {
    async fn geocode(&self, location: &str) -> CapResult<GeoPoint> {
        self.lookup(location)
            .ok_or_else(|| CapabilityError::NotFound(location.to_string()))
    }

    fn name(&self) -> &'static str {
        "gazetteer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NMC: &str = "Nagpur Municipal Corporation launches waste segregation drive in ward 12.";

    #[test]
    fn extracts_org_and_location_from_civic_sentence() {
        let ents = PatternEntityExtractor::builtin().extract_sync(NMC);
        assert!(ents
            .iter()
            .any(|e| e.category == EntityCategory::Organization
                && e.text == "Nagpur Municipal Corporation"));
        assert!(ents
            .iter()
            .any(|e| e.category == EntityCategory::Location && e.text == "Nagpur"));
        // Deduplicated: "Nagpur" found by pattern and gazetteer only once.
        let n = ents
            .iter()
            .filter(|e| e.category == EntityCategory::Location && e.text == "Nagpur")
            .count();
        assert_eq!(n, 1);
    }

    #[test]
    fn extracts_people_dates_events() {
        let t = "Dr. Anjali Deshmukh opened the Orange Festival on 12 January 2025 at Pune.";
        let ents = PatternEntityExtractor::builtin().extract_sync(t);
        let has = |cat, text: &str| ents.iter().any(|e| e.category == cat && e.text == text);
        assert!(has(EntityCategory::Person, "Anjali Deshmukh"));
        assert!(has(EntityCategory::Event, "Orange Festival"));
        assert!(has(EntityCategory::Date, "12 January 2025"));
        assert!(has(EntityCategory::Location, "Pune"));
    }

    #[test]
    fn extra_patterns_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("patterns.json");
        fs::write(
            &p,
            r#"{"patterns":[{"regex":"\\b(Sitabuldi)\\b","category":"Location"},{"regex":"(","category":"Event"}]}"#,
        )
        .unwrap();
        let ex = PatternEntityExtractor::builtin().with_patterns_from(&p).unwrap();
        let ents = ex.extract_sync("Traffic jam near Sitabuldi");
        assert!(ents.iter().any(|e| e.text == "Sitabuldi"));
    }

    #[test]
    fn gazetteer_exact_and_fuzzy() {
        let g = GazetteerGeocoder;
        let p = g.lookup("Nagpur").unwrap();
        assert!((p.coordinates.lat - 21.1458).abs() < 1e-6);
        assert!((p.coordinates.lon - 79.0882).abs() < 1e-6);
        assert_eq!(p.resolved_name.as_deref(), Some("Nagpur, India"));
        assert!(g.lookup("nagpure").is_some());
        assert!(g.lookup("Atlantis").is_none());
    }

    #[tokio::test]
    async fn lead_summarizer_enforces_input_limit() {
        let s = LeadSummarizer {
            max_chars: 50,
            max_input_chars: 10,
        };
        let err = s.summarize("this input is far too long").await.unwrap_err();
        assert!(matches!(err, CapabilityError::InputTooLong { max: 10, .. }));
    }

    #[tokio::test]
    async fn lead_summary_is_shorter_than_a_single_sentence_body() {
        let body = "Nagpur Municipal Corporation launches waste segregation drive in ward 12.";
        let out = LeadSummarizer::default().summarize(body).await.unwrap();
        assert_eq!(out, "Nagpur Municipal Corporation launches waste segregation drive in ward");
        assert!(out.chars().count() < body.chars().count());
    }

    #[tokio::test]
    async fn lead_summary_drops_the_last_sentence_of_a_short_body() {
        let body = "Water supply restored in ward 4. Repairs took two days.";
        let out = LeadSummarizer::default().summarize(body).await.unwrap();
        assert_eq!(out, "Water supply restored in ward 4.");
    }

    #[tokio::test]
    async fn one_word_cannot_be_summarized() {
        let err = LeadSummarizer::default().summarize("Sitabuldi").await.unwrap_err();
        assert!(matches!(err, CapabilityError::Validation(_)));
    }
}
