// src/ingest/mod.rs
//! Article record builder: turns heterogeneous raw feed items into canonical `Article`s.

pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::RawFeedItem;
use crate::lang::{detect_script_language, LangCode};
use crate::model::Article;

const DEFAULT_MAX_BODY_CHARS: usize = 5_000;
/// Source recorded (and hashed into the id) for items that do not name their feed.
pub const UNKNOWN_SOURCE: &str = "unknown";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_built_total", "Raw items turned into articles.");
        describe_counter!(
            "ingest_dropped_total",
            "Raw items excluded before enrichment (validation, duplicate, over limit)."
        );
    });
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("item from {feed} has neither title nor body")]
    EmptyContent { feed: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    Validation { message: String },
    Duplicate { id: String },
    OverLimit,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Validation { .. } => "validation",
            DropReason::Duplicate { .. } => "duplicate",
            DropReason::OverLimit => "over_limit",
        }
    }
}

/// A raw item that never became an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedItem {
    pub source: String,
    pub url: Option<String>,
    pub title: String,
    #[serde(flatten)]
    pub reason: DropReason,
}

#[derive(Debug, Default)]
pub struct BuildOutput {
    pub articles: Vec<Article>,
    pub dropped: Vec<DroppedItem>,
}

/// Normalize text: decode entities, strip tags, straighten quotes, collapse whitespace.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

/// Leading sentences of `text` that fit in `max_chars` (at least the first sentence,
/// cut at a word boundary if that alone is too long).
pub fn lead_sentences(text: &str, max_chars: usize) -> String {
    static RE_SENT: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_SENT.get_or_init(|| regex::Regex::new(r"[^.!?।]+[.!?।]*").unwrap());

    let mut out = String::new();
    for m in re.find_iter(text) {
        let sentence = m.as_str().trim();
        if sentence.is_empty() {
            continue;
        }
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + sentence.chars().count() > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(sentence);
    }
    if !out.is_empty() {
        return out;
    }

    // First sentence alone is over budget: keep whole words.
    let mut cut = String::new();
    for word in text.split_whitespace() {
        let extra = if cut.is_empty() { 0 } else { 1 };
        if cut.chars().count() + extra + word.chars().count() > max_chars {
            break;
        }
        if !cut.is_empty() {
            cut.push(' ');
        }
        cut.push_str(word);
    }
    cut
}

/// Stable id: sha256 over normalized source + URL (title when the feed gives no link).
pub fn article_id(source: &str, url: Option<&str>, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.trim().to_lowercase().as_bytes());
    hasher.update(b"\n");
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => hasher.update(u.as_bytes()),
        None => {
            hasher.update(b"title:");
            hasher.update(title.trim().to_lowercase().as_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Accepts RFC 3339 and RFC 2822 timestamps; anything else is treated as unknown.
pub fn parse_published(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let parsed = OffsetDateTime::parse(ts, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc2822))
        .ok()?;
    DateTime::from_timestamp(parsed.unix_timestamp(), parsed.nanosecond())
}

#[derive(Debug, Clone)]
pub struct ArticleBuilder {
    default_language: LangCode,
    max_body_chars: usize,
}

impl Default for ArticleBuilder {
    fn default() -> Self {
        Self::new(LangCode::En)
    }
}

impl ArticleBuilder {
    pub fn new(default_language: LangCode) -> Self {
        Self {
            default_language,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
        }
    }

    pub fn with_max_body_chars(mut self, max: usize) -> Self {
        self.max_body_chars = max.max(1);
        self
    }

    /// Declared language if recognized, else script detection, else the default.
    fn resolve_language(&self, declared: Option<&str>, title: &str, body: &str) -> LangCode {
        if let Some(d) = declared {
            match d.parse::<LangCode>() {
                Ok(l) => return l,
                Err(e) => tracing::debug!(target: "ingest", error = %e, "falling back to script detection"),
            }
        }
        detect_script_language(&format!("{title} {body}")).unwrap_or(self.default_language)
    }

    /// Build one article. Deterministic: the same raw item always yields the same id.
    pub fn build(&self, raw: &RawFeedItem) -> Result<Article, ValidationError> {
        let source = match raw.source.trim() {
            "" => UNKNOWN_SOURCE,
            s => s,
        };

        let title = normalize_text(&raw.title, 500);
        let body = normalize_text(&raw.body, self.max_body_chars);
        if title.is_empty() && body.is_empty() {
            return Err(ValidationError::EmptyContent {
                feed: source.to_string(),
            });
        }

        let url = raw
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let id = article_id(source, url.as_deref(), &title);
        let lang = self.resolve_language(raw.language.as_deref(), &title, &body);
        let published_at = raw.published.as_deref().and_then(parse_published);

        Ok(Article::new(
            id,
            source.to_string(),
            url,
            lang,
            title,
            body,
            published_at,
        ))
    }

    /// Build a batch: drop invalid items and duplicate ids, order newest first, then
    /// apply the optional `max_total` window.
    pub fn build_batch(&self, items: Vec<RawFeedItem>, max_total: Option<usize>) -> BuildOutput {
        ensure_metrics_described();

        let mut out = BuildOutput::default();
        let mut seen: HashSet<String> = HashSet::new();

        for raw in items {
            match self.build(&raw) {
                Ok(article) => {
                    if !seen.insert(article.id().to_string()) {
                        out.dropped.push(dropped(&raw, DropReason::Duplicate {
                            id: article.id().to_string(),
                        }));
                        continue;
                    }
                    out.articles.push(article);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", source = %raw.source, error = %e, "raw item excluded");
                    out.dropped.push(dropped(&raw, DropReason::Validation {
                        message: e.to_string(),
                    }));
                }
            }
        }

        // Newest first; undated items last.
        out.articles
            .sort_by(|a, b| b.published_at().cmp(&a.published_at()));

        if let Some(max) = max_total {
            if out.articles.len() > max {
                for a in out.articles.split_off(max) {
                    out.dropped.push(DroppedItem {
                        source: a.source().to_string(),
                        url: a.url().map(str::to_string),
                        title: a.title().to_string(),
                        reason: DropReason::OverLimit,
                    });
                }
            }
        }

        counter!("ingest_built_total").increment(out.articles.len() as u64);
        for d in &out.dropped {
            counter!("ingest_dropped_total", "reason" => d.reason.as_str()).increment(1);
        }
        tracing::info!(
            target: "ingest",
            built = out.articles.len(),
            dropped = out.dropped.len(),
            "record builder finished"
        );
        out
    }
}

fn dropped(raw: &RawFeedItem, reason: DropReason) -> DroppedItem {
    DroppedItem {
        source: raw.source.clone(),
        url: raw.url.clone(),
        title: raw.title.chars().take(100).collect(),
        reason,
    }
}
