// src/ingest/types.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One item as delivered by feed collection. Feeds disagree on shape, so everything
/// except the source is optional here; the builder decides what is usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RawFeedItem {
    pub source: String, // e.g., "Lokmat Nagpur", "Times of India Nagpur"
    #[serde(default, alias = "lang", alias = "detected_language")]
    pub language: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "description", alias = "summary")]
    pub body: String,
    #[serde(default, alias = "pubDate", alias = "published_at")]
    pub published: Option<String>, // RFC 2822 (RSS) or RFC 3339 (APIs)
    #[serde(default, alias = "link")]
    pub url: Option<String>,
}

/// Seam to the feed-collection collaborator.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_items(&self) -> Result<Vec<RawFeedItem>>;
    fn name(&self) -> &str;
}

/// Reads a JSON array of raw items from disk (output of an external collector).
pub struct JsonFileFeed {
    pub path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl FeedSource for JsonFileFeed {
    async fn fetch_items(&self) -> Result<Vec<RawFeedItem>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading raw feed items from {}", self.path.display()))?;
        let items: Vec<RawFeedItem> = serde_json::from_str(&content)
            .with_context(|| format!("parsing raw feed items in {}", self.path.display()))?;
        Ok(items)
    }

    fn name(&self) -> &str {
        "json-file"
    }
}
