// src/batch.rs
//! The batch handed to consumers: enriched articles, dropped raw items, and statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::ingest::DroppedItem;
use crate::lang::{LangCode, LanguageSet};
use crate::model::{Article, ArticleStatus, EntityCategory};

#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentBatchResult {
    articles: Vec<Article>,
    dropped: Vec<DroppedItem>,
    by_status: BTreeMap<ArticleStatus, usize>,
    target_languages: LanguageSet,
    cancelled: bool,
    processed_at: DateTime<Utc>,
}

/// Aggregate view over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub dropped: usize,
    pub by_status: BTreeMap<ArticleStatus, usize>,
    pub by_entity_category: BTreeMap<EntityCategory, usize>,
    pub by_source_language: BTreeMap<LangCode, usize>,
    /// Articles holding a translation for each target language.
    pub by_target_language: BTreeMap<LangCode, usize>,
}

impl EnrichmentBatchResult {
    pub(crate) fn new(articles: Vec<Article>, target_languages: LanguageSet, cancelled: bool) -> Self {
        let mut by_status: BTreeMap<ArticleStatus, usize> =
            ArticleStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for a in &articles {
            *by_status.entry(a.status()).or_default() += 1;
        }
        Self {
            articles,
            dropped: Vec::new(),
            by_status,
            target_languages,
            cancelled,
            processed_at: Utc::now(),
        }
    }

    pub(crate) fn set_dropped(&mut self, dropped: Vec<DroppedItem>) {
        self.dropped = dropped;
    }

    pub fn total(&self) -> usize {
        self.articles.len()
    }

    pub fn count(&self, status: ArticleStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn get(&self, id: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.id() == id)
    }

    pub fn dropped(&self) -> &[DroppedItem] {
        &self.dropped
    }

    pub fn target_languages(&self) -> &LanguageSet {
        &self.target_languages
    }

    /// True when a cancellation was observed; some articles may be incomplete.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    pub fn into_articles(self) -> Vec<Article> {
        self.articles
    }

    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats {
            total: self.total(),
            dropped: self.dropped.len(),
            by_status: self.by_status.clone(),
            ..BatchStats::default()
        };
        for a in &self.articles {
            *stats.by_source_language.entry(a.source_language()).or_default() += 1;
            for e in a.entities() {
                *stats.by_entity_category.entry(e.category).or_default() += 1;
            }
            if let Some(tr) = a.translations() {
                for lang in tr.keys() {
                    *stats.by_target_language.entry(*lang).or_default() += 1;
                }
            }
        }
        stats
    }
}
