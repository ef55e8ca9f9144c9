// src/report/mod.rs
//! Report aggregator: read-only projections of an enrichment batch.
//!
//! Every article becomes one `ArticleReport` row set (source, languages, summary, entities,
//! geotag, tone, audio, publishing status, recommendations). The batch report is then
//! rendered as JSON, a Markdown table per article, or an HTML page.

pub mod editorial;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::batch::{BatchStats, EnrichmentBatchResult};
use crate::ingest::DroppedItem;
use crate::model::{Article, ArticleStatus, StageName, StageOutcome};

pub use editorial::{annotate, Editorial, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    #[value(alias = "md")]
    Markdown,
    Html,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Json, ReportFormat::Markdown, ReportFormat::Html];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "markdown",
            ReportFormat::Html => "html",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "html" => Ok(ReportFormat::Html),
            other => anyhow::bail!("unknown report format '{other}' (json, markdown, html)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub format: ReportFormat,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleReport {
    pub number: usize,
    pub id: String,
    pub source: String,
    pub url: Option<String>,
    pub source_language: String,
    pub translated_languages: Vec<String>,
    pub raw_excerpt: String,
    pub summary: Option<String>,
    /// Category name -> surface texts, in extraction order.
    pub entities: BTreeMap<&'static str, Vec<String>>,
    pub geo_display: String,
    pub tone: Tone,
    pub categories: Vec<&'static str>,
    /// Language code -> opaque audio reference.
    pub audio: BTreeMap<String, String>,
    pub stages: BTreeMap<StageName, StageOutcome>,
    pub status: ArticleStatus,
    pub publishing_status: String,
    pub recommendations: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub location: String,
    pub date: String,
    pub generated_at: String,
    pub cancelled: bool,
    pub stats: BatchStats,
    pub dropped: Vec<DroppedItem>,
    pub articles: Vec<ArticleReport>,
}

const NOT_IDENTIFIED: &str = "Location not identified";
const EXCERPT_CHARS: usize = 100;

fn excerpt(article: &Article) -> String {
    let mut s = article.title().to_string();
    if !article.body().is_empty() {
        if !s.is_empty() {
            s.push_str(": ");
        }
        s.push_str(article.body());
    }
    if s.chars().count() > EXCERPT_CHARS {
        let mut cut: String = s.chars().take(EXCERPT_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        s
    }
}

fn publishing_status(article: &Article) -> String {
    match article.status() {
        ArticleStatus::FullyEnriched => "Ready for publishing".to_string(),
        ArticleStatus::PartiallyEnriched => {
            let gaps: Vec<&str> = StageName::ALL
                .iter()
                .filter(|s| {
                    matches!(
                        article.outcome(**s),
                        Some(StageOutcome::Failed) | Some(StageOutcome::PartialSuccess) | None
                    )
                })
                .map(|s| s.as_str())
                .collect();
            format!("Ready with gaps: {}", gaps.join(", "))
        }
        ArticleStatus::Pending => "Awaiting enrichment".to_string(),
        ArticleStatus::Failed => "Hold: enrichment failed".to_string(),
    }
}

pub fn article_report(number: usize, article: &Article) -> ArticleReport {
    let ed = annotate(article);

    let mut entities: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for e in article.entities() {
        entities.entry(e.category.as_str()).or_default().push(e.text.clone());
    }

    let geo_display = article
        .primary_location()
        .and_then(|e| e.coordinates.map(|c| format!("{} - {}", e.text, c.display())))
        .unwrap_or_else(|| NOT_IDENTIFIED.to_string());

    ArticleReport {
        number,
        id: article.id().to_string(),
        source: article.source().to_string(),
        url: article.url().map(str::to_string),
        source_language: article.source_language().name().to_string(),
        translated_languages: article
            .translations()
            .map(|m| m.keys().map(|l| l.name().to_string()).collect())
            .unwrap_or_default(),
        raw_excerpt: excerpt(article),
        summary: article.summary().map(str::to_string),
        entities,
        geo_display,
        tone: ed.tone,
        categories: ed.categories,
        audio: article
            .audio()
            .map(|m| {
                m.iter()
                    .map(|(l, r)| (l.code().to_string(), r.as_str().to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        stages: article
            .enrichment()
            .iter()
            .map(|(s, r)| (*s, r.outcome))
            .collect(),
        status: article.status(),
        publishing_status: publishing_status(article),
        recommendations: ed.recommendations,
    }
}

/// Projects one batch into report documents.
pub struct ReportAggregator<'a> {
    batch: &'a EnrichmentBatchResult,
    location: String,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(batch: &'a EnrichmentBatchResult) -> Self {
        Self {
            batch,
            location: "Nagpur".to_string(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn build(&self) -> BatchReport {
        let processed = self.batch.processed_at();
        BatchReport {
            location: self.location.clone(),
            date: processed.format("%d %b %Y").to_string(),
            generated_at: processed.to_rfc3339(),
            cancelled: self.batch.cancelled(),
            stats: self.batch.stats(),
            dropped: self.batch.dropped().to_vec(),
            articles: self
                .batch
                .articles()
                .iter()
                .enumerate()
                .map(|(i, a)| article_report(i + 1, a))
                .collect(),
        }
    }

    pub fn project(&self, format: ReportFormat) -> Result<ReportDocument> {
        let report = self.build();
        let content = match format {
            ReportFormat::Json => {
                serde_json::to_string_pretty(&report).context("serializing batch report")?
            }
            ReportFormat::Markdown => render_markdown(&report),
            ReportFormat::Html => render_html(&report),
        };
        tracing::debug!(
            target: "report",
            format = format.as_str(),
            articles = report.articles.len(),
            bytes = content.len(),
            "report projected"
        );
        Ok(ReportDocument { format, content })
    }
}

/// (feature, description, value) rows shared by the Markdown and HTML renderers.
fn rows(a: &ArticleReport) -> Vec<(&'static str, &'static str, String)> {
    let entities = if a.entities.is_empty() {
        "None identified".to_string()
    } else {
        a.entities
            .iter()
            .map(|(cat, names)| format!("{cat}: {}", names.join(", ")))
            .collect::<Vec<_>>()
            .join("; ")
    };
    let translated = if a.translated_languages.is_empty() {
        "Not translated".to_string()
    } else {
        a.translated_languages.join(", ")
    };
    let audio = if a.audio.is_empty() {
        "Not generated".to_string()
    } else {
        a.audio
            .iter()
            .map(|(l, r)| format!("{l}: {r}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    vec![
        ("Topic Analyzed", "Input feed/source", a.source.clone()),
        ("Languages Ingested", "Source language detected", a.source_language.clone()),
        ("Translation", "Output languages", translated),
        ("Raw Article Example", "Title & snippet before summarization", a.raw_excerpt.clone()),
        (
            "AI Summary (short)",
            "Concise version",
            a.summary.clone().unwrap_or_else(|| "N/A".to_string()),
        ),
        ("Named Entity Recognition", "Persons, Orgs, Places, Dates, Events", entities),
        ("Geo-tagging", "Coordinates for map display", a.geo_display.clone()),
        ("Emotion / Tone", "Tone of the article", format!("Tone: {}", a.tone.as_str())),
        ("Categories", "Suggested desks", a.categories.join(", ")),
        ("Voice Summary Output", "Accessibility audio", audio),
        ("Publishing Status", "Final action", a.publishing_status.clone()),
        ("Recommendations", "System suggestion", a.recommendations.clone()),
    ]
}

fn md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

pub fn render_markdown(r: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Hyperlocal News Report\n");
    let _ = writeln!(out, "**Location:** {}  ", r.location);
    let _ = writeln!(out, "**Date:** {}  ", r.date);
    let _ = writeln!(out, "**Total Articles:** {}  ", r.stats.total);
    let _ = writeln!(
        out,
        "**Status:** {}\n",
        r.stats
            .by_status
            .iter()
            .map(|(s, n)| format!("{} {n}", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    if r.cancelled {
        let _ = writeln!(out, "> Batch was cancelled; some articles are incomplete.\n");
    }

    for a in &r.articles {
        let _ = writeln!(out, "### Article {}\n", a.number);
        let _ = writeln!(out, "| Feature | Description | Output |");
        let _ = writeln!(out, "|---|---|---|");
        for (feature, desc, value) in rows(a) {
            let _ = writeln!(out, "| {feature} | {desc} | {} |", md_cell(&value));
        }
        out.push('\n');
    }

    if !r.dropped.is_empty() {
        let _ = writeln!(out, "### Dropped items\n");
        for d in &r.dropped {
            let _ = writeln!(
                out,
                "- {} ({}): {}",
                md_cell(&d.source),
                d.reason.as_str(),
                md_cell(&d.title)
            );
        }
    }
    out
}

fn esc(s: &str) -> String {
    html_escape::encode_text(s).to_string()
}

pub fn render_html(r: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\">");
    let _ = write!(out, "<title>Hyperlocal News Report - {}</title></head>\n<body>\n", esc(&r.location));
    let _ = writeln!(out, "<h1>Hyperlocal News Report</h1>");
    let _ = writeln!(
        out,
        "<p><strong>Location:</strong> {} &middot; <strong>Date:</strong> {} &middot; <strong>Total:</strong> {}</p>",
        esc(&r.location),
        esc(&r.date),
        r.stats.total
    );
    if r.cancelled {
        let _ = writeln!(out, "<p class=\"warning\">Batch was cancelled; some articles are incomplete.</p>");
    }
    for a in &r.articles {
        let _ = writeln!(out, "<h2>Article {}</h2>", a.number);
        let _ = writeln!(out, "<table>\n<tr><th>Feature</th><th>Description</th><th>Output</th></tr>");
        for (feature, desc, value) in rows(a) {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                esc(feature),
                esc(desc),
                esc(&value)
            );
        }
        out.push_str("</table>\n");
    }
    out.push_str("</body>\n</html>\n");
    out
}
