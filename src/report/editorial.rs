// src/report/editorial.rs
//! Editorial annotations derived from an enriched article: keyword tone, suggested desk
//! categories, and publishing recommendations.

use serde::Serialize;

use crate::model::{Article, EntityCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Positive => "Positive",
            Tone::Negative => "Negative",
            Tone::Neutral => "Neutral",
        }
    }
}

/// Word stems; a token matches when it starts with the stem ("launches" ~ "launch").
const POSITIVE: &[&str] = &[
    "launch", "success", "improv", "new", "initiative", "progress", "achiev", "inaugurat",
    "win", "approv",
];
const NEGATIVE: &[&str] = &[
    "problem", "issue", "fail", "crisis", "accident", "protest", "delay", "death", "flood",
    "shortage",
];

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Civic Updates", &["municipal", "corporation", "ward", "civic", "infrastructure"]),
    ("Environment", &["waste", "pollution", "green", "environment", "recycl"]),
    ("Transport", &["traffic", "road", "metro", "bus", "transport"]),
    ("Education", &["school", "college", "education", "student", "exam"]),
    ("Health", &["hospital", "health", "medical", "doctor", "clinic"]),
    ("Politics", &["minister", "election", "party", "government", "politic"]),
    ("Business", &["business", "market", "economy", "trade", "industr"]),
];

pub const GENERAL_NEWS: &str = "General News";

fn tokenize(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn is_negator(tok: &str) -> bool {
    matches!(tok, "not" | "no" | "never" | "without" | "cannot")
}

fn matches_any(tok: &str, stems: &[&str]) -> bool {
    stems.iter().any(|s| tok.starts_with(s))
}

/// Net keyword score; a negator within the three preceding tokens flips a hit.
pub fn tone_score(text: &str) -> i32 {
    let tokens = tokenize(text);
    let mut score = 0;
    for (i, tok) in tokens.iter().enumerate() {
        let base = if matches_any(tok, POSITIVE) {
            1
        } else if matches_any(tok, NEGATIVE) {
            -1
        } else {
            0
        };
        if base == 0 {
            continue;
        }
        let negated = (1..=3).any(|k| i >= k && is_negator(&tokens[i - k]));
        score += if negated { -base } else { base };
    }
    score
}

fn tone_of(score: i32) -> Tone {
    match score {
        s if s > 0 => Tone::Positive,
        s if s < 0 => Tone::Negative,
        _ => Tone::Neutral,
    }
}

pub fn tone(text: &str) -> Tone {
    tone_of(tone_score(text))
}

pub fn suggest_categories(text: &str) -> Vec<&'static str> {
    let tokens = tokenize(text);
    let cats: Vec<&'static str> = CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, stems)| tokens.iter().any(|t| matches_any(t, stems)))
        .map(|(name, _)| *name)
        .collect();
    if cats.is_empty() {
        vec![GENERAL_NEWS]
    } else {
        cats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Editorial {
    pub tone: Tone,
    pub tone_score: i32,
    pub categories: Vec<&'static str>,
    pub recommendations: String,
}

/// Annotate from the summary (or the body when there is none) plus the title.
pub fn annotate(article: &Article) -> Editorial {
    let text = article.summary().unwrap_or_else(|| article.source_text());
    let tone_score = tone_score(text);
    let categories = suggest_categories(&format!("{} {}", article.title(), text));

    let mut recs = Vec::new();
    if let Some(loc) = article.primary_location() {
        recs.push(format!("Push notification to residents in {}", loc.text));
    }
    if categories != [GENERAL_NEWS] {
        recs.push(format!("Highlight in '{}' category", categories.join(", ")));
    }
    let orgs: Vec<&str> = article
        .entities()
        .iter()
        .filter(|e| e.category == EntityCategory::Organization)
        .map(|e| e.text.as_str())
        .take(2)
        .collect();
    if !orgs.is_empty() {
        recs.push(format!("Tag organizations: {}", orgs.join(", ")));
    }

    Editorial {
        tone: tone_of(tone_score),
        tone_score,
        categories,
        recommendations: if recs.is_empty() {
            "Standard publishing".to_string()
        } else {
            recs.join("; ")
        },
    }
}
