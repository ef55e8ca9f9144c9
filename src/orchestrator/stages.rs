// src/orchestrator/stages.rs
//! One function per plan step. Each reads the article as it stood when the step's layer
//! started and returns the stage result to merge; none of them can fail.

use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};

use crate::ingest::lead_sentences;
use crate::lang::{LangCode, LanguageSet};
use crate::model::{
    Article, AudioRef, Entity, EntityCategory, StageIssue, StageName, StageOutcome,
    StagePayload, StageResult, TranslatedText,
};
use crate::orchestrator::plan::Step;
use crate::orchestrator::StagePolicies;
use crate::ports::{CapResult, CapabilityError, Capabilities, ErrorKind, Gated, Translator};
use crate::runner::{self, invoke, Invocation, StagePolicy};

/// Length of the lead used when summarization falls back to the original text.
const FALLBACK_SUMMARY_CHARS: usize = 280;
/// Shorter texts are not worth a speech call.
const MIN_SPEECH_CHARS: usize = 10;

pub(crate) struct StageContext<'a> {
    pub caps: &'a Capabilities,
    pub policies: &'a StagePolicies,
    pub targets: &'a LanguageSet,
}

/// Run `step` for `article`. `None` means there was nothing to record. `rerun` holds the
/// steps that already produced a new result in this pass.
pub(crate) async fn execute(
    step: Step,
    article: &Article,
    ctx: &StageContext<'_>,
    rerun: &HashSet<Step>,
) -> Option<StageResult> {
    match step {
        Step::Translate => Some(translate(article, ctx).await),
        Step::Summarize => Some(summarize(article, ctx).await),
        Step::ExtractEntities => Some(extract_entities(article, ctx).await),
        Step::Geotag => Some(geotag(article, ctx).await),
        Step::TranslateSummary => {
            translate_summary(article, ctx, rerun.contains(&Step::Summarize)).await
        }
        Step::Synthesize => Some(synthesize(article, ctx).await),
    }
}

async fn translate_text(
    port: &Gated<dyn Translator>,
    policy: &StagePolicy,
    text: &str,
    source: LangCode,
    target: LangCode,
) -> Invocation<String> {
    if text.is_empty() {
        return Invocation {
            result: Ok(String::new()),
            attempts: 0,
        };
    }
    invoke(StageName::Translation, port.gate.as_ref(), policy, || {
        port.port.translate(text, source, target)
    })
    .await
}

/// Fold per-language outcomes: all ok is `Success`, some ok is `PartialSuccess`, none is
/// `Failed`. Every failed language becomes an issue keyed by its code.
fn per_language<V>(
    stage: StageName,
    outcomes: Vec<(LangCode, CapResult<V>)>,
    attempts: u32,
    to_payload: impl FnOnce(BTreeMap<LangCode, V>) -> StagePayload,
) -> StageResult {
    let total = outcomes.len();
    let mut ok = BTreeMap::new();
    let mut issues = Vec::new();
    let mut first_err: Option<CapabilityError> = None;

    for (lang, res) in outcomes {
        match res {
            Ok(v) => {
                ok.insert(lang, v);
            }
            Err(e) => {
                issues.push(StageIssue {
                    key: lang.code().to_string(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                first_err.get_or_insert(e);
            }
        }
    }

    match first_err {
        None => StageResult::success(stage, to_payload(ok), attempts),
        Some(_) if !ok.is_empty() => StageResult::partial(stage, to_payload(ok), attempts, issues),
        Some(e) => StageResult::failed(
            stage,
            e.kind(),
            format!("all {total} languages failed; first: {e}"),
            attempts,
        )
        .with_issues(issues),
    }
}

async fn translate(article: &Article, ctx: &StageContext<'_>) -> StageResult {
    let stage = StageName::Translation;
    let Some(port) = &ctx.caps.translator else {
        return StageResult::skipped(stage);
    };
    let source = article.source_language();
    let langs: Vec<LangCode> = ctx.targets.iter().copied().filter(|l| *l != source).collect();
    if langs.is_empty() {
        return StageResult::skipped(stage);
    }
    let policy = &ctx.policies.translation;

    let per_lang = join_all(langs.into_iter().map(|target| async move {
        let title = translate_text(port, policy, article.title(), source, target).await;
        let mut attempts = title.attempts;
        let title = match title.result {
            Ok(t) => t,
            Err(e) => return (target, attempts, Err(e)),
        };
        let body = translate_text(port, policy, article.body(), source, target).await;
        attempts += body.attempts;
        let res = body.result.map(|body| TranslatedText {
            title,
            body,
            summary: None,
        });
        (target, attempts, res)
    }))
    .await;

    let attempts = per_lang.iter().map(|(_, a, _)| *a).sum();
    let outcomes = per_lang.into_iter().map(|(l, _, r)| (l, r)).collect();
    per_language(stage, outcomes, attempts, StagePayload::Translations)
}

/// Adds translated summaries to the languages that already translated. The result
/// replaces the `translation` entry; summary failures downgrade it to `PartialSuccess`.
/// With `refresh` (the summary changed in this pass) every language is translated again.
async fn translate_summary(
    article: &Article,
    ctx: &StageContext<'_>,
    refresh: bool,
) -> Option<StageResult> {
    let port = ctx.caps.translator.as_ref()?;
    let summary = article.summary()?;
    let current = article.stage(StageName::Translation)?;
    let StagePayload::Translations(existing) = &current.payload else {
        return None;
    };
    let pending: Vec<LangCode> = existing
        .iter()
        .filter(|(_, t)| refresh || t.summary.is_none())
        .map(|(l, _)| *l)
        .collect();
    if pending.is_empty() {
        return None;
    }

    let source = article.source_language();
    let policy = &ctx.policies.translation;
    let outcomes = join_all(pending.iter().map(|&lang| async move {
        (lang, translate_text(port, policy, summary, source, lang).await)
    }))
    .await;

    let mut updated = current.clone();
    let retried: HashSet<String> = pending
        .iter()
        .map(|l| format!("{}:summary", l.code()))
        .collect();
    updated.issues.retain(|i| !retried.contains(&i.key));

    let mut map = existing.clone();
    for (lang, inv) in outcomes {
        updated.attempts += inv.attempts;
        let slot = map.get_mut(&lang);
        match inv.result {
            Ok(s) => {
                if let Some(t) = slot {
                    t.summary = Some(s);
                }
            }
            Err(e) => {
                // A translation of an older summary is stale now.
                if let Some(t) = slot {
                    t.summary = None;
                }
                updated.issues.push(StageIssue {
                    key: format!("{}:summary", lang.code()),
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
    }
    updated.payload = StagePayload::Translations(map);
    updated.outcome = match updated.outcome {
        StageOutcome::Success | StageOutcome::PartialSuccess if updated.issues.is_empty() => {
            StageOutcome::Success
        }
        StageOutcome::Success => StageOutcome::PartialSuccess,
        other => other,
    };
    Some(updated)
}

async fn summarize(article: &Article, ctx: &StageContext<'_>) -> StageResult {
    let stage = StageName::Summary;
    let Some(port) = &ctx.caps.summarizer else {
        return StageResult::skipped(stage);
    };
    let text = article.source_text();
    let lead = lead_sentences(text, FALLBACK_SUMMARY_CHARS);
    let fallback = (!lead.is_empty()).then(|| StagePayload::Summary(lead));

    runner::run(
        stage,
        port.gate.as_ref(),
        &ctx.policies.summary,
        || port.port.summarize(text),
        StagePayload::Summary,
        fallback,
    )
    .await
}

async fn extract_entities(article: &Article, ctx: &StageContext<'_>) -> StageResult {
    let stage = StageName::Entities;
    let Some(port) = &ctx.caps.extractor else {
        return StageResult::skipped(stage);
    };
    let text = article.source_text();
    runner::run(
        stage,
        port.gate.as_ref(),
        &ctx.policies.entities,
        || port.port.extract(text),
        StagePayload::Entities,
        None,
    )
    .await
}

async fn geotag(article: &Article, ctx: &StageContext<'_>) -> StageResult {
    let stage = StageName::Geotagging;
    let Some(port) = &ctx.caps.geocoder else {
        return StageResult::skipped(stage);
    };
    match article.outcome(StageName::Entities) {
        Some(StageOutcome::Success | StageOutcome::PartialSuccess) => {}
        Some(StageOutcome::Skipped) => return StageResult::skipped(stage),
        Some(StageOutcome::Failed) | None => {
            return StageResult::failed(
                stage,
                ErrorKind::DependencyFailed,
                "entity extraction did not succeed",
                0,
            )
        }
    }

    let mut seen = HashSet::new();
    let locations: Vec<&Entity> = article
        .entities()
        .iter()
        .filter(|e| e.category == EntityCategory::Location)
        .filter(|e| seen.insert(e.text.trim().to_lowercase()))
        .collect();
    if locations.is_empty() {
        return StageResult::success(stage, StagePayload::Geotags(Vec::new()), 0);
    }

    let policy = &ctx.policies.geotagging;
    let resolved = join_all(locations.into_iter().map(|entity| async move {
        let inv = invoke(stage, port.gate.as_ref(), policy, || {
            port.port.geocode(&entity.text)
        })
        .await;
        (entity, inv)
    }))
    .await;

    let mut attempts = 0;
    let mut tags = Vec::with_capacity(resolved.len());
    let mut issues = Vec::new();
    for (entity, inv) in resolved {
        attempts += inv.attempts;
        let mut tag = entity.clone();
        match inv.result {
            Ok(point) => {
                tag.coordinates = Some(point.coordinates);
                if tag.normalized.is_none() {
                    tag.normalized = point.resolved_name;
                }
            }
            Err(e) => issues.push(StageIssue {
                key: entity.text.clone(),
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
        tags.push(tag);
    }

    if issues.is_empty() {
        StageResult::success(stage, StagePayload::Geotags(tags), attempts)
    } else {
        StageResult::partial(stage, StagePayload::Geotags(tags), attempts, issues)
    }
}

/// Summary text to voice per language: the source summary for the source language, the
/// translated summary for every target that has one; the source language alone when no
/// target qualifies.
fn speech_jobs<'a>(article: &'a Article, summary: &'a str, targets: &LanguageSet) -> Vec<(LangCode, &'a str)> {
    let source = article.source_language();
    let translations = article.translations();
    let mut jobs: Vec<(LangCode, &str)> = targets
        .iter()
        .filter_map(|&lang| {
            if lang == source {
                return Some((lang, summary));
            }
            translations
                .and_then(|m| m.get(&lang))
                .and_then(|t| t.summary.as_deref())
                .map(|s| (lang, s))
        })
        .collect();
    if jobs.is_empty() {
        jobs.push((source, summary));
    }
    jobs
}

async fn synthesize(article: &Article, ctx: &StageContext<'_>) -> StageResult {
    let stage = StageName::Speech;
    let Some(port) = &ctx.caps.speech else {
        return StageResult::skipped(stage);
    };
    let summary = match (article.outcome(StageName::Summary), article.summary()) {
        (Some(StageOutcome::Skipped), _) => return StageResult::skipped(stage),
        (_, Some(s)) if !s.trim().is_empty() => s,
        _ => {
            return StageResult::failed(stage, ErrorKind::DependencyFailed, "no summary to voice", 0)
        }
    };

    let policy = &ctx.policies.speech;
    let per_lang = join_all(speech_jobs(article, summary, ctx.targets).into_iter().map(
        |(lang, text)| async move {
            if text.chars().count() < MIN_SPEECH_CHARS {
                let err = CapabilityError::Validation(format!(
                    "text shorter than {MIN_SPEECH_CHARS} characters"
                ));
                return (lang, Invocation::<AudioRef> {
                    result: Err(err),
                    attempts: 0,
                });
            }
            let inv = invoke(stage, port.gate.as_ref(), policy, || {
                port.port.synthesize(text, lang)
            })
            .await;
            (lang, inv)
        },
    ))
    .await;

    let attempts = per_lang.iter().map(|(_, inv)| inv.attempts).sum();
    let outcomes = per_lang.into_iter().map(|(l, inv)| (l, inv.result)).collect();
    per_language(stage, outcomes, attempts, StagePayload::Audio)
}
