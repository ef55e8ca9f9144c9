// src/orchestrator/plan.rs
//! The per-article stage graph as data: an ordered list of steps with declared
//! dependencies, grouped into layers that can run concurrently.

use crate::model::{Article, StageName, StageOutcome};
use crate::ports::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    /// Title + body into every target language except the source.
    Translate,
    /// Summary of the source-language body.
    Summarize,
    ExtractEntities,
    /// Geocode each extracted location.
    Geotag,
    /// Translate the summary into every language that translated successfully.
    /// Recorded under the `translation` stage.
    TranslateSummary,
    Synthesize,
}

/// Every step in declaration order.
pub const PIPELINE: [Step; 6] = [
    Step::Translate,
    Step::Summarize,
    Step::ExtractEntities,
    Step::Geotag,
    Step::TranslateSummary,
    Step::Synthesize,
];

impl Step {
    pub fn stage(self) -> StageName {
        match self {
            Step::Translate | Step::TranslateSummary => StageName::Translation,
            Step::Summarize => StageName::Summary,
            Step::ExtractEntities => StageName::Entities,
            Step::Geotag => StageName::Geotagging,
            Step::Synthesize => StageName::Speech,
        }
    }

    pub fn capability(self) -> Capability {
        match self {
            Step::Translate | Step::TranslateSummary => Capability::Translate,
            Step::Summarize => Capability::Summarize,
            Step::ExtractEntities => Capability::ExtractEntities,
            Step::Geotag => Capability::Geocode,
            Step::Synthesize => Capability::SynthesizeSpeech,
        }
    }

    pub fn depends_on(self) -> &'static [Step] {
        match self {
            Step::Translate | Step::Summarize | Step::ExtractEntities => &[],
            Step::Geotag => &[Step::ExtractEntities],
            Step::TranslateSummary => &[Step::Translate, Step::Summarize],
            Step::Synthesize => &[Step::Translate, Step::Summarize, Step::TranslateSummary],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Translate => "translate",
            Step::Summarize => "summarize",
            Step::ExtractEntities => "extract_entities",
            Step::Geotag => "geotag",
            Step::TranslateSummary => "translate_summary",
            Step::Synthesize => "synthesize",
        }
    }

    /// Whether an earlier pass already left a usable result for this step.
    pub fn is_satisfied(self, article: &Article) -> bool {
        match self {
            Step::TranslateSummary => {
                article.outcome(StageName::Translation) == Some(StageOutcome::Success)
                    && (article.summary().is_none()
                        || article
                            .translations()
                            .is_some_and(|m| m.values().all(|t| t.summary.is_some())))
            }
            step => article.outcome(step.stage()) == Some(StageOutcome::Success),
        }
    }
}

/// Group `steps` into layers: every step lands one layer after its deepest dependency.
/// Dependencies outside `steps` are ignored. Order inside a layer follows `steps`.
pub fn layers(steps: &[Step]) -> Vec<Vec<Step>> {
    fn depth(step: Step, steps: &[Step]) -> usize {
        step.depends_on()
            .iter()
            .filter(|d| steps.contains(d))
            .map(|d| depth(*d, steps) + 1)
            .max()
            .unwrap_or(0)
    }

    let mut out: Vec<Vec<Step>> = Vec::new();
    for &step in steps {
        let d = depth(step, steps);
        if out.len() <= d {
            out.resize_with(d + 1, Vec::new);
        }
        out[d].push(step);
    }
    out
}
