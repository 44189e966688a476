//! The fixed translation pipeline as a table of step descriptors.
//!
//! The controller indexes into this table instead of branching on step
//! numbers, so the sequence is data. Prompt wording lives in `prompts/` and is
//! treated as opaque template text.
use crate::artifacts::{ArtifactId, ArtifactKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const SYSTEM_TRANSLATOR: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/system_translator.md"
));
const SYSTEM_REVIEWER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/system_reviewer.md"
));
const TRANSLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/translate.md"));
const SELF_REVIEW: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/self_review.md"
));
const LINGUISTIC_PASS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/linguistic_pass.md"
));
const STYLE_PASS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/style_pass.md"
));
const EXTERNAL_REVIEW: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/external_review.md"
));
const APPLY_REVIEW: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/apply_review.md"
));
const FINAL_POLISH: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/final_polish.md"
));

/// Ordinal identity of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Translate,
    SelfReview,
    LinguisticPass,
    StylePass,
    ExternalReview,
    ApplyReview,
    FinalPolish,
}

impl StepId {
    pub const ALL: [StepId; 7] = [
        StepId::Translate,
        StepId::SelfReview,
        StepId::LinguisticPass,
        StepId::StylePass,
        StepId::ExternalReview,
        StepId::ApplyReview,
        StepId::FinalPolish,
    ];

    pub fn number(self) -> u32 {
        match self {
            StepId::Translate => 1,
            StepId::SelfReview => 2,
            StepId::LinguisticPass => 3,
            StepId::StylePass => 4,
            StepId::ExternalReview => 5,
            StepId::ApplyReview => 6,
            StepId::FinalPolish => 7,
        }
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.number() == number)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// How a step's request relates to the running conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Append to the accumulated conversation (trimmed to budget).
    Continue,
    /// Replace the conversation with a fresh system message first.
    Reset,
    /// Separate conversation; the reply is not kept in the primary transcript.
    Independent,
}

/// A prior artifact fed into a prompt placeholder. The first complete
/// candidate wins, which lets a step fall back past skipped optional steps.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput {
    pub placeholder: &'static str,
    pub candidates: &'static [ArtifactId],
}

/// Per-run values shared by every prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub source_text: &'a str,
    pub source_language: Option<&'a str>,
    pub target_language: &'a str,
    pub instructions: Option<&'a str>,
}

/// Static configuration of one pipeline stage.
#[derive(Debug, Clone)]
pub struct StepDescriptor {
    pub id: StepId,
    pub name: &'static str,
    pub system_template: &'static str,
    pub template: &'static str,
    pub inputs: &'static [PromptInput],
    pub outputs: &'static [ArtifactId],
    pub depends_on: &'static [StepId],
    pub branch: Branch,
    pub optional: bool,
}

impl StepDescriptor {
    /// Human-readable label recorded in the session (`step 3: linguistic pass`).
    pub fn label(&self) -> String {
        format!("step {}: {}", self.id.number(), self.name)
    }

    pub fn system_prompt(&self, ctx: &PromptContext<'_>) -> String {
        render(self.system_template, ctx, &BTreeMap::new())
    }

    /// Build the user prompt from the run context and resolved artifact text
    /// keyed by placeholder.
    pub fn build_prompt(
        &self,
        ctx: &PromptContext<'_>,
        inputs: &BTreeMap<&'static str, String>,
    ) -> String {
        render(self.template, ctx, inputs)
    }

    /// Translation artifacts this step produces.
    pub fn translation_outputs(&self) -> impl Iterator<Item = ArtifactId> + '_ {
        self.outputs
            .iter()
            .copied()
            .filter(|id| id.kind() == ArtifactKind::Translation)
    }
}

fn render(
    template: &str,
    ctx: &PromptContext<'_>,
    inputs: &BTreeMap<&'static str, String>,
) -> String {
    let source_language = ctx
        .source_language
        .map(str::to_string)
        .unwrap_or_else(|| "the source language (detect it from the text)".to_string());
    let instructions = ctx
        .instructions
        .map(|text| format!("Additional instructions:\n{}", text.trim()))
        .unwrap_or_default();
    let mut rendered = template
        .replace("{source_language}", &source_language)
        .replace("{target_language}", ctx.target_language)
        .replace("{instructions}", &instructions);
    for (placeholder, text) in inputs {
        rendered = rendered.replace(placeholder, text);
    }
    // Source last so text inside the source cannot be mistaken for placeholders.
    rendered.replace("{source_text}", ctx.source_text)
}

const STANDARD_STEPS: [StepDescriptor; 7] = [
    StepDescriptor {
        id: StepId::Translate,
        name: "initial translation",
        system_template: SYSTEM_TRANSLATOR,
        template: TRANSLATE,
        inputs: &[],
        outputs: &[ArtifactId::InitialTranslation],
        depends_on: &[],
        branch: Branch::Reset,
        optional: false,
    },
    StepDescriptor {
        id: StepId::SelfReview,
        name: "self review",
        system_template: SYSTEM_TRANSLATOR,
        template: SELF_REVIEW,
        inputs: &[PromptInput {
            placeholder: "{translation}",
            candidates: &[ArtifactId::InitialTranslation],
        }],
        outputs: &[ArtifactId::ReviewCritique, ArtifactId::RevisedTranslation],
        depends_on: &[StepId::Translate],
        branch: Branch::Continue,
        optional: false,
    },
    StepDescriptor {
        id: StepId::LinguisticPass,
        name: "linguistic pass",
        system_template: SYSTEM_TRANSLATOR,
        template: LINGUISTIC_PASS,
        inputs: &[PromptInput {
            placeholder: "{translation}",
            candidates: &[ArtifactId::RevisedTranslation],
        }],
        outputs: &[ArtifactId::LinguisticCritique, ArtifactId::LinguisticRevision],
        depends_on: &[StepId::SelfReview],
        branch: Branch::Continue,
        optional: false,
    },
    StepDescriptor {
        id: StepId::StylePass,
        name: "style pass",
        system_template: SYSTEM_TRANSLATOR,
        template: STYLE_PASS,
        inputs: &[PromptInput {
            placeholder: "{translation}",
            candidates: &[ArtifactId::LinguisticRevision],
        }],
        outputs: &[ArtifactId::StyleCritique, ArtifactId::StyleRevision],
        depends_on: &[StepId::LinguisticPass],
        branch: Branch::Continue,
        optional: false,
    },
    StepDescriptor {
        id: StepId::ExternalReview,
        name: "external review",
        system_template: SYSTEM_REVIEWER,
        template: EXTERNAL_REVIEW,
        inputs: &[PromptInput {
            placeholder: "{translation}",
            candidates: &[ArtifactId::StyleRevision],
        }],
        outputs: &[ArtifactId::ExternalReview],
        depends_on: &[StepId::StylePass],
        branch: Branch::Independent,
        optional: true,
    },
    StepDescriptor {
        id: StepId::ApplyReview,
        name: "apply external review",
        system_template: SYSTEM_TRANSLATOR,
        template: APPLY_REVIEW,
        inputs: &[
            PromptInput {
                placeholder: "{translation}",
                candidates: &[ArtifactId::StyleRevision],
            },
            PromptInput {
                placeholder: "{review}",
                candidates: &[ArtifactId::ExternalReview],
            },
        ],
        outputs: &[ArtifactId::ReviewApplied],
        depends_on: &[StepId::StylePass, StepId::ExternalReview],
        branch: Branch::Reset,
        optional: true,
    },
    StepDescriptor {
        id: StepId::FinalPolish,
        name: "final polish",
        system_template: SYSTEM_TRANSLATOR,
        template: FINAL_POLISH,
        inputs: &[PromptInput {
            placeholder: "{translation}",
            candidates: &[ArtifactId::ReviewApplied, ArtifactId::StyleRevision],
        }],
        outputs: &[ArtifactId::FinalCritique, ArtifactId::FinalTranslation],
        depends_on: &[StepId::StylePass, StepId::ApplyReview],
        branch: Branch::Continue,
        optional: false,
    },
];

/// Ordered step table driving the controller.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<StepDescriptor>,
}

impl Pipeline {
    /// The full seven-step translation pipeline.
    pub fn standard() -> Self {
        Self {
            steps: STANDARD_STEPS.to_vec(),
        }
    }

    /// The first `len` steps of this pipeline.
    #[cfg(test)]
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            steps: self.steps.iter().take(len).cloned().collect(),
        }
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn get(&self, id: StepId) -> Option<&StepDescriptor> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Position of a step in the table.
    pub fn index_of(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    /// Optional steps that (transitively) depend on `id`, excluding `id`.
    pub fn optional_dependents(&self, id: StepId) -> BTreeSet<StepId> {
        let mut affected = BTreeSet::from([id]);
        for step in &self.steps {
            if step.optional && step.depends_on.iter().any(|dep| affected.contains(dep)) {
                affected.insert(step.id);
            }
        }
        affected.remove(&id);
        affected
    }

    /// Step that writes `artifact`.
    pub fn producer(&self, artifact: ArtifactId) -> Option<StepId> {
        self.steps
            .iter()
            .find(|step| step.outputs.contains(&artifact))
            .map(|step| step.id)
    }

    /// Translation artifacts, latest stage first. Outputs of skipped steps are
    /// left out: files they left behind belong to an earlier run.
    pub fn translation_artifacts_latest_first(
        &self,
        skipped: &BTreeSet<StepId>,
    ) -> Vec<ArtifactId> {
        let mut artifacts: Vec<ArtifactId> = self
            .steps
            .iter()
            .filter(|step| !skipped.contains(&step.id))
            .flat_map(|step| step.translation_outputs())
            .collect();
        artifacts.sort();
        artifacts.reverse();
        artifacts
    }
}
