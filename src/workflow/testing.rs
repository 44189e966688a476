//! In-memory generation service and run fixture shared by workflow tests.
use super::executor::{RetryPolicy, StepExecutor};
use crate::lm::{Generation, GenerationParams, GenerationService, LmError, LmErrorKind};
use crate::paths::RunPaths;
use crate::pipeline::{Pipeline, PromptContext};
use crate::session::{Message, Role, SessionStore};
use std::cell::RefCell;
use std::time::Duration;

/// Text that only appears in the external review prompt.
pub const EXTERNAL_REVIEW_MARKER: &str = "seeing it for the first time";
/// Text that only appears in the linguistic pass prompt.
pub const LINGUISTIC_PASS_MARKER: &str = "grammar, idiom, collocation";

pub const SOURCE_TEXT: &str = "The sea was calm that night, and the lighthouse slept.";

struct FailureRule {
    needle: &'static str,
    kind: LmErrorKind,
    remaining: Option<u32>,
}

/// Replies with every artifact tag filled in, unless a failure rule matches
/// the latest user prompt.
#[derive(Default)]
pub struct ScriptedService {
    requests: RefCell<Vec<Vec<Message>>>,
    rules: RefCell<Vec<FailureRule>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail requests whose user prompt contains `needle`; `times: None` fails
    /// forever.
    pub fn failing(self, needle: &'static str, kind: LmErrorKind, times: Option<u32>) -> Self {
        self.rules.borrow_mut().push(FailureRule {
            needle,
            kind,
            remaining: times,
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.borrow().clone()
    }
}

impl GenerationService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        messages: &[Message],
        _params: &GenerationParams,
    ) -> Result<Generation, LmError> {
        self.requests.borrow_mut().push(messages.to_vec());
        let call = self.requests.borrow().len();
        let prompt = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.clone())
            .unwrap_or_default();

        for rule in self.rules.borrow_mut().iter_mut() {
            if !prompt.contains(rule.needle) || rule.remaining == Some(0) {
                continue;
            }
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(LmError {
                kind: rule.kind,
                message: format!("scripted failure on call {call}"),
            });
        }

        Ok(Generation {
            content: format!(
                "<critique>Critique {call}.</critique>\n<translation>Translation {call}.</translation>\n<review>Review {call}.</review>"
            ),
            input_tokens: 1_000,
            output_tokens: 500,
            duration: Duration::ZERO,
        })
    }
}

/// Temp run directory plus the settings every workflow test needs.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub store: SessionStore,
    pub pipeline: Pipeline,
    pub params: GenerationParams,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = SessionStore::new(RunPaths::new(dir.path().join("work")));
        Self {
            dir,
            store,
            pipeline: Pipeline::standard(),
            params: GenerationParams {
                model: "gpt-4o".to_string(),
                max_output_tokens: 4_096,
                temperature: 0.7,
                reasoning_effort: None,
            },
        }
    }

    pub fn prompt(&self) -> PromptContext<'static> {
        PromptContext {
            source_text: SOURCE_TEXT,
            source_language: Some("English"),
            target_language: "French",
            instructions: None,
        }
    }

    pub fn executor<'a>(&'a self, service: &'a ScriptedService, attempts: u32) -> StepExecutor<'a> {
        StepExecutor::new(
            service,
            &self.store,
            &self.pipeline,
            &self.params,
            RetryPolicy {
                max_attempts: attempts,
                delay: Duration::ZERO,
            },
            self.prompt(),
        )
    }
}
