//! Runs one pipeline step end to end: prompt assembly, conversation branch
//! handling, bounded retries, extraction, artifact writes and accounting.
use crate::artifacts::ArtifactId;
use crate::context;
use crate::cost::{CallCost, CostTracker};
use crate::extract::extract_or_full;
use crate::lm::{
    append_lm_log, Generation, GenerationParams, GenerationService, LmError, LmErrorKind,
    LmLogBuilder,
};
use crate::metrics::record_metrics;
use crate::pipeline::{Branch, Pipeline, PromptContext, StepDescriptor};
use crate::session::{Message, Role, Session, SessionStore};
use crate::workflow::PipelineError;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Bounded retry policy for generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub artifacts: Vec<(ArtifactId, PathBuf)>,
    pub attempts: u32,
    pub cost: CallCost,
}

pub struct StepExecutor<'a> {
    service: &'a dyn GenerationService,
    store: &'a SessionStore,
    pipeline: &'a Pipeline,
    params: &'a GenerationParams,
    retry: RetryPolicy,
    prompt: PromptContext<'a>,
    costs: CostTracker,
    interrupted: Option<&'a AtomicBool>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        service: &'a dyn GenerationService,
        store: &'a SessionStore,
        pipeline: &'a Pipeline,
        params: &'a GenerationParams,
        retry: RetryPolicy,
        prompt: PromptContext<'a>,
    ) -> Self {
        Self {
            service,
            store,
            pipeline,
            params,
            retry,
            prompt,
            costs: CostTracker::new(),
            interrupted: None,
        }
    }

    /// Stop retrying once `flag` is set.
    pub fn with_interrupt_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupted = Some(flag);
        self
    }

    /// Execute `step` against `session`. On success every output artifact is
    /// on disk and the session totals include the call; the step counter is
    /// left to the controller.
    pub fn execute(&mut self, step: &StepDescriptor, session: &mut Session) -> Result<StepOutcome> {
        let label = step.label();
        let inputs = self.resolve_inputs(step, session)?;
        let system = step.system_prompt(&self.prompt);
        let user = step.build_prompt(&self.prompt, &inputs);

        // Independent steps talk to a throwaway conversation.
        let mut branch: Option<Vec<Message>> = None;
        match step.branch {
            Branch::Reset => {
                session.reset_conversation(&system);
                session.conversation.push(Message::user(user.as_str()));
            }
            Branch::Continue => {
                session.ensure_system_message(&system);
                drop_stale_exchange(&mut session.conversation, &user);
                context::trim(&mut session.conversation, &self.params.model);
                session.conversation.push(Message::user(user.as_str()));
            }
            Branch::Independent => {
                branch = Some(vec![Message::system(system), Message::user(user.as_str())]);
            }
        }
        self.store.save(session, &format!("{label} - request"));

        let (generation, attempts) = self.generate_with_retry(step, &user, session, &mut branch)?;

        if branch.is_none() {
            session
                .conversation
                .push(Message::assistant(generation.content.as_str()));
        }
        let cost = self.costs.record(
            session,
            &self.params.model,
            generation.input_tokens,
            generation.output_tokens,
        );
        self.store.save(session, &format!("{label} - response"));

        let mut written = Vec::with_capacity(step.outputs.len());
        for id in step.outputs {
            let (text, fallback) = extract_or_full(&generation.content, id.tag());
            if fallback {
                tracing::warn!(
                    step = %label,
                    artifact = %id,
                    tag = id.tag(),
                    "response missing tagged section; saving full response"
                );
            }
            if text.trim().is_empty() {
                return Err(anyhow!("{label}: response for {id} is empty"));
            }
            let path = self.store.artifacts().write(*id, &text)?;
            session.artifacts.insert(*id, path.clone());
            tracing::info!(step = %label, artifact = %id, bytes = text.len(), "artifact saved");
            written.push((*id, path));
        }

        for id in step.translation_outputs() {
            let Some(text) = self.store.artifacts().read_complete(id)? else {
                continue;
            };
            if let Err(err) = record_metrics(
                &self.store.paths().metrics_path(),
                &id.key(),
                self.prompt.source_text,
                &text,
            ) {
                tracing::warn!(artifact = %id, error = %format!("{err:#}"), "failed to record metrics");
            }
        }

        tracing::info!(
            step = %label,
            attempts,
            input_tokens = generation.input_tokens,
            output_tokens = generation.output_tokens,
            input_cost = cost.input_cost,
            output_cost = cost.output_cost,
            total_tokens = session.total_tokens(),
            total_cost = session.estimated_cost,
            "step complete"
        );

        Ok(StepOutcome {
            artifacts: written,
            attempts,
            cost,
        })
    }

    /// Text for each prompt placeholder: the first complete candidate whose
    /// producing step is not recorded as skipped.
    fn resolve_inputs(
        &self,
        step: &StepDescriptor,
        session: &Session,
    ) -> Result<BTreeMap<&'static str, String>> {
        let mut inputs = BTreeMap::new();
        for input in step.inputs {
            let mut resolved = None;
            for candidate in input.candidates {
                let skipped = self
                    .pipeline
                    .producer(*candidate)
                    .is_some_and(|producer| session.is_skipped(producer));
                if skipped {
                    tracing::debug!(
                        step = %step.label(),
                        artifact = %candidate,
                        "ignoring output of skipped step"
                    );
                    continue;
                }
                if let Some(text) = self.store.artifacts().read_complete(*candidate)? {
                    resolved = Some(text);
                    break;
                }
            }
            let text = resolved.ok_or_else(|| {
                anyhow!(
                    "{}: no usable artifact for {}",
                    step.label(),
                    input.placeholder
                )
            })?;
            inputs.insert(input.placeholder, text);
        }
        Ok(inputs)
    }

    /// Call the service until it succeeds, fails fatally, or attempts run out.
    /// The session is persisted before every retry; the first context-length
    /// rejection prunes the active conversation once.
    fn generate_with_retry(
        &self,
        step: &StepDescriptor,
        user_prompt: &str,
        session: &mut Session,
        branch: &mut Option<Vec<Message>>,
    ) -> Result<(Generation, u32)> {
        let label = step.label();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut pruned = false;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let log = LmLogBuilder::new(
                step.id.number(),
                step.name,
                attempt,
                self.service.name(),
                &self.params.model,
            )
            .with_prompt_preview(user_prompt);
            let messages = branch.as_deref().unwrap_or(session.conversation.as_slice());
            let result = self.service.generate(messages, self.params);

            let err = match result {
                Ok(generation) => {
                    self.log_attempt(&log.success(&generation));
                    return Ok((generation, attempt));
                }
                Err(err) => {
                    self.log_attempt(&log.failed(&err));
                    err
                }
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(attempts_exhausted(&label, attempt, err));
            }
            if self
                .interrupted
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                return Err(anyhow::Error::new(err).context(PipelineError::Interrupted {
                    completed: session.step,
                }));
            }
            if err.kind == LmErrorKind::ContextLength && !pruned {
                match branch.as_mut() {
                    Some(messages) => context::prune_aggressive(messages),
                    None => context::prune_aggressive(&mut session.conversation),
                }
                pruned = true;
                tracing::warn!(step = %label, "context length exceeded; pruned conversation");
            }
            tracing::warn!(
                step = %label,
                attempt,
                max_attempts,
                error = %err,
                delay_ms = self.retry.delay.as_millis() as u64,
                "generation failed; retrying"
            );
            self.store
                .save(session, &format!("{label} - retry after attempt {attempt}"));
            if !self.retry.delay.is_zero() {
                std::thread::sleep(self.retry.delay);
            }
        }
    }

    fn log_attempt(&self, entry: &crate::lm::LmLogEntry) {
        if let Err(err) = append_lm_log(self.store.paths(), entry) {
            tracing::warn!(error = %format!("{err:#}"), "failed to append lm_log entry");
        }
    }
}

/// Remove what an earlier attempt at this step left at the end of a
/// continued conversation: an unanswered request, or the same request
/// together with its reply when the step runs again.
fn drop_stale_exchange(conversation: &mut Vec<Message>, prompt: &str) {
    let len = conversation.len();
    if len > 1 && conversation[len - 1].role == Role::User {
        conversation.pop();
        return;
    }
    if len > 2
        && conversation[len - 1].role == Role::Assistant
        && conversation[len - 2].role == Role::User
        && conversation[len - 2].content == prompt
    {
        conversation.truncate(len - 2);
    }
}

fn attempts_exhausted(label: &str, attempts: u32, err: LmError) -> anyhow::Error {
    let summary = if err.is_retryable() {
        format!("{label} failed after {attempts} attempt(s)")
    } else {
        format!("{label} failed")
    };
    anyhow::Error::new(err).context(summary)
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
