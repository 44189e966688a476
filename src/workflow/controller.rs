//! Workflow controller: walks the step table, skipping completed steps,
//! regressing to missing prerequisites and running everything else.
use super::executor::StepExecutor;
use super::PipelineError;
use crate::artifacts::ArtifactId;
use crate::deps::DependencyValidator;
use crate::pipeline::{Pipeline, StepId};
use crate::session::{Session, SessionStore};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending(StepId),
    Running(StepId),
    Complete(StepId),
    Regressed { from: StepId, to: StepId },
    Terminal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub final_artifact: ArtifactId,
    pub final_text: String,
    /// Steps that called the generation service in this invocation.
    pub executed: Vec<StepId>,
    /// Optional steps skipped after failing in this invocation.
    pub failed_optional: Vec<StepId>,
    pub regressions: usize,
    /// Generation attempts made in this invocation, retries included.
    pub attempts: u32,
    pub artifacts_written: usize,
    pub cost: f64,
}

pub struct Controller<'a> {
    pipeline: &'a Pipeline,
    store: &'a SessionStore,
    interrupted: &'a AtomicBool,
    transitions: Vec<StepState>,
}

impl<'a> Controller<'a> {
    pub fn new(pipeline: &'a Pipeline, store: &'a SessionStore, interrupted: &'a AtomicBool) -> Self {
        Self {
            pipeline,
            store,
            interrupted,
            transitions: Vec::new(),
        }
    }

    /// Every state entered so far, in order.
    pub fn transitions(&self) -> &[StepState] {
        &self.transitions
    }

    /// Drive the pipeline to completion and return the terminal translation.
    pub fn execute(
        &mut self,
        session: &mut Session,
        executor: &mut StepExecutor<'_>,
    ) -> Result<RunOutcome> {
        let steps = self.pipeline.steps();
        if steps.is_empty() {
            return Err(anyhow!("pipeline has no steps"));
        }
        let mut outcome = RunOutcome {
            final_artifact: ArtifactId::InitialTranslation,
            final_text: String::new(),
            executed: Vec::new(),
            failed_optional: Vec::new(),
            regressions: 0,
            attempts: 0,
            artifacts_written: 0,
            cost: 0.0,
        };
        let mut index = 0;
        while index < steps.len() {
            let step = &steps[index];
            let number = step.id.number();
            if self.transitions.last() != Some(&StepState::Pending(step.id)) {
                self.transition(StepState::Pending(step.id));
            }
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(PipelineError::Interrupted {
                    completed: session.step,
                }
                .into());
            }

            let validator = DependencyValidator::new(self.pipeline, self.store.artifacts());
            if validator.step_done(step.id, &session.skipped_steps)
                && (session.step >= number || session.is_skipped(step.id))
            {
                if session.step < number {
                    session.step = number;
                    self.store.save(session, &format!("{} skipped", step.label()));
                    tracing::info!(step = %step.label(), "skipping optional step");
                } else {
                    tracing::debug!(step = %step.label(), "already complete");
                }
                self.transition(StepState::Complete(step.id));
                index += 1;
                continue;
            }

            if let Some(missing) = validator.missing_prerequisite(step.id, &session.skipped_steps) {
                outcome.regressions += 1;
                if outcome.regressions > steps.len() {
                    return Err(anyhow!(
                        "{}: prerequisites still missing after {} regressions",
                        step.label(),
                        steps.len()
                    ));
                }
                let target = self
                    .pipeline
                    .index_of(missing)
                    .filter(|target| *target < index)
                    .ok_or_else(|| {
                        anyhow!(
                            "{} depends on step {missing}, which does not precede it",
                            step.label()
                        )
                    })?;
                tracing::warn!(
                    step = %step.label(),
                    missing = %missing,
                    "prerequisite artifact missing or empty; regressing"
                );
                session.step = session.step.min(missing.number() - 1);
                self.transition(StepState::Regressed {
                    from: step.id,
                    to: missing,
                });
                self.transition(StepState::Pending(missing));
                index = target;
                continue;
            }

            self.transition(StepState::Running(step.id));
            match executor.execute(step, session) {
                Ok(step_outcome) => {
                    outcome.executed.push(step.id);
                    outcome.attempts += step_outcome.attempts;
                    outcome.artifacts_written += step_outcome.artifacts.len();
                    outcome.cost += step_outcome.cost.total_cost;
                    session.step = number;
                    session.record_completed(step.label());
                    self.store.save(session, &format!("{} complete", step.label()));
                }
                Err(err) if step.optional && !is_interruption(&err) => {
                    tracing::warn!(
                        step = %step.label(),
                        error = %format!("{err:#}"),
                        "optional step failed; continuing without it"
                    );
                    session.skipped_steps.insert(step.id);
                    session
                        .skipped_steps
                        .extend(self.pipeline.optional_dependents(step.id));
                    session.step = number;
                    outcome.failed_optional.push(step.id);
                    self.store
                        .save(session, &format!("{} skipped after failure", step.label()));
                }
                Err(err) => return Err(err),
            }
            self.transition(StepState::Complete(step.id));
            index += 1;
        }

        for artifact in self
            .pipeline
            .translation_artifacts_latest_first(&session.skipped_steps)
        {
            if let Some(text) = self.store.artifacts().read_complete(artifact)? {
                outcome.final_artifact = artifact;
                outcome.final_text = text;
                self.transition(StepState::Terminal);
                return Ok(outcome);
            }
        }
        Err(anyhow!("pipeline finished without a translation artifact"))
    }

    fn transition(&mut self, state: StepState) {
        tracing::debug!(?state, "controller transition");
        self.transitions.push(state);
    }
}

fn is_interruption(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Interrupted { .. })
    )
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
