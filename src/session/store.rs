//! Session persistence and resume reconciliation.
//!
//! `conversation_history.json` is the resume source for the conversation and
//! counters; artifacts on disk stay authoritative for step completion. History
//! writes are an audit trail and never abort a run.
use super::{Message, Session};
use crate::artifacts::{ArtifactId, ArtifactStore};
use crate::deps::DependencyValidator;
use crate::paths::RunPaths;
use crate::pipeline::{Pipeline, StepId};
use crate::util::{now_epoch_ms, write_atomic};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    pub timestamp: u64,
    pub label: String,
    pub step: u32,
    pub total_tokens: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost: f64,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub skipped_steps: Vec<StepId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub metadata: HistoryMetadata,
    pub conversation: Vec<Message>,
}

/// Result of the best-effort deliverable save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestEffortOutcome {
    pub artifact: ArtifactId,
    pub deliverable: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: RunPaths,
    artifacts: ArtifactStore,
}

impl SessionStore {
    pub fn new(paths: RunPaths) -> Self {
        let artifacts = ArtifactStore::new(paths.clone());
        Self { paths, artifacts }
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Read the raw snapshot, `None` when no run has been recorded yet.
    pub fn load_snapshot(&self) -> Result<Option<HistorySnapshot>> {
        let path = self.paths.history_json_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        let snapshot: HistorySnapshot =
            serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Restore a session and reconcile it with the artifacts on disk.
    ///
    /// The artifact map is rebuilt by scanning the intermediates directory.
    /// If the step the counter claims as complete has no usable artifact, the
    /// counter drops by exactly one: the only way to get there is that step's
    /// own write not finishing.
    pub fn load(&self, pipeline: &Pipeline) -> Result<Option<Session>> {
        let Some(snapshot) = self.load_snapshot()? else {
            return Ok(None);
        };
        let meta = snapshot.metadata;
        let mut session = Session {
            conversation: snapshot.conversation,
            step: meta.step.min(pipeline.len() as u32),
            total_input_tokens: meta.total_input_tokens,
            total_output_tokens: meta.total_output_tokens,
            estimated_cost: meta.estimated_cost,
            artifacts: self.artifacts.scan()?,
            completed_steps: meta.completed_steps,
            skipped_steps: meta.skipped_steps.into_iter().collect(),
        };

        if let Some(claimed) = StepId::from_number(session.step) {
            let validator = DependencyValidator::new(pipeline, &self.artifacts);
            if !validator.step_done(claimed, &session.skipped_steps) {
                tracing::warn!(
                    claimed = session.step,
                    resumed = session.step - 1,
                    "artifact for last recorded step missing or empty; stepping back"
                );
                session.step -= 1;
            }
        }
        tracing::info!(
            step = session.step,
            artifacts = session.artifacts.len(),
            messages = session.conversation.len(),
            "resumed session"
        );
        Ok(Some(session))
    }

    /// Persist the JSON snapshot and the human-readable transcript.
    /// Failures are logged; returns whether both writes succeeded.
    pub fn save(&self, session: &Session, label: &str) -> bool {
        let mut ok = true;
        if let Err(err) = self.write_snapshot(session, label) {
            tracing::warn!(error = %format!("{err:#}"), label, "failed to save conversation history");
            ok = false;
        }
        if let Err(err) = self.write_transcript(session, label) {
            tracing::warn!(error = %format!("{err:#}"), label, "failed to save conversation transcript");
            ok = false;
        }
        ok
    }

    fn write_snapshot(&self, session: &Session, label: &str) -> Result<()> {
        let snapshot = HistorySnapshot {
            metadata: HistoryMetadata {
                timestamp: now_epoch_ms()?,
                label: label.to_string(),
                step: session.step,
                total_tokens: session.total_tokens(),
                total_input_tokens: session.total_input_tokens,
                total_output_tokens: session.total_output_tokens,
                estimated_cost: session.estimated_cost,
                completed_steps: session.completed_steps.clone(),
                skipped_steps: session.skipped_steps.iter().copied().collect(),
            },
            conversation: session.conversation.clone(),
        };
        let text = serde_json::to_string_pretty(&snapshot).context("serialize history")?;
        write_atomic(&self.paths.history_json_path(), text.as_bytes())
    }

    fn write_transcript(&self, session: &Session, label: &str) -> Result<()> {
        let text = render_transcript(session, label);
        write_atomic(&self.paths.history_txt_path(), text.as_bytes())
    }

    /// Copy the most refined complete translation to the deliverable path.
    ///
    /// Translation artifacts are scanned latest stage first, ignoring skipped
    /// steps; the first non-empty one wins. Returns `None` when nothing usable
    /// exists.
    pub fn save_best_effort_final(
        &self,
        pipeline: &Pipeline,
        skipped: &BTreeSet<StepId>,
        deliverable: &Path,
    ) -> Result<Option<BestEffortOutcome>> {
        for artifact in pipeline.translation_artifacts_latest_first(skipped) {
            let Some(text) = self.artifacts.read_complete(artifact)? else {
                continue;
            };
            write_atomic(deliverable, text.as_bytes())?;
            tracing::info!(
                artifact = %artifact,
                deliverable = %deliverable.display(),
                "saved best available translation"
            );
            return Ok(Some(BestEffortOutcome {
                artifact,
                deliverable: deliverable.to_path_buf(),
            }));
        }
        tracing::warn!("no translation artifact available to save");
        Ok(None)
    }
}

fn render_transcript(session: &Session, label: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Conversation history ({label})");
    let _ = writeln!(
        out,
        "Step: {} | Tokens: {} (input {}, output {}) | Estimated cost: ${:.4}",
        session.step,
        session.total_tokens(),
        session.total_input_tokens,
        session.total_output_tokens,
        session.estimated_cost
    );
    if !session.completed_steps.is_empty() {
        let _ = writeln!(out, "Completed: {}", session.completed_steps.join("; "));
    }
    if !session.skipped_steps.is_empty() {
        let skipped: Vec<String> = session
            .skipped_steps
            .iter()
            .map(|id| id.number().to_string())
            .collect();
        let _ = writeln!(out, "Skipped steps: {}", skipped.join(", "));
    }
    for message in &session.conversation {
        let _ = writeln!(out);
        let _ = writeln!(out, "--- {} ---", message.role.as_str().to_uppercase());
        let _ = writeln!(out, "{}", message.content);
    }
    out
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
