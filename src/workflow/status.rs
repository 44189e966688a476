//! `littrans status`: a read-only summary of a run directory.
use crate::artifacts::ArtifactStore;
use crate::cli::StatusArgs;
use crate::deps::DependencyValidator;
use crate::lm::{load_lm_log, LmAttemptOutcome};
use crate::paths::RunPaths;
use crate::pipeline::Pipeline;
use crate::session::{Session, SessionStore};
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepProgress {
    Complete,
    Skipped,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub key: String,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepStatus {
    pub number: u32,
    pub name: &'static str,
    pub optional: bool,
    pub state: StepProgress,
    /// Pending with every prerequisite done.
    pub ready: bool,
    pub artifacts: Vec<ArtifactStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub output_dir: String,
    pub started: bool,
    pub step: u32,
    pub total_steps: usize,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_label: Option<String>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost: f64,
    pub steps: Vec<StepStatus>,
    /// Key of the most refined complete translation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_translation: Option<String>,
    pub lm_attempts: usize,
    pub lm_failures: usize,
}

/// Summarize a run directory without modifying it.
pub fn build_status(paths: RunPaths, pipeline: &Pipeline) -> Result<StatusReport> {
    let store = SessionStore::new(paths.clone());
    let last_label = store
        .load_snapshot()?
        .map(|snapshot| snapshot.metadata.label);
    let loaded = store.load(pipeline)?;
    let started = loaded.is_some();
    let session = loaded.unwrap_or_else(Session::new);
    let artifacts = ArtifactStore::new(paths.clone());
    let validator = DependencyValidator::new(pipeline, &artifacts);

    let steps: Vec<StepStatus> = pipeline
        .steps()
        .iter()
        .map(|step| {
            let state = if step.optional && session.is_skipped(step.id) {
                StepProgress::Skipped
            } else if session.step >= step.id.number()
                && validator.step_done(step.id, &session.skipped_steps)
            {
                StepProgress::Complete
            } else {
                StepProgress::Pending
            };
            StepStatus {
                number: step.id.number(),
                name: step.name,
                optional: step.optional,
                state,
                ready: state == StepProgress::Pending
                    && validator.is_satisfied(step.id, &session.skipped_steps),
                artifacts: step
                    .outputs
                    .iter()
                    .map(|id| ArtifactStatus {
                        key: id.key(),
                        present: artifacts.is_complete(*id),
                    })
                    .collect(),
            }
        })
        .collect();

    let mut best_translation = None;
    for id in pipeline.translation_artifacts_latest_first(&session.skipped_steps) {
        if artifacts.is_complete(id) {
            best_translation = Some(id.key());
            break;
        }
    }

    let log = load_lm_log(&paths)?;
    let lm_failures = log
        .iter()
        .filter(|entry| entry.outcome == LmAttemptOutcome::Failed)
        .count();

    Ok(StatusReport {
        output_dir: paths.root().display().to_string(),
        started,
        step: session.step,
        total_steps: pipeline.len(),
        complete: steps
            .iter()
            .all(|step| step.state != StepProgress::Pending),
        last_label,
        total_input_tokens: session.total_input_tokens,
        total_output_tokens: session.total_output_tokens,
        estimated_cost: session.estimated_cost,
        steps,
        best_translation,
        lm_attempts: log.len(),
        lm_failures,
    })
}

pub fn run_status(args: &StatusArgs) -> Result<()> {
    let report = build_status(RunPaths::new(args.output_dir.clone()), &Pipeline::standard())?;
    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize status")?;
        println!("{text}");
        return Ok(());
    }
    print!("{}", render_status(&report));
    Ok(())
}

fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("run: {}\n", report.output_dir));
    if !report.started {
        out.push_str("status: not started\n");
        return out;
    }
    let summary = if report.complete { "complete" } else { "in progress" };
    out.push_str(&format!(
        "status: {summary} (step {}/{})\n",
        report.step, report.total_steps
    ));
    if let Some(label) = &report.last_label {
        out.push_str(&format!("last save: {label}\n"));
    }
    out.push_str(&format!(
        "tokens: {} in / {} out, estimated cost ${:.4}\n",
        report.total_input_tokens, report.total_output_tokens, report.estimated_cost
    ));
    out.push_str(&format!(
        "lm attempts: {} ({} failed)\n",
        report.lm_attempts, report.lm_failures
    ));
    for step in &report.steps {
        let state = match step.state {
            StepProgress::Complete => "complete",
            StepProgress::Skipped => "skipped",
            StepProgress::Pending => "pending",
        };
        let missing: Vec<&str> = step
            .artifacts
            .iter()
            .filter(|artifact| !artifact.present)
            .map(|artifact| artifact.key.as_str())
            .collect();
        out.push_str(&format!("  {}. {:<22} {state}", step.number, step.name));
        if step.ready {
            out.push_str(" (next)");
        }
        if !missing.is_empty() && step.state != StepProgress::Skipped {
            out.push_str(&format!(" (missing {})", missing.join(", ")));
        }
        out.push('\n');
    }
    match &report.best_translation {
        Some(key) => out.push_str(&format!("best translation: {key}\n")),
        None => out.push_str("best translation: none yet\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactId;
    use crate::pipeline::StepId;

    #[test]
    fn empty_directory_is_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let report = build_status(
            RunPaths::new(dir.path().to_path_buf()),
            &Pipeline::standard(),
        )
        .unwrap();
        assert!(!report.started);
        assert!(!report.complete);
        assert!(report.best_translation.is_none());
        assert!(render_status(&report).contains("not started"));
    }

    #[test]
    fn partial_run_reports_each_step() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path().to_path_buf());
        let store = SessionStore::new(paths.clone());
        for id in &ArtifactId::ALL[..7] {
            store.artifacts().write(*id, "text").unwrap();
        }
        let mut session = Session::new();
        session.step = 5;
        session.total_input_tokens = 10;
        session.skipped_steps.insert(StepId::ExternalReview);
        session.skipped_steps.insert(StepId::ApplyReview);
        store.save(&session, "step 4: style pass complete");

        let report = build_status(paths, &Pipeline::standard()).unwrap();
        let states: Vec<StepProgress> = report.steps.iter().map(|step| step.state).collect();
        assert_eq!(
            states,
            vec![
                StepProgress::Complete,
                StepProgress::Complete,
                StepProgress::Complete,
                StepProgress::Complete,
                StepProgress::Skipped,
                StepProgress::Skipped,
                StepProgress::Pending,
            ]
        );
        assert_eq!(report.best_translation.as_deref(), Some("07_style_revision"));
        assert_eq!(report.last_label.as_deref(), Some("step 4: style pass complete"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][4]["state"], "skipped");
        assert_eq!(json["steps"][6]["ready"], true);
        assert_eq!(json["steps"][3]["ready"], false);
        assert_eq!(json["total_input_tokens"], 10);
    }
}
