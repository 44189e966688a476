//! `littrans run`: resolve settings, restore the session, drive the pipeline
//! and publish the deliverable. Any failure leaves the best available
//! translation at the deliverable path.
use super::controller::Controller;
use super::executor::StepExecutor;
use crate::cli::RunArgs;
use crate::config::{load_config_file, resolve_settings};
use crate::lm::build_service;
use crate::paths::{deliverable_path, RunPaths};
use crate::pipeline::{Pipeline, PromptContext, StepId};
use crate::session::{Session, SessionStore};
use crate::util::{display_path, write_atomic};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;

pub fn run_translate(args: &RunArgs, interrupted: &AtomicBool) -> Result<()> {
    let file_config = load_config_file(args.config.as_deref())?;
    let settings = resolve_settings(args, file_config.as_ref(), |key| std::env::var(key).ok())?;

    let target_language = args.target_language.trim();
    if target_language.is_empty() {
        return Err(anyhow!("--target-language must be non-empty"));
    }
    let source_text = read_source(&args.input)?;
    let instructions = read_instructions(args)?;
    let service = build_service(&settings)?;

    let pipeline = Pipeline::standard();
    let deliverable = deliverable_path(&args.input, target_language);
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("create {}", args.output_dir.display()))?;
    let store = SessionStore::new(RunPaths::new(args.output_dir.clone()));
    let mut session = match store.load(&pipeline)? {
        Some(session) => {
            if (session.step as usize) < pipeline.len() {
                eprintln!(
                    "run: resuming after step {} of {}",
                    session.step,
                    pipeline.len()
                );
            }
            session
        }
        None => Session::new(),
    };
    if args.skip_external_review {
        mark_review_skipped(&pipeline, &mut session);
    }

    tracing::info!(
        input = %args.input.display(),
        target_language,
        backend = %settings.backend,
        model = %settings.params.model,
        max_attempts = settings.retry.max_attempts,
        "starting translation"
    );

    let prompt = PromptContext {
        source_text: &source_text,
        source_language: args
            .source_language
            .as_deref()
            .map(str::trim)
            .filter(|language| !language.is_empty()),
        target_language,
        instructions: instructions.as_deref(),
    };
    let mut executor = StepExecutor::new(
        service.as_ref(),
        &store,
        &pipeline,
        &settings.params,
        settings.retry,
        prompt,
    )
    .with_interrupt_flag(interrupted);
    let mut controller = Controller::new(&pipeline, &store, interrupted);

    match controller.execute(&mut session, &mut executor) {
        Ok(outcome) => {
            write_atomic(&deliverable, outcome.final_text.as_bytes())?;
            tracing::info!(
                artifact = %outcome.final_artifact,
                deliverable = %deliverable.display(),
                attempts = outcome.attempts,
                artifacts_written = outcome.artifacts_written,
                regressions = outcome.regressions,
                transitions = controller.transitions().len(),
                "translation published"
            );
            eprintln!(
                "run: complete ({} step(s) executed, ${:.4} this run; {} tokens, ${:.4} total)",
                outcome.executed.len(),
                outcome.cost,
                session.total_tokens(),
                session.estimated_cost
            );
            if !outcome.failed_optional.is_empty() {
                eprintln!("run: external review unavailable; continued without it");
            }
            println!("{}", display_path(&deliverable, None));
            Ok(())
        }
        Err(err) => {
            store.save(&session, &format!("stopped after step {}", session.step));
            match store.save_best_effort_final(&pipeline, &session.skipped_steps, &deliverable) {
                Ok(Some(saved)) => eprintln!(
                    "run: saved best available translation ({}) to {}",
                    saved.artifact,
                    saved.deliverable.display()
                ),
                Ok(None) => eprintln!("run: no translation available to save yet"),
                Err(save_err) => tracing::warn!(
                    error = %format!("{save_err:#}"),
                    "best-effort save failed"
                ),
            }
            Err(err)
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read input {}", path.display()))?;
    if text.trim().is_empty() {
        return Err(anyhow!("input {} is empty", path.display()));
    }
    Ok(text)
}

fn read_instructions(args: &RunArgs) -> Result<Option<String>> {
    let text = match (&args.instructions, &args.instructions_file) {
        (Some(text), _) => Some(text.clone()),
        (None, Some(path)) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("read instructions {}", path.display()))?,
        ),
        (None, None) => None,
    };
    Ok(text.filter(|text| !text.trim().is_empty()))
}

/// Record the external review and everything optional that needs it as
/// skipped. The record persists with the session.
fn mark_review_skipped(pipeline: &Pipeline, session: &mut Session) {
    if pipeline.get(StepId::ExternalReview).is_none() {
        return;
    }
    session.skipped_steps.insert(StepId::ExternalReview);
    session
        .skipped_steps
        .extend(pipeline.optional_dependents(StepId::ExternalReview));
    tracing::info!(
        skipped = ?session.skipped_steps,
        "external review disabled for this run"
    );
}
