//! End-to-end runs of the `littrans` binary against a mock LM command.
#![cfg(unix)]

mod common;

use common::{read, RunFixture};

#[test]
fn full_run_publishes_deliverable_and_resumes_idempotently() {
    let fixture = RunFixture::new().expect("fixture");

    let output = fixture.run(&[]).expect("spawn littrans");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(fixture.lm_calls(), 7);
    assert_eq!(read(&fixture.deliverable()), "Traduction 7.");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim().ends_with("story-French.txt"), "stdout: {stdout}");

    for name in [
        "01_initial_translation.txt",
        "02_review_critique.txt",
        "08_external_review.txt",
        "11_final_translation.txt",
        "conversation_history.json",
        "conversation_history.txt",
        "translation_metrics.json",
    ] {
        assert!(fixture.output_dir.join(name).is_file(), "missing {name}");
    }

    let status = fixture.status_json().expect("status");
    assert_eq!(status["step"], 7);
    assert_eq!(status["complete"], true);
    assert_eq!(status["best_translation"], "11_final_translation");
    assert_eq!(status["lm_attempts"], 7);

    // Everything is on disk; a second run makes no calls.
    let again = fixture.run(&[]).expect("spawn littrans");
    assert!(again.status.success());
    assert_eq!(fixture.lm_calls(), 7);
    assert_eq!(fixture.lm_log_lines(), 7);
    assert_eq!(read(&fixture.deliverable()), "Traduction 7.");
}

#[test]
fn failed_step_saves_best_effort_and_resume_finishes() {
    let mut fixture = RunFixture::new().expect("fixture");
    fixture.fail_on("one last time");

    let output = fixture.run(&["--retries", "2"]).expect("spawn littrans");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("step 7: final polish failed"), "stderr: {stderr}");
    assert_eq!(fixture.lm_calls(), 8);
    // Best effort is the application of the external review.
    assert_eq!(read(&fixture.deliverable()), "Traduction 6.");

    let status = fixture.status_json().expect("status");
    assert_eq!(status["step"], 6);
    assert_eq!(status["complete"], false);
    assert_eq!(status["lm_failures"], 2);
    assert_eq!(status["steps"][6]["state"], "pending");

    fixture.clear_failure();
    let resumed = fixture.run(&[]).expect("spawn littrans");
    assert!(
        resumed.status.success(),
        "resume failed: {}",
        String::from_utf8_lossy(&resumed.stderr)
    );
    assert_eq!(fixture.lm_calls(), 9);
    assert_eq!(read(&fixture.deliverable()), "Traduction 9.");
}

#[test]
fn skipping_external_review_runs_five_steps() {
    let fixture = RunFixture::new().expect("fixture");

    let output = fixture
        .run(&["--skip-external-review"])
        .expect("spawn littrans");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(fixture.lm_calls(), 5);
    assert!(!fixture.output_dir.join("08_external_review.txt").exists());
    assert_eq!(read(&fixture.deliverable()), "Traduction 5.");

    let status = fixture.status_json().expect("status");
    assert_eq!(status["steps"][4]["state"], "skipped");
    assert_eq!(status["steps"][5]["state"], "skipped");
    assert_eq!(status["complete"], true);
}

#[test]
fn failing_optional_review_is_skipped() {
    let mut fixture = RunFixture::new().expect("fixture");
    fixture.fail_on("seeing it for the first time");

    let output = fixture.run(&["--retries", "1"]).expect("spawn littrans");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    // Four steps, one failed review, the final polish.
    assert_eq!(fixture.lm_calls(), 6);
    assert_eq!(read(&fixture.deliverable()), "Traduction 6.");
    assert!(!fixture.output_dir.join("09_review_applied.txt").exists());
}

#[test]
fn empty_input_is_rejected_without_calls() {
    let fixture = RunFixture::new().expect("fixture");
    std::fs::write(&fixture.input, "\n").expect("truncate input");

    let output = fixture.run(&[]).expect("spawn littrans");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("is empty"));
    assert_eq!(fixture.lm_calls(), 0);
    assert!(!fixture.deliverable().exists());
}
