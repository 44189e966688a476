//! Pipeline orchestration: the controller state machine, the step executor
//! and the `run`/`status` commands built on them.
mod controller;
mod executor;
mod run;
mod status;
#[cfg(test)]
mod testing;

pub use controller::{Controller, RunOutcome, StepState};
pub use executor::{RetryPolicy, StepExecutor, StepOutcome};
pub use run::run_translate;
pub use status::{build_status, run_status, StatusReport};

/// Errors the caller must tell apart from ordinary failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("interrupted; last completed step is {completed}")]
    Interrupted { completed: u32 },
}
