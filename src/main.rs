//! littrans: a resumable seven-step literary translation pipeline.
mod artifacts;
mod cli;
mod config;
mod context;
mod cost;
mod deps;
mod extract;
mod interrupt;
mod lm;
mod logging;
mod metrics;
mod paths;
mod pipeline;
mod session;
mod util;
mod workflow;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = cli::RootArgs::parse();
    logging::init_logging(args.command.verbose());

    let result = match &args.command {
        cli::Command::Run(run) => interrupt::install()
            .and_then(|()| workflow::run_translate(run, interrupt::flag())),
        cli::Command::Status(status) => workflow::run_status(status),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            match err.downcast_ref::<workflow::PipelineError>() {
                Some(workflow::PipelineError::Interrupted { .. }) => ExitCode::from(130),
                None => ExitCode::FAILURE,
            }
        }
    }
}
