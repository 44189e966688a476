//! CLI argument parsing for the translation pipeline.
use crate::lm::{BackendKind, ReasoningEffort};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "littrans",
    version,
    about = "Resumable multi-pass literary translation driven by an LM",
    after_help = "Commands:\n  run --input <file> --output-dir <dir> --target-language <lang>  Run or resume a translation\n  status --output-dir <dir>                                       Summarize a run directory\n\nExamples:\n  littrans run --input novel.txt --output-dir work/novel --target-language French\n  littrans run --input poem.md --output-dir work/poem --target-language German --backend command --lm 'llm -m gpt-4o'\n  littrans status --output-dir work/novel --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Status(StatusArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Run(args) => args.verbose,
            Command::Status(args) => args.verbose,
        }
    }
}

/// Run command inputs. Unset options fall back to the config file, then the
/// environment, then built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(about = "Run the translation pipeline, resuming from the output directory")]
pub struct RunArgs {
    /// Source text to translate
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Intermediates directory holding artifacts and the session history
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Language to translate into
    #[arg(long, value_name = "LANG")]
    pub target_language: String,

    /// Language of the source text (detected by the model when omitted)
    #[arg(long, value_name = "LANG")]
    pub source_language: Option<String>,

    /// Model name passed to the backend and used for pricing and context limits
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Generation backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// LM command for the command backend (parsed with shell words)
    #[arg(long, value_name = "COMMAND")]
    pub lm: Option<String>,

    /// Total generation attempts per step
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Fixed delay between attempts
    #[arg(long, value_name = "SECS")]
    pub retry_delay_secs: Option<u64>,

    /// Skip the external review and its application
    #[arg(long)]
    pub skip_external_review: bool,

    /// Extra instructions added to every step prompt
    #[arg(long, value_name = "TEXT", conflicts_with = "instructions_file")]
    pub instructions: Option<String>,

    /// Read extra instructions from a file
    #[arg(long, value_name = "FILE")]
    pub instructions_file: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub reasoning_effort: Option<ReasoningEffort>,

    #[arg(long, value_name = "N")]
    pub max_output_tokens: Option<u32>,

    #[arg(long, value_name = "T")]
    pub temperature: Option<f32>,

    /// JSON config file (default: <config dir>/littrans/config.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long)]
    pub verbose: bool,
}

/// Status command inputs for a single run directory.
#[derive(Parser, Debug, Clone)]
#[command(about = "Summarize progress, usage and the best available translation")]
pub struct StatusArgs {
    /// Intermediates directory of the run
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    #[arg(long)]
    pub verbose: bool,
}
