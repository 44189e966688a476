//! Generation service boundary.
//!
//! The pipeline only sees [`GenerationService`]: an ordered message list in,
//! text plus token usage out, or an [`LmError`] classified so the executor can
//! decide whether to retry, prune, or give up.
mod anthropic;
mod command;
mod log;
mod openai;

pub use anthropic::AnthropicService;
pub use command::CommandService;
pub use log::{append_lm_log, load_lm_log, LmAttemptOutcome, LmLogBuilder, LmLogEntry};
pub use openai::OpenAiService;

use crate::config::Settings;
use crate::session::Message;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which backend serves generation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Command,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Command => "command",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

/// Per-request generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// A successful generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmErrorKind {
    /// Worth retrying after a delay.
    Transient,
    /// The request exceeded the model's context window.
    ContextLength,
    /// Retrying cannot help.
    Fatal,
}

impl fmt::Display for LmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LmErrorKind::Transient => f.write_str("transient"),
            LmErrorKind::ContextLength => f.write_str("context length"),
            LmErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind} LM error: {message}")]
pub struct LmError {
    pub kind: LmErrorKind,
    pub message: String,
}

impl LmError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: LmErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn context_length(message: impl Into<String>) -> Self {
        Self {
            kind: LmErrorKind::ContextLength,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: LmErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != LmErrorKind::Fatal
    }
}

/// External system turning a message list into generated text.
pub trait GenerationService {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> std::result::Result<Generation, LmError>;
}

/// Build the configured backend.
pub fn build_service(settings: &Settings) -> Result<Box<dyn GenerationService>> {
    match settings.backend {
        BackendKind::Command => {
            let command = settings.lm_command.as_deref().ok_or_else(|| {
                anyhow!("command backend needs --lm, lm_command in config, or LITTRANS_LM_COMMAND")
            })?;
            Ok(Box::new(CommandService::new(command)?))
        }
        BackendKind::OpenAi => {
            let key = settings
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;
            Ok(Box::new(OpenAiService::new(
                &settings.openai_base_url,
                key,
                settings.request_timeout,
            )))
        }
        BackendKind::Anthropic => {
            let key = settings
                .anthropic_api_key
                .clone()
                .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY is not set"))?;
            Ok(Box::new(AnthropicService::new(
                &settings.anthropic_base_url,
                key,
                settings.request_timeout,
            )))
        }
    }
}

/// Classify an HTTP failure from a chat API.
pub(crate) fn classify_http_failure(status: u16, body: &str) -> LmErrorKind {
    if mentions_context_length(body) {
        return LmErrorKind::ContextLength;
    }
    match status {
        408 | 409 | 425 | 429 | 500..=599 => LmErrorKind::Transient,
        _ => LmErrorKind::Fatal,
    }
}

pub(crate) fn mentions_context_length(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    [
        "context_length_exceeded",
        "maximum context length",
        "context window",
        "prompt is too long",
        "too many tokens",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}
