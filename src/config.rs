//! Run settings.
//!
//! Each setting resolves from the CLI flag, then the JSON config file, then
//! the environment, then a built-in default.
use crate::cli::RunArgs;
use crate::lm::{BackendKind, GenerationParams, ReasoningEffort};
use crate::workflow::RetryPolicy;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 16_384;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

pub const ENV_LM_COMMAND: &str = "LITTRANS_LM_COMMAND";
pub const ENV_MODEL: &str = "LITTRANS_MODEL";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// On-disk config (`config.json`). Every field except the schema version is
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_base_url: Option<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: BackendKind,
    pub lm_command: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub params: GenerationParams,
}

/// Default location of the user config file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("littrans").join("config.json"))
}

/// Load the config named on the command line, or the default one if present.
pub fn load_config_file(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.is_file() => path,
            _ => return Ok(None),
        },
    };
    let config = load_config(&path)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(Some(config))
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: FileConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

pub fn validate_config(config: &FileConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if let Some(model) = config.model.as_deref() {
        if model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
    }
    if let Some(command) = config.lm_command.as_deref() {
        if command.trim().is_empty() {
            return Err(anyhow!("lm_command must be non-empty"));
        }
    }
    validate_retries(config.retries)?;
    validate_temperature(config.temperature)?;
    validate_max_output_tokens(config.max_output_tokens)?;
    if config.request_timeout_secs == Some(0) {
        return Err(anyhow!("request_timeout_secs must be positive"));
    }
    for (label, url) in [
        ("openai_base_url", &config.openai_base_url),
        ("anthropic_base_url", &config.anthropic_base_url),
    ] {
        if let Some(url) = url.as_deref() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!("{label} must be an http(s) URL (got {url:?})"));
            }
        }
    }
    Ok(())
}

fn validate_retries(retries: Option<u32>) -> Result<()> {
    if retries == Some(0) {
        return Err(anyhow!("retries must be at least 1"));
    }
    Ok(())
}

fn validate_temperature(temperature: Option<f32>) -> Result<()> {
    if let Some(value) = temperature {
        if !value.is_finite() || !(0.0..=2.0).contains(&value) {
            return Err(anyhow!("temperature must be between 0 and 2 (got {value})"));
        }
    }
    Ok(())
}

fn validate_max_output_tokens(tokens: Option<u32>) -> Result<()> {
    if tokens == Some(0) {
        return Err(anyhow!("max_output_tokens must be positive"));
    }
    Ok(())
}

/// Backend used when none is configured: a configured command wins, then
/// Claude model names select Anthropic, anything else OpenAI.
pub fn infer_backend(model: &str, has_command: bool) -> BackendKind {
    if has_command {
        BackendKind::Command
    } else if model.to_ascii_lowercase().starts_with("claude") {
        BackendKind::Anthropic
    } else {
        BackendKind::OpenAi
    }
}

/// Merge CLI flags, the config file and the environment into [`Settings`].
pub fn resolve_settings<F>(args: &RunArgs, file: Option<&FileConfig>, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());
    let file = file.cloned().unwrap_or_default();

    validate_retries(args.retries)?;
    validate_temperature(args.temperature)?;
    validate_max_output_tokens(args.max_output_tokens)?;

    let model = args
        .model
        .clone()
        .or(file.model)
        .or_else(|| env(ENV_MODEL))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let lm_command = args
        .lm
        .clone()
        .or(file.lm_command)
        .or_else(|| env(ENV_LM_COMMAND));
    let backend = args
        .backend
        .or(file.backend)
        .unwrap_or_else(|| infer_backend(&model, lm_command.is_some()));

    let retry = RetryPolicy {
        max_attempts: args.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
        delay: Duration::from_secs(
            args.retry_delay_secs
                .or(file.retry_delay_secs)
                .unwrap_or(DEFAULT_RETRY_DELAY_SECS),
        ),
    };
    let params = GenerationParams {
        model,
        max_output_tokens: args
            .max_output_tokens
            .or(file.max_output_tokens)
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        temperature: args
            .temperature
            .or(file.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE),
        reasoning_effort: args.reasoning_effort.or(file.reasoning_effort),
    };

    Ok(Settings {
        backend,
        lm_command,
        openai_api_key: env(ENV_OPENAI_API_KEY),
        anthropic_api_key: env(ENV_ANTHROPIC_API_KEY),
        openai_base_url: file
            .openai_base_url
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        anthropic_base_url: file
            .anthropic_base_url
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
        request_timeout: Duration::from_secs(
            file.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        ),
        retry,
        params,
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
