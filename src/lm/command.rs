//! Local command backend.
//!
//! Delegates generation to a user-configured command (`llm`, a wrapper
//! script, a local model runner). The request is written to stdin as JSON:
//!
//! ```json
//! {"model":"gpt-4o","max_output_tokens":16384,"temperature":0.7,
//!  "messages":[{"role":"system","content":"..."},{"role":"user","content":"..."}]}
//! ```
//!
//! The command answers on stdout either with plain text or with
//! `{"content":"...","input_tokens":N,"output_tokens":M}`. Plain text usage is
//! estimated from character counts.
use super::{mentions_context_length, Generation, GenerationParams, GenerationService, LmError};
use crate::context::{estimate_text_tokens, estimate_tokens};
use crate::session::Message;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CommandService {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    model: &'a str,
    max_output_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct CommandResponse {
    content: String,
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

impl CommandService {
    /// Parse the command line and resolve the program on `PATH`.
    pub fn new(command: &str) -> Result<Self> {
        let mut args =
            shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        if args.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        let name = args.remove(0);
        let program = which::which(&name)
            .with_context(|| format!("LM command not found on PATH: {name}"))?;
        Ok(Self { program, args })
    }
}

impl GenerationService for CommandService {
    fn name(&self) -> &str {
        "command"
    }

    fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Generation, LmError> {
        let request = CommandRequest {
            model: &params.model,
            max_output_tokens: params.max_output_tokens,
            temperature: params.temperature,
            reasoning_effort: params.reasoning_effort.map(|effort| effort.as_str()),
            messages,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|err| LmError::fatal(format!("serialize LM request: {err}")))?;

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                LmError::fatal(format!(
                    "spawn LM command {}: {err}",
                    self.program.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that exits without reading stdin surfaces below as a
            // non-zero status; a broken pipe alone is not an error.
            if let Err(err) = stdin.write_all(&payload) {
                if err.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(LmError::transient(format!("write prompt to LM stdin: {err}")));
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|err| LmError::transient(format!("wait for LM command: {err}")))?;
        let duration = start.elapsed();

        tracing::info!(
            elapsed_ms = duration.as_millis() as u64,
            request_bytes = payload.len(),
            response_bytes = output.stdout.len(),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            );
            if mentions_context_length(&stderr) {
                return Err(LmError::context_length(message));
            }
            return Err(LmError::transient(message));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|err| LmError::transient(format!("decode LM stdout as UTF-8: {err}")))?;
        let mut generation = parse_command_output(&stdout, messages);
        generation.duration = duration;
        if generation.content.trim().is_empty() {
            return Err(LmError::transient("LM command produced no output"));
        }
        Ok(generation)
    }
}

/// Accept the JSON envelope when present, otherwise treat stdout as the reply.
fn parse_command_output(stdout: &str, messages: &[Message]) -> Generation {
    let trimmed = stdout.trim();
    if trimmed.starts_with('{') {
        if let Ok(response) = serde_json::from_str::<CommandResponse>(trimmed) {
            let output_tokens = response
                .output_tokens
                .unwrap_or_else(|| estimate_text_tokens(&response.content) as u64);
            return Generation {
                input_tokens: response
                    .input_tokens
                    .unwrap_or_else(|| estimate_tokens(messages) as u64),
                output_tokens,
                content: response.content,
                duration: Default::default(),
            };
        }
    }
    Generation {
        content: trimmed.to_string(),
        input_tokens: estimate_tokens(messages) as u64,
        output_tokens: estimate_text_tokens(trimmed) as u64,
        duration: Default::default(),
    }
}
