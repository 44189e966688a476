//! Per-attempt LM log.
//!
//! Every generation attempt, successful or not, is appended to `lm_log.jsonl`
//! as one JSON object per line:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"step":3,"attempt":1,"outcome":"failed",...}
//! {"schema_version":1,"ts":1707900005000,"step":3,"attempt":2,"outcome":"success",...}
//! ```
use super::{Generation, LmError, LmErrorKind};
use crate::paths::RunPaths;
use crate::util::preview;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const LM_LOG_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_BYTES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmAttemptOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmLogEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the attempt finished.
    pub ts: u64,

    pub step: u32,
    pub step_name: String,

    /// 1-based attempt number within the step.
    pub attempt: u32,

    pub backend: String,
    pub model: String,
    pub duration_ms: u64,
    pub outcome: LmAttemptOutcome,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<LmErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,

    /// First ~500 bytes of the user prompt.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt_preview: Option<String>,
}

/// Builder that times one attempt.
pub struct LmLogBuilder {
    start: Instant,
    step: u32,
    step_name: String,
    attempt: u32,
    backend: String,
    model: String,
    prompt_preview: Option<String>,
}

impl LmLogBuilder {
    pub fn new(step: u32, step_name: &str, attempt: u32, backend: &str, model: &str) -> Self {
        Self {
            start: Instant::now(),
            step,
            step_name: step_name.to_string(),
            attempt,
            backend: backend.to_string(),
            model: model.to_string(),
            prompt_preview: None,
        }
    }

    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        self.prompt_preview = Some(preview(prompt, PROMPT_PREVIEW_BYTES));
        self
    }

    pub fn success(self, generation: &Generation) -> LmLogEntry {
        let mut entry = self.build(LmAttemptOutcome::Success);
        entry.input_tokens = Some(generation.input_tokens);
        entry.output_tokens = Some(generation.output_tokens);
        entry
    }

    pub fn failed(self, error: &LmError) -> LmLogEntry {
        let mut entry = self.build(LmAttemptOutcome::Failed);
        entry.error_kind = Some(error.kind);
        entry.error = Some(error.message.clone());
        entry
    }

    fn build(self, outcome: LmAttemptOutcome) -> LmLogEntry {
        LmLogEntry {
            schema_version: LM_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            step: self.step,
            step_name: self.step_name,
            attempt: self.attempt,
            backend: self.backend,
            model: self.model,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            input_tokens: None,
            output_tokens: None,
            error_kind: None,
            error: None,
            prompt_preview: self.prompt_preview,
        }
    }
}

pub fn append_lm_log(paths: &RunPaths, entry: &LmLogEntry) -> Result<()> {
    let log_path = paths.lm_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("create directory for lm_log")?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open lm_log for append: {}", log_path.display()))?;

    let line = serde_json::to_string(entry).context("serialize lm_log entry")?;
    writeln!(file, "{line}").context("write lm_log entry")?;
    Ok(())
}

/// Load all entries; corrupt lines are skipped with a warning.
pub fn load_lm_log(paths: &RunPaths) -> Result<Vec<LmLogEntry>> {
    let log_path = paths.lm_log_path();
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let file =
        File::open(&log_path).with_context(|| format!("open lm_log: {}", log_path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of lm_log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LmLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, error = %err, "skip corrupt lm_log entry");
            }
        }
    }

    Ok(entries)
}

// Log timestamps are informational; a clock before the epoch records zero.
fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
