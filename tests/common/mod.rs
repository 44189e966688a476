//! Shared test infrastructure for integration tests.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const SOURCE_TEXT: &str = "The lamps went out one by one.\n\nShe waited by the river.\n";

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// A scratch run: source file, intermediates directory and mock LM state.
pub struct RunFixture {
    pub temp_dir: TempDir,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub config: PathBuf,
    state_dir: PathBuf,
    fail_on: Option<String>,
}

impl RunFixture {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("story.txt");
        std::fs::write(&input, SOURCE_TEXT)?;
        let state_dir = temp_dir.path().join("mock-state");
        std::fs::create_dir_all(&state_dir)?;
        // An explicit config keeps any user-level config out of the run.
        let config = temp_dir.path().join("config.json");
        std::fs::write(&config, r#"{"schema_version": 1, "retry_delay_secs": 0}"#)?;
        Ok(Self {
            output_dir: temp_dir.path().join("work"),
            input,
            config,
            state_dir,
            fail_on: None,
            temp_dir,
        })
    }

    /// Make the mock LM refuse requests containing `needle`.
    pub fn fail_on(&mut self, needle: &str) {
        self.fail_on = Some(needle.to_string());
    }

    pub fn clear_failure(&mut self) {
        self.fail_on = None;
    }

    pub fn deliverable(&self) -> PathBuf {
        self.temp_dir.path().join("story-French.txt")
    }

    /// Number of requests the mock LM has received.
    pub fn lm_calls(&self) -> u32 {
        std::fs::read_to_string(self.state_dir.join("calls"))
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn lm_log_lines(&self) -> usize {
        std::fs::read_to_string(self.output_dir.join("lm_log.jsonl"))
            .map(|content| content.lines().count())
            .unwrap_or(0)
    }

    pub fn run(&self, extra: &[&str]) -> anyhow::Result<Output> {
        let mock = manifest_dir().join("tests/mock-lm.sh");
        let mut command = Command::new(env!("CARGO_BIN_EXE_littrans"));
        command
            .arg("run")
            .arg("--input")
            .arg(&self.input)
            .arg("--output-dir")
            .arg(&self.output_dir)
            .args(["--target-language", "French"])
            .args(["--backend", "command"])
            .arg("--lm")
            .arg(format!("sh '{}'", mock.display()))
            .arg("--config")
            .arg(&self.config)
            .args(extra)
            .env("MOCK_LM_STATE_DIR", &self.state_dir)
            .env_remove("MOCK_LM_FAIL_ON")
            .env_remove("RUST_LOG");
        if let Some(needle) = &self.fail_on {
            command.env("MOCK_LM_FAIL_ON", needle);
        }
        Ok(command.output()?)
    }

    pub fn status_json(&self) -> anyhow::Result<serde_json::Value> {
        let output = Command::new(env!("CARGO_BIN_EXE_littrans"))
            .args(["status", "--json", "--output-dir"])
            .arg(&self.output_dir)
            .output()?;
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "status failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}
