//! Translation length metrics, persisted for reporting only.
use crate::util::{char_count, word_count, write_atomic};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Words per minute assumed for reading time.
const READING_WORDS_PER_MINUTE: usize = 200;

/// Key of the source entry in `translation_metrics.json`.
pub const SOURCE_KEY: &str = "source";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMetrics {
    pub source_word_count: usize,
    pub target_word_count: usize,
    pub source_char_count: usize,
    pub target_char_count: usize,
    /// Target words per source word.
    pub ratio: f64,
    /// Minutes, rounded up.
    pub estimated_reading_time: usize,
}

impl TextMetrics {
    pub fn compute(source: &str, target: &str) -> Self {
        let source_word_count = word_count(source);
        let target_word_count = word_count(target);
        let ratio = if source_word_count == 0 {
            0.0
        } else {
            target_word_count as f64 / source_word_count as f64
        };
        Self {
            source_word_count,
            target_word_count,
            source_char_count: char_count(source),
            target_char_count: char_count(target),
            ratio: (ratio * 100.0).round() / 100.0,
            estimated_reading_time: target_word_count.div_ceil(READING_WORDS_PER_MINUTE),
        }
    }
}

pub type MetricsFile = BTreeMap<String, TextMetrics>;

pub fn load_metrics(path: &Path) -> Result<MetricsFile> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).with_context(|| format!("parse {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(MetricsFile::new()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Insert or replace one entry (plus the source entry) and rewrite the file.
pub fn record_metrics(path: &Path, key: &str, source: &str, target: &str) -> Result<TextMetrics> {
    let mut metrics = load_metrics(path).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "discarding unreadable metrics file");
        MetricsFile::new()
    });
    metrics
        .entry(SOURCE_KEY.to_string())
        .or_insert_with(|| TextMetrics::compute(source, source));
    let entry = TextMetrics::compute(source, target);
    metrics.insert(key.to_string(), entry.clone());
    let text = serde_json::to_string_pretty(&metrics).context("serialize metrics")?;
    write_atomic(path, text.as_bytes())?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_counts_and_ratio() {
        let metrics = TextMetrics::compute("one two three four", "un deux trois quatre cinq");
        assert_eq!(metrics.source_word_count, 4);
        assert_eq!(metrics.target_word_count, 5);
        assert_eq!(metrics.ratio, 1.25);
        assert_eq!(metrics.estimated_reading_time, 1);
        assert_eq!(metrics.target_char_count, 25);
    }

    #[test]
    fn empty_source_has_zero_ratio() {
        let metrics = TextMetrics::compute("", "texte");
        assert_eq!(metrics.ratio, 0.0);
    }

    #[test]
    fn reading_time_rounds_up() {
        let target = "mot ".repeat(401);
        assert_eq!(TextMetrics::compute("a", &target).estimated_reading_time, 3);
    }

    #[test]
    fn record_adds_source_and_artifact_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translation_metrics.json");
        record_metrics(&path, "01_initial_translation", "a b", "x y z").unwrap();
        record_metrics(&path, "03_revised_translation", "a b", "x y").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["source"]["sourceWordCount"], 2);
        assert_eq!(value["source"]["ratio"], 1.0);
        assert_eq!(value["01_initial_translation"]["targetWordCount"], 3);
        assert_eq!(value["03_revised_translation"]["ratio"], 1.0);
        assert!(value["03_revised_translation"]["estimatedReadingTime"].is_number());
    }
}
