//! Typed paths into a run's intermediates directory.
//!
//! Centralizing path construction keeps file access consistent between the
//! controller, the session store and the status report.
use crate::artifacts::ArtifactId;
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating the files of a single run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    /// Create a new path helper rooted at the intermediates directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the intermediates directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `NN_<slug>.txt` path for an artifact.
    pub fn artifact_path(&self, id: ArtifactId) -> PathBuf {
        self.root.join(id.file_name())
    }

    /// Return the `conversation_history.json` path.
    pub fn history_json_path(&self) -> PathBuf {
        self.root.join("conversation_history.json")
    }

    /// Return the `conversation_history.txt` path.
    pub fn history_txt_path(&self) -> PathBuf {
        self.root.join("conversation_history.txt")
    }

    /// Return the `translation_metrics.json` path.
    pub fn metrics_path(&self) -> PathBuf {
        self.root.join("translation_metrics.json")
    }

    /// Return the `lm_log.jsonl` path.
    pub fn lm_log_path(&self) -> PathBuf {
        self.root.join("lm_log.jsonl")
    }
}

/// Path of the single externally visible deliverable:
/// `<input dir>/<basename>-<target language><ext>`.
pub fn deliverable_path(input: &Path, target_language: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "translation".to_string());
    let ext = input
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let language = target_language.trim().replace(char::is_whitespace, "_");
    let file_name = format!("{stem}-{language}{ext}");
    match input.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliverable_sits_next_to_input() {
        let path = deliverable_path(Path::new("/books/novel.txt"), "French");
        assert_eq!(path, PathBuf::from("/books/novel-French.txt"));
    }

    #[test]
    fn deliverable_without_extension() {
        let path = deliverable_path(Path::new("/books/novel"), "Brazilian Portuguese");
        assert_eq!(path, PathBuf::from("/books/novel-Brazilian_Portuguese"));
    }

    #[test]
    fn artifact_paths_use_numbered_file_names() {
        let paths = RunPaths::new(PathBuf::from("/tmp/run"));
        assert_eq!(
            paths.artifact_path(ArtifactId::StyleRevision),
            PathBuf::from("/tmp/run/07_style_revision.txt")
        );
    }
}
