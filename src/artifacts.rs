//! Artifact store: numbered text files inside the intermediates directory.
//!
//! An artifact write is the durability boundary of a step. Writes go through a
//! temp file in the same directory and are renamed into place, so a reader
//! never sees a half-written artifact.
use crate::paths::RunPaths;
use crate::util::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// What an artifact holds; only translations are deliverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Translation,
    Critique,
    Review,
}

/// Every artifact the pipeline can produce, in pipeline order.
///
/// File numbers are assigned independently of step ids: some steps produce a
/// critique and a revision under adjacent numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactId {
    InitialTranslation,
    ReviewCritique,
    RevisedTranslation,
    LinguisticCritique,
    LinguisticRevision,
    StyleCritique,
    StyleRevision,
    ExternalReview,
    ReviewApplied,
    FinalCritique,
    FinalTranslation,
}

impl ArtifactId {
    pub const ALL: [ArtifactId; 11] = [
        ArtifactId::InitialTranslation,
        ArtifactId::ReviewCritique,
        ArtifactId::RevisedTranslation,
        ArtifactId::LinguisticCritique,
        ArtifactId::LinguisticRevision,
        ArtifactId::StyleCritique,
        ArtifactId::StyleRevision,
        ArtifactId::ExternalReview,
        ArtifactId::ReviewApplied,
        ArtifactId::FinalCritique,
        ArtifactId::FinalTranslation,
    ];

    /// Two-digit file number.
    pub fn number(self) -> u32 {
        match self {
            ArtifactId::InitialTranslation => 1,
            ArtifactId::ReviewCritique => 2,
            ArtifactId::RevisedTranslation => 3,
            ArtifactId::LinguisticCritique => 4,
            ArtifactId::LinguisticRevision => 5,
            ArtifactId::StyleCritique => 6,
            ArtifactId::StyleRevision => 7,
            ArtifactId::ExternalReview => 8,
            ArtifactId::ReviewApplied => 9,
            ArtifactId::FinalCritique => 10,
            ArtifactId::FinalTranslation => 11,
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            ArtifactId::InitialTranslation => "initial_translation",
            ArtifactId::ReviewCritique => "review_critique",
            ArtifactId::RevisedTranslation => "revised_translation",
            ArtifactId::LinguisticCritique => "linguistic_critique",
            ArtifactId::LinguisticRevision => "linguistic_revision",
            ArtifactId::StyleCritique => "style_critique",
            ArtifactId::StyleRevision => "style_revision",
            ArtifactId::ExternalReview => "external_review",
            ArtifactId::ReviewApplied => "review_applied",
            ArtifactId::FinalCritique => "final_critique",
            ArtifactId::FinalTranslation => "final_translation",
        }
    }

    pub fn kind(self) -> ArtifactKind {
        match self {
            ArtifactId::ReviewCritique
            | ArtifactId::LinguisticCritique
            | ArtifactId::StyleCritique
            | ArtifactId::FinalCritique => ArtifactKind::Critique,
            ArtifactId::ExternalReview => ArtifactKind::Review,
            _ => ArtifactKind::Translation,
        }
    }

    /// Tag the LM wraps this artifact's payload in.
    pub fn tag(self) -> &'static str {
        match self.kind() {
            ArtifactKind::Translation => "translation",
            ArtifactKind::Critique => "critique",
            ArtifactKind::Review => "review",
        }
    }

    /// Stable key used in metrics and status output (`07_style_revision`).
    pub fn key(self) -> String {
        format!("{:02}_{}", self.number(), self.slug())
    }

    pub fn file_name(self) -> String {
        format!("{}.txt", self.key())
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.file_name() == name)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Reads and writes artifacts for one run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    paths: RunPaths,
}

impl ArtifactStore {
    pub fn new(paths: RunPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    pub fn path(&self, id: ArtifactId) -> PathBuf {
        self.paths.artifact_path(id)
    }

    /// Read an artifact, returning `None` when the file does not exist.
    pub fn read(&self, id: ArtifactId) -> Result<Option<String>> {
        let path = self.path(id);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Read an artifact only if it holds usable content.
    pub fn read_complete(&self, id: ArtifactId) -> Result<Option<String>> {
        Ok(self.read(id)?.filter(|text| !text.trim().is_empty()))
    }

    /// True iff the artifact exists and is non-empty. Unreadable files count
    /// as incomplete.
    pub fn is_complete(&self, id: ArtifactId) -> bool {
        matches!(self.read_complete(id), Ok(Some(_)))
    }

    /// Write an artifact atomically and return its path.
    pub fn write(&self, id: ArtifactId, text: &str) -> Result<PathBuf> {
        let path = self.path(id);
        write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }

    /// Map of recognized artifact files currently on disk.
    pub fn scan(&self) -> Result<BTreeMap<ArtifactId, PathBuf>> {
        let mut found = BTreeMap::new();
        let root = self.paths.root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(found),
            Err(err) => return Err(err).with_context(|| format!("read {}", root.display())),
        };
        for entry in entries {
            let entry = entry.with_context(|| format!("read {}", root.display()))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(id) = ArtifactId::from_file_name(name) {
                found.insert(id, entry.path());
            }
        }
        Ok(found)
    }
}
