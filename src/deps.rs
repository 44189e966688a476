//! Dependency validation over artifacts on disk.
//!
//! Checks read the artifact store directly and mutate nothing, so they are
//! safe to repeat during forward execution and resume reconciliation.
use crate::artifacts::ArtifactStore;
use crate::pipeline::{Pipeline, StepDescriptor, StepId};
use std::collections::BTreeSet;

pub struct DependencyValidator<'a> {
    pipeline: &'a Pipeline,
    store: &'a ArtifactStore,
}

impl<'a> DependencyValidator<'a> {
    pub fn new(pipeline: &'a Pipeline, store: &'a ArtifactStore) -> Self {
        Self { pipeline, store }
    }

    /// Every output artifact of the step exists and is non-empty.
    pub fn outputs_complete(&self, step: &StepDescriptor) -> bool {
        step.outputs.iter().all(|id| self.store.is_complete(*id))
    }

    /// The step either produced its outputs or is an optional step recorded
    /// as skipped.
    pub fn step_done(&self, id: StepId, skipped: &BTreeSet<StepId>) -> bool {
        let Some(step) = self.pipeline.get(id) else {
            return false;
        };
        if step.optional && skipped.contains(&id) {
            return true;
        }
        self.outputs_complete(step)
    }

    /// True iff every prerequisite of `id` is done.
    pub fn is_satisfied(&self, id: StepId, skipped: &BTreeSet<StepId>) -> bool {
        self.missing_prerequisite(id, skipped).is_none()
    }

    /// Highest prerequisite of `id` that is not done, if any.
    pub fn missing_prerequisite(&self, id: StepId, skipped: &BTreeSet<StepId>) -> Option<StepId> {
        let step = self.pipeline.get(id)?;
        step.depends_on
            .iter()
            .copied()
            .filter(|dep| !self.step_done(*dep, skipped))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactId;
    use crate::paths::RunPaths;

    fn fixture() -> (tempfile::TempDir, ArtifactStore, Pipeline) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = ArtifactStore::new(RunPaths::new(dir.path().to_path_buf()));
        (dir, store, Pipeline::standard())
    }

    #[test]
    fn first_step_is_always_satisfied() {
        let (_dir, store, pipeline) = fixture();
        let validator = DependencyValidator::new(&pipeline, &store);
        assert!(validator.is_satisfied(StepId::Translate, &BTreeSet::new()));
    }

    #[test]
    fn step_with_two_outputs_needs_both() {
        let (_dir, store, pipeline) = fixture();
        let validator = DependencyValidator::new(&pipeline, &store);
        store.write(ArtifactId::InitialTranslation, "t1").unwrap();
        store.write(ArtifactId::ReviewCritique, "c2").unwrap();
        assert!(validator.is_satisfied(StepId::SelfReview, &BTreeSet::new()));
        assert!(!validator.is_satisfied(StepId::LinguisticPass, &BTreeSet::new()));
        assert_eq!(
            validator.missing_prerequisite(StepId::LinguisticPass, &BTreeSet::new()),
            Some(StepId::SelfReview)
        );

        store.write(ArtifactId::RevisedTranslation, "t3").unwrap();
        assert!(validator.is_satisfied(StepId::LinguisticPass, &BTreeSet::new()));
    }

    #[test]
    fn empty_artifact_does_not_satisfy() {
        let (_dir, store, pipeline) = fixture();
        let validator = DependencyValidator::new(&pipeline, &store);
        std::fs::write(store.path(ArtifactId::InitialTranslation), "").unwrap();
        assert!(!validator.is_satisfied(StepId::SelfReview, &BTreeSet::new()));
    }

    #[test]
    fn skipped_optional_steps_count_as_done() {
        let (_dir, store, pipeline) = fixture();
        let validator = DependencyValidator::new(&pipeline, &store);
        for id in [ArtifactId::StyleCritique, ArtifactId::StyleRevision] {
            store.write(id, "text").unwrap();
        }
        let none = BTreeSet::new();
        assert_eq!(
            validator.missing_prerequisite(StepId::FinalPolish, &none),
            Some(StepId::ApplyReview)
        );

        let skipped = BTreeSet::from([StepId::ExternalReview, StepId::ApplyReview]);
        assert!(validator.is_satisfied(StepId::FinalPolish, &skipped));
    }

    #[test]
    fn skip_marker_is_ignored_for_required_steps() {
        let (_dir, store, pipeline) = fixture();
        let validator = DependencyValidator::new(&pipeline, &store);
        let skipped = BTreeSet::from([StepId::Translate]);
        assert!(!validator.step_done(StepId::Translate, &skipped));
    }

    #[test]
    fn highest_missing_prerequisite_wins() {
        let (_dir, store, pipeline) = fixture();
        let validator = DependencyValidator::new(&pipeline, &store);
        // Neither StylePass nor ApplyReview is done.
        assert_eq!(
            validator.missing_prerequisite(StepId::FinalPolish, &BTreeSet::new()),
            Some(StepId::ApplyReview)
        );
    }
}
