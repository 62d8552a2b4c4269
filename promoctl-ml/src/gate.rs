//! Artifact-backed quality gate.

use crate::artifact::ModelArtifact;
use crate::dataset::Dataset;
use crate::error::MlError;
use crate::metrics::accuracy;
use crate::split;
use async_trait::async_trait;
use promoctl_core::{ModelVersion, PromotionError, QualityGate, SplitPolicy};

/// Scores a version by loading its artifact and measuring accuracy on the
/// pinned evaluation rows.
#[derive(Debug, Clone)]
pub struct ArtifactGate {
    policy: SplitPolicy,
    evaluation: Dataset,
}

impl ArtifactGate {
    /// Gate over `dataset`, restricted to the rows `policy` selects.
    pub fn new(dataset: &Dataset, policy: SplitPolicy) -> Result<Self, MlError> {
        let evaluation = split::apply(&policy, dataset);
        if evaluation.is_empty() {
            return Err(MlError::evaluation(format!(
                "split {policy:?} selects no rows from {} available",
                dataset.len()
            )));
        }
        Ok(Self { policy, evaluation })
    }

    /// Gate over the embedded iris dataset.
    pub fn iris(policy: SplitPolicy) -> Result<Self, MlError> {
        Self::new(&Dataset::iris()?, policy)
    }

    pub fn policy(&self) -> SplitPolicy {
        self.policy
    }

    pub fn evaluation_set(&self) -> &Dataset {
        &self.evaluation
    }

    /// Accuracy of an already-loaded artifact on the evaluation rows.
    pub fn score_artifact(&self, artifact: &ModelArtifact) -> Result<f64, MlError> {
        if artifact.feature_names.len() != self.evaluation.feature_names().len() {
            return Err(MlError::evaluation(format!(
                "artifact expects {} features, evaluation data has {}",
                artifact.feature_names.len(),
                self.evaluation.feature_names().len()
            )));
        }
        let predicted = artifact.predict(self.evaluation.rows())?;
        accuracy(self.evaluation.targets(), &predicted)
    }
}

#[async_trait]
impl QualityGate for ArtifactGate {
    async fn score(&self, version: &ModelVersion) -> Result<f64, PromotionError> {
        let artifact = ModelArtifact::load(&version.source)
            .await
            .map_err(|e| PromotionError::ArtifactLoadFailed {
                uri: version.source.clone(),
                message: e.to_string(),
            })?;
        // Scoring is deterministic, so these failures are final.
        let value = self
            .score_artifact(&artifact)
            .map_err(|e| PromotionError::EvaluationFailed {
                version: version.version,
                message: e.to_string(),
            })?;
        tracing::debug!(
            model = %version.name,
            version = version.version,
            rows = self.evaluation.len(),
            value,
            "Scored artifact"
        );
        Ok(value)
    }
}
