//! Evaluation gate contract.

use crate::error::PromotionError;
use crate::registry::{ModelVersion, VersionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scores a model version against a pinned evaluation set.
///
/// Implementations must be read-only and deterministic for a fixed dataset
/// and version.
#[async_trait]
pub trait QualityGate: Send + Sync {
    /// Name of the metric produced by [`QualityGate::score`].
    fn metric(&self) -> &str {
        "accuracy"
    }

    /// Metric value in `[0, 1]`.
    async fn score(&self, version: &ModelVersion) -> Result<f64, PromotionError>;
}

/// Outcome of scoring one version against one threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub version: VersionId,
    pub accuracy: f64,
    pub threshold: f64,
    pub passed: bool,
}

impl Evaluation {
    /// Compare a metric against a threshold. Meeting the threshold passes.
    pub fn judge(version: VersionId, accuracy: f64, threshold: f64) -> Result<Self, PromotionError> {
        if !(0.0..=1.0).contains(&accuracy) {
            return Err(PromotionError::InvalidMetric {
                version,
                value: accuracy,
            });
        }
        Ok(Self {
            version,
            accuracy,
            threshold,
            passed: accuracy >= threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_fails() {
        let eval = Evaluation::judge(7, 0.85, 0.9).unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.accuracy, 0.85);
    }

    #[test]
    fn test_equal_to_threshold_passes() {
        assert!(Evaluation::judge(7, 0.9, 0.9).unwrap().passed);
        assert!(Evaluation::judge(7, 0.0, 0.0).unwrap().passed);
    }

    #[test]
    fn test_rejects_out_of_range_metric() {
        assert!(Evaluation::judge(7, 1.2, 0.9).is_err());
        assert!(Evaluation::judge(7, f64::NAN, 0.9).is_err());
    }
}
