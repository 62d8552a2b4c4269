//! Classifier artifacts.
//!
//! A registered model version points (via its `source`) at a JSON document
//! describing a tree-based classifier. Split semantics follow scikit-learn:
//! a sample goes left when `x[feature] <= threshold`.

use crate::error::MlError;
use promoctl_core::persistence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// One node of a decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn leaf(class: usize) -> Self {
        Self::Leaf { class }
    }

    pub fn split(feature: usize, threshold: f64, left: Node, right: Node) -> Self {
        Self::Split {
            feature,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn predict(&self, row: &[f64]) -> usize {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { class } => return *class,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn check(&self, n_features: usize, n_classes: usize) -> Result<(), MlError> {
        match self {
            Self::Leaf { class } if *class >= n_classes => Err(MlError::artifact(format!(
                "leaf class {class} out of range (model has {n_classes} classes)"
            ))),
            Self::Leaf { .. } => Ok(()),
            Self::Split { feature, .. } if *feature >= n_features => Err(MlError::artifact(
                format!("split on feature {feature} out of range (model has {n_features} features)"),
            )),
            Self::Split { threshold, .. } if threshold.is_nan() => {
                Err(MlError::artifact("split threshold is NaN"))
            }
            Self::Split { left, right, .. } => {
                left.check(n_features, n_classes)?;
                right.check(n_features, n_classes)
            }
        }
    }
}

/// Prediction model carried by an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classifier {
    DecisionTree { root: Node },
    /// Majority vote over the trees; ties go to the lowest class index.
    Forest { trees: Vec<Node> },
}

impl Classifier {
    fn predict_row(&self, row: &[f64], n_classes: usize) -> usize {
        match self {
            Self::DecisionTree { root } => root.predict(row),
            Self::Forest { trees } => {
                let mut votes = vec![0usize; n_classes];
                for tree in trees {
                    votes[tree.predict(row)] += 1;
                }
                let mut best = 0;
                for (class, &count) in votes.iter().enumerate() {
                    if count > votes[best] {
                        best = class;
                    }
                }
                best
            }
        }
    }
}

/// A serialized classifier together with its input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub classes: Vec<String>,
    pub classifier: Classifier,
}

impl ModelArtifact {
    /// Check that every node references a known feature and class.
    pub fn validate(&self) -> Result<(), MlError> {
        if self.feature_names.is_empty() {
            return Err(MlError::artifact("artifact declares no features"));
        }
        if self.classes.is_empty() {
            return Err(MlError::artifact("artifact declares no classes"));
        }
        let (n_features, n_classes) = (self.feature_names.len(), self.classes.len());
        match &self.classifier {
            Classifier::DecisionTree { root } => root.check(n_features, n_classes),
            Classifier::Forest { trees } if trees.is_empty() => {
                Err(MlError::artifact("forest has no trees"))
            }
            Classifier::Forest { trees } => trees
                .iter()
                .try_for_each(|t| t.check(n_features, n_classes)),
        }
    }

    /// Parse and validate an artifact document.
    pub fn from_json(text: &str) -> Result<Self, MlError> {
        let artifact: Self = serde_json::from_str(text)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Predict a class index for each row.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, MlError> {
        self.validate()?;
        let width = self.feature_names.len();
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != width {
                    return Err(MlError::invalid_input(format!(
                        "row {i} has {} values, model expects {width}",
                        row.len()
                    )));
                }
                Ok(self.classifier.predict_row(row, self.classes.len()))
            })
            .collect()
    }

    /// Load an artifact from a filesystem path, `file://` URI or `http(s)://` URL.
    pub async fn load(uri: &str) -> Result<Self, MlError> {
        let text = match Url::parse(uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                tracing::debug!(%url, "Fetching model artifact");
                reqwest::get(url).await?.error_for_status()?.text().await?
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| MlError::artifact(format!("'{uri}' is not a local file URI")))?;
                tokio::fs::read_to_string(path).await?
            }
            // Single-letter schemes are Windows drive letters.
            Ok(url) if url.scheme().len() > 1 => {
                return Err(MlError::artifact(format!(
                    "unsupported artifact URI scheme '{}'",
                    url.scheme()
                )));
            }
            _ => tokio::fs::read_to_string(PathBuf::from(uri)).await?,
        };
        Self::from_json(&text)
    }

    /// Write the artifact as pretty JSON via a temporary sibling file.
    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        persistence::atomic_write_json(path, self)?;
        Ok(())
    }
}
