//! Shared fixtures for promoctl-ml integration tests.

#![allow(dead_code)]

use promoctl_ml::{Classifier, ModelArtifact, Node};
use std::path::{Path, PathBuf};

pub fn iris_features() -> Vec<String> {
    vec![
        "sepal length (cm)".into(),
        "sepal width (cm)".into(),
        "petal length (cm)".into(),
        "petal width (cm)".into(),
    ]
}

fn iris_classes() -> Vec<String> {
    vec!["setosa".into(), "versicolor".into(), "virginica".into()]
}

/// Depth-3 tree: 146/150 on the full set, every stride-3 row correct.
pub fn good_tree() -> ModelArtifact {
    ModelArtifact {
        feature_names: iris_features(),
        classes: iris_classes(),
        classifier: Classifier::DecisionTree {
            root: Node::split(
                2,
                2.45,
                Node::leaf(0),
                Node::split(
                    3,
                    1.75,
                    Node::split(2, 4.95, Node::leaf(1), Node::leaf(2)),
                    Node::leaf(2),
                ),
            ),
        },
    }
}

/// Never predicts virginica: 0.68 on the stride-3 rows.
pub fn weak_stump() -> ModelArtifact {
    ModelArtifact {
        feature_names: iris_features(),
        classes: iris_classes(),
        classifier: Classifier::DecisionTree {
            root: Node::split(2, 2.45, Node::leaf(0), Node::leaf(1)),
        },
    }
}

pub fn write(dir: &Path, name: &str, artifact: &ModelArtifact) -> PathBuf {
    let path = dir.join(name);
    artifact.save(&path).unwrap();
    path
}
