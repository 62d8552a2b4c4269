//! Labelled tabular datasets.
//!
//! The gate evaluates against the iris dataset (150 rows, 4 features,
//! 3 classes), embedded at build time so every evaluation sees the same data.

use crate::error::MlError;
use serde::Serialize;

const IRIS_CSV: &str = include_str!("../data/iris.csv");
const IRIS_CLASSES: [&str; 3] = ["setosa", "versicolor", "virginica"];

/// Feature matrix with integer class labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    target_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    targets: Vec<usize>,
}

impl Dataset {
    /// The embedded iris dataset.
    pub fn iris() -> Result<Self, MlError> {
        Self::from_csv(IRIS_CSV, IRIS_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    /// Parse a CSV whose header names the features and whose last column is
    /// the integer class label.
    pub fn from_csv(text: &str, target_names: Vec<String>) -> Result<Self, MlError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| MlError::dataset("empty CSV"))?;
        let mut columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();
        if columns.len() < 2 {
            return Err(MlError::dataset("need at least one feature and a label column"));
        }
        columns.pop();

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for (lineno, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != columns.len() + 1 {
                return Err(MlError::dataset(format!(
                    "row {}: expected {} fields, found {}",
                    lineno + 1,
                    columns.len() + 1,
                    fields.len()
                )));
            }
            let (values, label) = (&fields[..columns.len()], fields[columns.len()]);
            let row = values
                .iter()
                .map(|v| v.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MlError::dataset(format!("row {}: {e}", lineno + 1)))?;
            let target = label
                .parse::<usize>()
                .map_err(|e| MlError::dataset(format!("row {}: label '{label}': {e}", lineno + 1)))?;
            if target >= target_names.len() {
                return Err(MlError::dataset(format!(
                    "row {}: label {target} has no class name",
                    lineno + 1
                )));
            }
            rows.push(row);
            targets.push(target);
        }

        Ok(Self {
            feature_names: columns,
            target_names,
            rows,
            targets,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Rows at `indices`, in the order given. Out-of-range indices are skipped.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let picked: Vec<usize> = indices.iter().copied().filter(|&i| i < self.len()).collect();
        Self {
            feature_names: self.feature_names.clone(),
            target_names: self.target_names.clone(),
            rows: picked.iter().map(|&i| self.rows[i].clone()).collect(),
            targets: picked.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}
