//! Classification metrics.

use crate::error::MlError;

/// Fraction of positions where `predicted` equals `expected`.
pub fn accuracy(expected: &[usize], predicted: &[usize]) -> Result<f64, MlError> {
    if expected.len() != predicted.len() {
        return Err(MlError::evaluation(format!(
            "{} labels but {} predictions",
            expected.len(),
            predicted.len()
        )));
    }
    if expected.is_empty() {
        return Err(MlError::evaluation("accuracy of an empty set is undefined"));
    }
    let correct = expected
        .iter()
        .zip(predicted)
        .filter(|(e, p)| e == p)
        .count();
    Ok(correct as f64 / expected.len() as f64)
}
