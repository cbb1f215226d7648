//! This is the vector math module
//! Provide Euclidean distances between points

use crate::error::{KnnError, Result};

/// Squared Euclidean distance
/// dist2 = sum((a[i] - b[i])^2) for i = 0..a.len()
/// Can only process vectors with same dimensions
pub fn squared_distance(left: &[f64], right: &[f64]) -> Result<f64> {
    if left.len() != right.len() {
        return Err(KnnError::WrongPointSize { expected: left.len(), found: right.len() });
    }

    Ok(squared_distance_unchecked(left, right))
}

/// Euclidean distance
/// dist = sqrt(dist2)
pub fn euclidean_distance(left: &[f64], right: &[f64]) -> Result<f64> {
    squared_distance(left, right).map(f64::sqrt)
}

/// Hot-path variant for callers that already validated both lengths.
pub(crate) fn squared_distance_unchecked(left: &[f64], right: &[f64]) -> f64 {
    left.iter()
        .zip(right.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}
