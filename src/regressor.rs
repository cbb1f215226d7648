//! Distance-weighted k-nearest-neighbour regression.
//!
//! Stateless: a prediction only borrows the tree and the targets, so any
//! number of readers may predict against the same fitted pair at once.

use crate::dataset::LabeledDataset;
use crate::error::{KnnError, Result};
use crate::kdtree::KdTree;
use serde::{Deserialize, Serialize};

/// Keeps the inverse-distance weight finite when the query coincides with a
/// stored point.
pub const WEIGHT_EPSILON: f64 = 1e-10;

/// How neighbour targets are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    /// Every neighbour weighs `1/k`.
    Uniform,
    /// Neighbours weigh `1/(distance + ε)`, normalized to sum to one.
    Distance,
}

impl From<bool> for Weighting {
    fn from(weighted: bool) -> Self {
        if weighted { Weighting::Distance } else { Weighting::Uniform }
    }
}

/// Predicts a scalar for `point` from its `k` nearest neighbours in `tree`.
///
/// Each neighbour contributes the first value of its vector in `targets`.
///
/// # Examples
///
/// ```
/// use knnreg::{predict, KdTree, LabeledDataset, Weighting};
///
/// let mut source = LabeledDataset::new();
/// let mut targets = LabeledDataset::new();
/// for (id, x, y) in [("a", 0.0, 1.0), ("b", 10.0, 3.0)] {
///     source.add(id, &[x]).unwrap();
///     targets.add(id, &[y]).unwrap();
/// }
///
/// let tree = KdTree::build(&source);
/// let mean = predict(&tree, &targets, &[4.0], 2, Weighting::Uniform).unwrap();
/// assert!((mean - 2.0).abs() < 1e-12);
/// ```
pub fn predict(
    tree: &KdTree,
    targets: &LabeledDataset,
    point: &[f64],
    k: usize,
    weighting: Weighting,
) -> Result<f64> {
    let nearest = tree.k_nearest(point, k)?;

    let weights: Vec<f64> = match weighting {
        Weighting::Uniform => vec![1.0 / nearest.len() as f64; nearest.len()],
        Weighting::Distance => {
            let inverse: Vec<f64> = nearest.iter().map(|n| 1.0 / (n.distance + WEIGHT_EPSILON)).collect();
            let total: f64 = inverse.iter().sum();
            inverse.into_iter().map(|w| w / total).collect()
        }
    };

    nearest.iter().zip(weights).try_fold(0.0, |acc, (neighbour, weight)| {
        let value = targets
            .get(neighbour.id)
            .and_then(|v| v.first().copied())
            .ok_or_else(|| KnnError::PointNotFound(neighbour.id.to_string()))?;
        Ok(acc + weight * value)
    })
}
