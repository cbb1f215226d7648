//! # knnreg - k-nearest-neighbour regression over labeled vectors
//!
//! knnreg keeps labeled points in ordered datasets, indexes a feature dataset
//! with an exact k-d tree, and predicts scalar targets as the (optionally
//! distance-weighted) mean of the nearest neighbours' targets.
//!
//! ## Example
//!
//! ```
//! use knnreg::{KnnRegressorModel, LabeledDataset, Weighting};
//!
//! let mut features = LabeledDataset::new();
//! let mut targets = LabeledDataset::new();
//!
//! // Insert points and their target values
//! features.add("a", &[0.0, 0.0]).unwrap();
//! features.add("b", &[10.0, 0.0]).unwrap();
//! features.add("c", &[0.0, 10.0]).unwrap();
//! targets.add("a", &[1.0]).unwrap();
//! targets.add("b", &[2.0]).unwrap();
//! targets.add("c", &[3.0]).unwrap();
//!
//! let mut model = KnnRegressorModel::new();
//! model.fit(&features, &targets).unwrap();
//!
//! // The nearest point to (1, 1) is "a"
//! let y = model.predict_point(&[1.0, 1.0], 1, Weighting::Uniform).unwrap();
//! assert_eq!(y, 1.0);
//! ```

pub mod buffer;
pub mod client;
mod dataset;
pub mod error;
mod kdtree;
mod model;
pub mod params;
pub mod record;
mod regressor;
pub mod server;
pub mod vector;
mod workspace;

pub use client::{DataSetClient, KnnRegressorClient, KnnRegressorQuery};
pub use dataset::LabeledDataset;
pub use error::{KnnError, Result};
pub use kdtree::{KdTree, Neighbour, Node};
pub use model::KnnRegressorModel;
pub use params::RegressorParams;
pub use regressor::{predict, Weighting, WEIGHT_EPSILON};
pub use workspace::Workspace;
