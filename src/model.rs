//! The model module
//! Bind a k-d tree and its target dataset into one fit / predict / persist unit
//!
//! A model is either uninitialized or fitted; there is no observable state in
//! between. Every mutator validates before it touches `self`, so a failed
//! `fit` or `load` leaves the previous model intact.

use crate::dataset::LabeledDataset;
use crate::error::{KnnError, Result};
use crate::kdtree::KdTree;
use crate::record::{check_json, JsonKind};
use crate::regressor::{self, Weighting};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FittedParts", into = "FittedParts")]
struct Fitted {
    tree: KdTree,
    target: LabeledDataset,
}

#[derive(Serialize, Deserialize)]
struct FittedParts {
    tree: KdTree,
    target: LabeledDataset,
}

impl From<Fitted> for FittedParts {
    fn from(fitted: Fitted) -> Self {
        FittedParts { tree: fitted.tree, target: fitted.target }
    }
}

impl TryFrom<FittedParts> for Fitted {
    type Error = KnnError;

    fn try_from(parts: FittedParts) -> Result<Self> {
        Fitted::new(parts.tree, parts.target)
    }
}

impl Fitted {
    /// Pairs a tree with its targets after checking they describe the same points.
    fn new(tree: KdTree, target: LabeledDataset) -> Result<Fitted> {
        if tree.size() == 0 || target.is_empty() {
            return Err(KnnError::EmptyDataSet);
        }
        if tree.size() != target.size() {
            return Err(KnnError::SizesDontMatch);
        }
        if !tree.data().ids().iter().all(|id| target.contains(id)) {
            return Err(KnnError::SizesDontMatch);
        }
        if target.dimension() != 1 {
            return Err(KnnError::WrongPointSize { expected: 1, found: target.dimension() });
        }
        Ok(Fitted { tree, target })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnnRegressorModel {
    fitted: Option<Fitted>,
}

impl KnnRegressorModel {
    /// Creates an uninitialized model.
    pub fn new() -> KnnRegressorModel {
        KnnRegressorModel::default()
    }

    /// Builds a fresh index over `source` and keeps a copy of `target`.
    ///
    /// `source` and `target` must hold the same identifiers, and `target`
    /// must be one-dimensional. Any previous fit is replaced only when the
    /// new one succeeds.
    ///
    /// # Errors
    ///
    /// * `EmptyDataSet` - either dataset is empty
    /// * `SizesDontMatch` - sizes or identifier sets differ
    /// * `WrongPointSize` - `target` is not one-dimensional
    ///
    /// # Examples
    ///
    /// ```
    /// use knnreg::{KnnRegressorModel, LabeledDataset, Weighting};
    ///
    /// let mut source = LabeledDataset::new();
    /// let mut target = LabeledDataset::new();
    /// source.add("a", &[0.0, 0.0]).unwrap();
    /// source.add("b", &[10.0, 0.0]).unwrap();
    /// source.add("c", &[0.0, 10.0]).unwrap();
    /// target.add("a", &[1.0]).unwrap();
    /// target.add("b", &[2.0]).unwrap();
    /// target.add("c", &[3.0]).unwrap();
    ///
    /// let mut model = KnnRegressorModel::new();
    /// model.fit(&source, &target).unwrap();
    ///
    /// let y = model.predict_point(&[1.0, 1.0], 1, Weighting::Uniform).unwrap();
    /// assert_eq!(y, 1.0);
    /// let y = model.predict_point(&[5.0, 5.0], 3, Weighting::Uniform).unwrap();
    /// assert!((y - 2.0).abs() < 1e-12);
    /// ```
    pub fn fit(&mut self, source: &LabeledDataset, target: &LabeledDataset) -> Result<()> {
        if source.is_empty() || target.is_empty() {
            return Err(KnnError::EmptyDataSet);
        }
        if source.size() != target.size() {
            return Err(KnnError::SizesDontMatch);
        }

        let fitted = Fitted::new(KdTree::build(source), target.clone())?;
        info!(points = source.size(), dims = source.dimension(), "fitted model");
        self.fitted = Some(fitted);
        Ok(())
    }

    /// Discards the index and targets.
    pub fn clear(&mut self) {
        debug!("clearing model");
        self.fitted = None;
    }

    pub fn initialized(&self) -> bool {
        self.fitted.is_some()
    }

    /// Number of fitted points, `0` when uninitialized.
    pub fn size(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.target.size())
    }

    /// Feature dimension of the index, `0` when uninitialized.
    pub fn cols(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.tree.dims())
    }

    pub fn tree(&self) -> Option<&KdTree> {
        self.fitted.as_ref().map(|f| &f.tree)
    }

    pub fn target(&self) -> Option<&LabeledDataset> {
        self.fitted.as_ref().map(|f| &f.target)
    }

    /// Shared precondition checks of both prediction paths, in reporting order.
    fn ready(&self, k: usize) -> Result<&Fitted> {
        if k == 0 {
            return Err(KnnError::SmallK);
        }
        let fitted = self.fitted.as_ref().ok_or(KnnError::NoDataFitted)?;
        if k > fitted.tree.size() {
            return Err(KnnError::NotEnoughData { k, size: fitted.tree.size() });
        }
        Ok(fitted)
    }

    /// Runs the `SmallK` / `NoDataFitted` / `NotEnoughData` checks alone, so
    /// callers can report them before validating their own inputs.
    pub fn check_query(&self, k: usize) -> Result<()> {
        self.ready(k).map(|_| ())
    }

    /// Predicts one scalar for `point`.
    ///
    /// # Errors
    ///
    /// `SmallK`, `NoDataFitted`, `NotEnoughData`, `WrongPointSize`, checked in
    /// that order.
    pub fn predict_point(&self, point: &[f64], k: usize, weighting: Weighting) -> Result<f64> {
        let fitted = self.ready(k)?;
        if point.len() != fitted.tree.dims() {
            return Err(KnnError::WrongPointSize { expected: fitted.tree.dims(), found: point.len() });
        }
        regressor::predict(&fitted.tree, &fitted.target, point, k, weighting)
    }

    /// Predicts every point of `source`, keyed by the same identifiers.
    ///
    /// Points are evaluated in parallel; the output keeps the iteration order
    /// of `source`. Either every prediction succeeds or nothing is returned.
    pub fn predict(&self, source: &LabeledDataset, k: usize, weighting: Weighting) -> Result<LabeledDataset> {
        if source.is_empty() {
            return Err(KnnError::EmptyDataSet);
        }
        let fitted = self.ready(k)?;
        if source.dimension() != fitted.tree.dims() {
            return Err(KnnError::WrongPointSize { expected: fitted.tree.dims(), found: source.dimension() });
        }

        let predictions = (0..source.size())
            .into_par_iter()
            .map(|i| regressor::predict(&fitted.tree, &fitted.target, source.row(i), k, weighting))
            .collect::<Result<Vec<f64>>>()?;

        let mut result = LabeledDataset::new();
        for (id, prediction) in source.ids().iter().zip(predictions) {
            result.add(id, &[prediction])?;
        }
        debug!(points = result.size(), k, "batch prediction");
        Ok(result)
    }

    /// Serializes the fitted state as `{"tree": .., "target": ..}`.
    pub fn dump(&self) -> Result<Value> {
        let fitted = self.fitted.as_ref().ok_or(KnnError::NoDataFitted)?;
        Ok(json!({
            "tree": fitted.tree.to_json(),
            "target": fitted.target.to_json(),
        }))
    }

    /// Replaces the model with one decoded from a [`dump`](KnnRegressorModel::dump) record.
    ///
    /// The record is schema-checked before decoding and re-validated after;
    /// on any failure the current model is left untouched.
    pub fn load(&mut self, value: &Value) -> Result<()> {
        let fitted = Self::decode(value).inspect_err(|e| warn!(error = %e, "rejected model record"))?;
        info!(points = fitted.target.size(), dims = fitted.tree.dims(), "loaded model");
        self.fitted = Some(fitted);
        Ok(())
    }

    fn decode(value: &Value) -> Result<Fitted> {
        check_json(value, &[("tree", JsonKind::Object), ("target", JsonKind::Object)])?;
        let tree = KdTree::from_json(&value["tree"])?;
        let target = LabeledDataset::from_json(&value["target"])?;
        Fitted::new(tree, target).map_err(|e| KnnError::Schema(format!("inconsistent model: {}", e)))
    }

    /// Writes the [`dump`](KnnRegressorModel::dump) record to a JSON file.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let record = self.dump()?;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &record)?;
        Ok(())
    }

    /// Loads a model from a JSON file produced by [`write`](KnnRegressorModel::write).
    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        let record: Value = serde_json::from_reader(reader)?;
        self.load(&record)
    }
}
