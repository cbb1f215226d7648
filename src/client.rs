//! Message-style API over datasets and regressors.
//!
//! Each method here is one message a host can send: it validates the buffers
//! and dataset handles it receives, then delegates to the core types. Handles
//! are explicit `Option` references rather than names resolved through shared
//! state, so a missing handle is reported as `NoDataSet` / `NoBuffer`.

use crate::buffer::{check_buffer, read_point, BufferAdaptor};
use crate::dataset::LabeledDataset;
use crate::error::{KnnError, Result};
use crate::model::KnnRegressorModel;
use crate::params::RegressorParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use tracing::debug;

/// A named dataset as seen by a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSetClient {
    dataset: LabeledDataset,
}

impl DataSetClient {
    pub fn new() -> DataSetClient {
        DataSetClient::default()
    }

    pub fn dataset(&self) -> &LabeledDataset {
        &self.dataset
    }

    pub fn set_dataset(&mut self, dataset: LabeledDataset) {
        self.dataset = dataset;
    }

    /// `addPoint`: stores the whole buffer under `id`.
    ///
    /// An empty dataset takes its dimension from the buffer length; afterwards
    /// the buffer length must match exactly.
    pub fn add_point(&mut self, id: &str, buffer: Option<&dyn BufferAdaptor>) -> Result<()> {
        let buffer = check_buffer(buffer)?;
        let frames = buffer.num_frames();
        if frames == 0 {
            return Err(KnnError::EmptyBuffer);
        }
        if !self.dataset.is_empty() && frames != self.dataset.dimension() {
            return Err(KnnError::WrongPointSize { expected: self.dataset.dimension(), found: frames });
        }
        self.dataset.add(id, buffer.samples())
    }

    /// `getPoint`: resizes `buffer` to `cols` frames and copies the point into it.
    pub fn get_point(&self, id: &str, buffer: Option<&mut dyn BufferAdaptor>) -> Result<()> {
        let buffer = buffer.ok_or(KnnError::NoBuffer)?;
        if !buffer.exists() {
            return Err(KnnError::InvalidBuffer);
        }
        let point = self
            .dataset
            .get(id)
            .ok_or_else(|| KnnError::PointNotFound(id.to_string()))?;

        buffer.resize(point.len())?;
        buffer.samples_mut().copy_from_slice(point);
        Ok(())
    }

    /// `updatePoint`: replaces the point with the first `cols` frames of `buffer`.
    pub fn update_point(&mut self, id: &str, buffer: Option<&dyn BufferAdaptor>) -> Result<()> {
        let point = read_point(buffer, self.dataset.dimension())?;
        self.dataset.update(id, &point)
    }

    /// `deletePoint`
    pub fn delete_point(&mut self, id: &str) -> Result<()> {
        self.dataset.remove(id)
    }

    pub fn clear(&mut self) {
        self.dataset.clear();
    }

    pub fn print(&self) -> String {
        self.dataset.print()
    }

    pub fn size(&self) -> usize {
        self.dataset.size()
    }

    pub fn cols(&self) -> usize {
        self.dataset.dimension()
    }

    pub fn dump(&self) -> Value {
        self.dataset.to_json()
    }

    pub fn load(&mut self, value: &Value) -> Result<()> {
        self.dataset = LabeledDataset::from_json(value)?;
        Ok(())
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.dump())?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        let record: Value = serde_json::from_reader(reader)?;
        self.load(&record)
    }
}

impl From<LabeledDataset> for DataSetClient {
    fn from(dataset: LabeledDataset) -> Self {
        DataSetClient { dataset }
    }
}

/// A k-nearest-neighbour regressor together with its query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnnRegressorClient {
    params: RegressorParams,
    model: KnnRegressorModel,
}

impl KnnRegressorClient {
    pub fn new(params: RegressorParams) -> KnnRegressorClient {
        KnnRegressorClient { params, model: KnnRegressorModel::new() }
    }

    pub fn params(&self) -> &RegressorParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut RegressorParams {
        &mut self.params
    }

    pub fn model(&self) -> &KnnRegressorModel {
        &self.model
    }

    /// `fit`: trains on `source` features and `target` values.
    pub fn fit(&mut self, source: Option<&DataSetClient>, target: Option<&DataSetClient>) -> Result<()> {
        let source = source.ok_or(KnnError::NoDataSet)?;
        if source.size() == 0 {
            return Err(KnnError::EmptyDataSet);
        }
        let target = target.ok_or(KnnError::NoDataSet)?;
        if target.size() == 0 {
            return Err(KnnError::EmptyDataSet);
        }
        self.model.fit(source.dataset(), target.dataset())
    }

    /// `predictPoint`: predicts from the first `cols` frames of `buffer`.
    pub fn predict_point(&self, buffer: Option<&dyn BufferAdaptor>) -> Result<f64> {
        let k = self.params.num_neighbours;
        self.model.check_query(k)?;
        let point = read_point(buffer, self.model.cols())?;
        self.model.predict_point(&point, k, self.params.weighting())
    }

    /// `predict`: writes one prediction per `source` point into `dest`.
    ///
    /// `dest` is only replaced when every prediction succeeds.
    pub fn predict(&self, source: Option<&DataSetClient>, dest: Option<&mut DataSetClient>) -> Result<()> {
        let source = source.ok_or(KnnError::NoDataSet)?;
        if source.size() == 0 {
            return Err(KnnError::EmptyDataSet);
        }
        let dest = dest.ok_or(KnnError::NoDataSet)?;

        let result = self
            .model
            .predict(source.dataset(), self.params.num_neighbours, self.params.weighting())?;
        dest.set_dataset(result);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.model.clear();
    }

    pub fn size(&self) -> usize {
        self.model.size()
    }

    pub fn cols(&self) -> usize {
        self.model.cols()
    }

    pub fn dump(&self) -> Result<Value> {
        self.model.dump()
    }

    pub fn load(&mut self, value: &Value) -> Result<()> {
        self.model.load(value)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.model.write(path)
    }

    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.model.read(path)
    }
}

/// Triggered, read-only queries against a regressor owned elsewhere.
///
/// The query keeps its own parameters and only borrows the regressor for the
/// duration of [`process`](KnnRegressorQuery::process), so several queries can
/// read one fitted model concurrently.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KnnRegressorQuery {
    pub params: RegressorParams,
}

impl KnnRegressorQuery {
    pub fn new(params: RegressorParams) -> KnnRegressorQuery {
        KnnRegressorQuery { params }
    }

    /// Predicts into the single frame of `output` when `trigger` is positive.
    ///
    /// Returns `Ok(false)` without touching `output` when not triggered.
    pub fn process(
        &self,
        trigger: f64,
        regressor: &KnnRegressorClient,
        input: Option<&dyn BufferAdaptor>,
        output: Option<&mut dyn BufferAdaptor>,
    ) -> Result<bool> {
        if trigger <= 0.0 {
            return Ok(false);
        }

        let model = regressor.model();
        let k = self.params.num_neighbours;
        model.check_query(k)?;
        let point = read_point(input, model.cols())?;

        let output = output.ok_or(KnnError::NoBuffer)?;
        if !output.exists() {
            return Err(KnnError::InvalidBuffer);
        }
        if output.num_frames() != 1 {
            return Err(KnnError::WrongPointSize { expected: 1, found: output.num_frames() });
        }

        let prediction = model.predict_point(&point, k, self.params.weighting())?;
        output.samples_mut()[0] = prediction;
        debug!(prediction, "query triggered");
        Ok(true)
    }
}
