//! The workspace module
//! Persist named datasets and one regressor together in a single file

use crate::buffer::BufferAdaptor;
use crate::client::{DataSetClient, KnnRegressorClient};
use crate::error::{KnnError, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    datasets: BTreeMap<String, DataSetClient>,
    regressor: KnnRegressorClient,
}

impl Workspace {
    /// Creates an empty workspace with a default, unfitted regressor.
    pub fn new() -> Workspace {
        Workspace::default()
    }

    pub fn dataset(&self, name: &str) -> Option<&DataSetClient> {
        self.datasets.get(name)
    }

    /// Returns the named dataset, creating it empty when missing.
    pub fn dataset_mut(&mut self, name: &str) -> &mut DataSetClient {
        self.datasets.entry(name.to_string()).or_default()
    }

    fn existing_mut(&mut self, name: &str) -> Result<&mut DataSetClient> {
        self.datasets.get_mut(name).ok_or(KnnError::NoDataSet)
    }

    /// Adds a point to the named dataset. A missing dataset is created only
    /// when the point is accepted.
    pub fn add_point(&mut self, name: &str, id: &str, buffer: Option<&dyn BufferAdaptor>) -> Result<()> {
        if let Some(dataset) = self.datasets.get_mut(name) {
            return dataset.add_point(id, buffer);
        }

        let mut dataset = DataSetClient::new();
        dataset.add_point(id, buffer)?;
        self.datasets.insert(name.to_string(), dataset);
        Ok(())
    }

    pub fn update_point(&mut self, name: &str, id: &str, buffer: Option<&dyn BufferAdaptor>) -> Result<()> {
        self.existing_mut(name)?.update_point(id, buffer)
    }

    pub fn delete_point(&mut self, name: &str, id: &str) -> Result<()> {
        self.existing_mut(name)?.delete_point(id)
    }

    pub fn clear_dataset(&mut self, name: &str) -> Result<()> {
        self.existing_mut(name)?.clear();
        Ok(())
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.datasets.keys().map(String::as_str)
    }

    pub fn regressor(&self) -> &KnnRegressorClient {
        &self.regressor
    }

    pub fn regressor_mut(&mut self) -> &mut KnnRegressorClient {
        &mut self.regressor
    }

    /// Fits the regressor on two named datasets.
    pub fn fit(&mut self, source: &str, target: &str) -> Result<()> {
        self.regressor.fit(self.datasets.get(source), self.datasets.get(target))
    }

    /// Predicts every point of `source` into `dest`, creating `dest` on success.
    pub fn predict(&mut self, source: &str, dest: &str) -> Result<usize> {
        let mut output = DataSetClient::new();
        self.regressor.predict(self.datasets.get(source), Some(&mut output))?;

        let count = output.size();
        self.datasets.insert(dest.to_string(), output);
        Ok(count)
    }

    /// Saves the workspace to a file using bincode serialization.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use knnreg::Workspace;
    ///
    /// let ws = Workspace::new();
    /// ws.save("my_workspace.knn").unwrap();
    /// ```
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(writer, self)?;
        info!(path = %path.as_ref().display(), datasets = self.datasets.len(), "saved workspace");
        Ok(())
    }

    /// Loads a workspace previously saved with [`save`](Workspace::save).
    ///
    /// Every dataset and the fitted model are re-validated while decoding.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Workspace> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let workspace: Workspace = bincode::deserialize_from(reader)?;
        info!(path = %path.as_ref().display(), datasets = workspace.datasets.len(), "loaded workspace");
        Ok(workspace)
    }

    /// Loads the workspace at `path`, or starts an empty one if the file is missing.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Workspace> {
        if path.as_ref().exists() {
            return Workspace::load(path);
        }

        Ok(Workspace::new())
    }
}
