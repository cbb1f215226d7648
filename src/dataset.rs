//! The dataset module
//! Provide an ordered, labeled store of fixed-dimension vectors

use crate::error::{KnnError, Result};
use crate::record::{self, check_json, JsonKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Write;
use tracing::debug;

/// Rows shown at each end of [`LabeledDataset::print`].
const PRINT_EDGE_ROWS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset", into = "RawDataset")]
pub struct LabeledDataset {
    ids: Vec<String>,
    vectors: Vec<f64>,
    dimension: usize,
    positions: HashMap<String, usize>,
}

/// On-disk layout; the lookup map is rebuilt (and checked) on decode.
#[derive(Serialize, Deserialize)]
struct RawDataset {
    ids: Vec<String>,
    vectors: Vec<f64>,
    dimension: usize,
}

impl From<LabeledDataset> for RawDataset {
    fn from(dataset: LabeledDataset) -> Self {
        RawDataset { ids: dataset.ids, vectors: dataset.vectors, dimension: dataset.dimension }
    }
}

impl TryFrom<RawDataset> for LabeledDataset {
    type Error = KnnError;

    fn try_from(raw: RawDataset) -> Result<Self> {
        if raw.dimension == 0 && !raw.ids.is_empty() {
            return Err(KnnError::Schema("points stored without a dimension".to_string()));
        }
        if raw.vectors.len() != raw.ids.len() * raw.dimension {
            return Err(KnnError::Schema(format!(
                "{} values cannot hold {} points of dimension {}",
                raw.vectors.len(),
                raw.ids.len(),
                raw.dimension
            )));
        }

        if raw.vectors.iter().any(|v| !v.is_finite()) {
            return Err(KnnError::Schema("non-finite value stored".to_string()));
        }

        let mut positions = HashMap::with_capacity(raw.ids.len());
        for (i, id) in raw.ids.iter().enumerate() {
            if positions.insert(id.clone(), i).is_some() {
                return Err(KnnError::DuplicateLabel(id.clone()));
            }
        }

        Ok(LabeledDataset { ids: raw.ids, vectors: raw.vectors, dimension: raw.dimension, positions })
    }
}

/// NaN and infinite coordinates are rejected.
fn check_finite(id: &str, vector: &[f64]) -> Result<()> {
    if vector.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(KnnError::NonFinite(id.to_string()))
    }
}

impl LabeledDataset {
    /// Creates a new empty dataset.
    ///
    /// The dataset starts with no dimension constraint. The dimension will be
    /// set automatically on the first insert operation.
    ///
    /// # Examples
    ///
    /// ```
    /// use knnreg::LabeledDataset;
    ///
    /// let ds = LabeledDataset::new();
    /// assert_eq!(ds.size(), 0);
    /// assert_eq!(ds.dimension(), 0);
    /// ```
    pub fn new() -> LabeledDataset {
        LabeledDataset::default()
    }

    /// Appends a labeled point.
    ///
    /// An empty dataset adopts the length of `vector` as its dimension. Once
    /// the dataset holds points, every new vector must match that dimension.
    ///
    /// # Errors
    ///
    /// * `DuplicateLabel` - `id` is already present
    /// * `WrongPointSize` - `vector` does not match the dataset dimension
    /// * `EmptyBuffer` - `vector` has no elements
    /// * `NonFinite` - `vector` holds a NaN or an infinity
    ///
    /// # Examples
    ///
    /// ```
    /// use knnreg::LabeledDataset;
    ///
    /// let mut ds = LabeledDataset::new();
    /// ds.add("a", &[0.0, 0.0]).unwrap();
    ///
    /// // Same label twice
    /// assert!(ds.add("a", &[1.0, 1.0]).is_err());
    ///
    /// // Dimension mismatch
    /// assert!(ds.add("b", &[1.0, 2.0, 3.0]).is_err());
    /// assert_eq!(ds.size(), 1);
    /// ```
    pub fn add(&mut self, id: &str, vector: &[f64]) -> Result<()> {
        if vector.is_empty() {
            return Err(KnnError::EmptyBuffer);
        }
        if self.positions.contains_key(id) {
            return Err(KnnError::DuplicateLabel(id.to_string()));
        }

        if self.ids.is_empty() {
            self.dimension = vector.len();
        } else if vector.len() != self.dimension {
            return Err(KnnError::WrongPointSize { expected: self.dimension, found: vector.len() });
        }
        check_finite(id, vector)?;

        self.positions.insert(id.to_string(), self.ids.len());
        self.ids.push(id.to_string());
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    /// Borrows the vector stored under `id`.
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.positions.get(id).map(|&i| self.row(i))
    }

    /// Copies the vector stored under `id` into `out`.
    ///
    /// Returns whether the point exists; never fails on absence so it can be
    /// used as a cheap existence probe. At most `out.len()` values are copied.
    pub fn get_into(&self, id: &str, out: &mut [f64]) -> bool {
        match self.get(id) {
            Some(vector) => {
                let n = out.len().min(vector.len());
                out[..n].copy_from_slice(&vector[..n]);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Replaces the vector of an existing point in place.
    ///
    /// # Errors
    ///
    /// * `PointNotFound` - `id` is absent
    /// * `WrongPointSize` - `vector` does not match the dataset dimension
    /// * `NonFinite` - `vector` holds a NaN or an infinity
    pub fn update(&mut self, id: &str, vector: &[f64]) -> Result<()> {
        let index = *self
            .positions
            .get(id)
            .ok_or_else(|| KnnError::PointNotFound(id.to_string()))?;

        if vector.len() != self.dimension {
            return Err(KnnError::WrongPointSize { expected: self.dimension, found: vector.len() });
        }
        check_finite(id, vector)?;

        let start = index * self.dimension;
        self.vectors[start..start + self.dimension].copy_from_slice(vector);
        Ok(())
    }

    /// Removes a point by its ID.
    ///
    /// Later rows move up by one position; their identifiers are unchanged.
    /// The dimension stays fixed until [`clear`](LabeledDataset::clear).
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let index = self
            .positions
            .remove(id)
            .ok_or_else(|| KnnError::PointNotFound(id.to_string()))?;

        self.vectors.drain(index * self.dimension..(index + 1) * self.dimension);
        self.ids.remove(index);

        for (position, moved) in self.ids.iter().enumerate().skip(index) {
            self.positions.insert(moved.clone(), position);
        }
        Ok(())
    }

    /// Returns the number of points in the dataset.
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the vector length, `0` while unset.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Resets to the empty, dimension-less state.
    pub fn clear(&mut self) {
        debug!(points = self.ids.len(), "clearing dataset");
        *self = LabeledDataset::new();
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Iterates `(id, vector)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> + '_ {
        self.ids.iter().enumerate().map(|(i, id)| (id.as_str(), self.row(i)))
    }

    /// Retrieves a vector slice from the flat array by position.
    ///
    /// The vectors are stored contiguously as:
    /// `[v1_d1, v1_d2, ..., v2_d1, v2_d2, ...]`
    pub(crate) fn row(&self, index: usize) -> &[f64] {
        let start = index * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Human-readable summary with the first and last few rows.
    pub fn print(&self) -> String {
        let mut out = format!("rows: {} cols: {}\n", self.size(), self.dimension);
        let render = |out: &mut String, i: usize| {
            let _ = writeln!(out, "{:>8}: {:?}", self.ids[i], self.row(i));
        };

        if self.size() <= 2 * PRINT_EDGE_ROWS {
            (0..self.size()).for_each(|i| render(&mut out, i));
        } else {
            (0..PRINT_EDGE_ROWS).for_each(|i| render(&mut out, i));
            out.push_str("     ...\n");
            (self.size() - PRINT_EDGE_ROWS..self.size()).for_each(|i| render(&mut out, i));
        }
        out
    }

    /// Encodes the dataset as `{"cols": <int>, "data": {<id>: [..], ..}}`.
    pub fn to_json(&self) -> Value {
        let mut data = Map::with_capacity(self.size());
        for (id, vector) in self.iter() {
            data.insert(id.to_string(), Value::from(vector.to_vec()));
        }

        let mut record = Map::new();
        record.insert("cols".to_string(), Value::from(self.dimension));
        record.insert("data".to_string(), Value::Object(data));
        Value::Object(record)
    }

    /// Decodes a record produced by [`to_json`](LabeledDataset::to_json).
    pub fn from_json(value: &Value) -> Result<LabeledDataset> {
        check_json(value, &[("cols", JsonKind::Number), ("data", JsonKind::Object)])?;

        let cols = record::as_index(value, "cols")?;
        let mut dataset = LabeledDataset { dimension: cols, ..LabeledDataset::default() };

        if let Some(data) = value["data"].as_object() {
            for (id, row) in data {
                let vector = record::as_f64_vec(row, &format!("point '{}'", id))?;
                if vector.len() != cols {
                    return Err(KnnError::Schema(format!(
                        "point '{}' has {} values, expected {}",
                        id,
                        vector.len(),
                        cols
                    )));
                }
                dataset.add(id, &vector)?;
            }
        }

        Ok(dataset)
    }
}
