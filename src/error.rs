//! Error taxonomy shared by every layer of the crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KnnError {
    #[error("Wrong point size: expected {expected}, found {found}")]
    WrongPointSize { expected: usize, found: usize },

    #[error("Duplicate label: '{0}'")]
    DuplicateLabel(String),

    #[error("Point not found: '{0}'")]
    PointNotFound(String),

    #[error("DataSet is empty")]
    EmptyDataSet,

    #[error("DataSet sizes don't match")]
    SizesDontMatch,

    #[error("k is too small")]
    SmallK,

    #[error("Not enough data: k = {k} but only {size} points fitted")]
    NotEnoughData { k: usize, size: usize },

    #[error("No data fitted")]
    NoDataFitted,

    #[error("DataSet not found")]
    NoDataSet,

    #[error("No buffer supplied")]
    NoBuffer,

    #[error("Invalid buffer")]
    InvalidBuffer,

    #[error("Buffer is empty")]
    EmptyBuffer,

    #[error("Non-finite value in point '{0}'")]
    NonFinite(String),

    #[error("Invalid record: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl KnnError {
    /// Stable status name reported by the CLI and the HTTP API.
    pub fn status(&self) -> &'static str {
        match self {
            KnnError::WrongPointSize { .. } => "WrongPointSize",
            KnnError::DuplicateLabel(_) => "DuplicateLabel",
            KnnError::PointNotFound(_) => "PointNotFound",
            KnnError::EmptyDataSet => "EmptyDataSet",
            KnnError::SizesDontMatch => "SizesDontMatch",
            KnnError::SmallK => "SmallK",
            KnnError::NotEnoughData { .. } => "NotEnoughData",
            KnnError::NoDataFitted => "NoDataFitted",
            KnnError::NoDataSet => "NoDataSet",
            KnnError::NoBuffer => "NoBuffer",
            KnnError::InvalidBuffer => "InvalidBuffer",
            KnnError::EmptyBuffer => "EmptyBuffer",
            KnnError::NonFinite(_) => "NonFinite",
            KnnError::Schema(_) => "Schema",
            KnnError::Io(_) => "Io",
            KnnError::Json(_) => "Json",
            KnnError::Bincode(_) => "Bincode",
        }
    }
}

pub type Result<T> = std::result::Result<T, KnnError>;
