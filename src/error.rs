//! Error type shared by the whole pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration values.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("sample index {index} is out of range for a dataset of {len} samples")]
    SampleIndex { index: usize, len: usize },

    #[error("label {label} is out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("failed to access checkpoint {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("checkpoint {path} was trained for {found} classes, expected {expected}")]
    ClassCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("checkpoint {path} expects {found} flattened features, expected {expected}")]
    FeatureSizeMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("tensor data error: {0}")]
    Tensor(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
