//! Error type shared by the library modules.
//!
//! Validation problems are not errors: they are collected in a
//! [`ValidationReport`](crate::validate::ValidationReport). Unmapped fields
//! are not errors either; the mapper simply returns `None`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = GliderError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum GliderError {
    #[error("configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("cannot parse {path}: {source}")]
    ConfigJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("data consistency error: {0}")]
    DataConsistency(String),

    #[error("malformed input {path} line {line}: {message}")]
    Input { path: PathBuf, line: u64, message: String },

    #[error("netcdf write failed: {0}")]
    Write(#[from] netcdf::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GliderError {
    pub(crate) fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        GliderError::Config { path: path.into(), message: message.into() }
    }

    pub(crate) fn data(message: impl Into<String>) -> Self {
        GliderError::DataConsistency(message.into())
    }
}
