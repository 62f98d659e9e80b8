//! Errors that abort a run or an I/O operation.
//!
//! Validation findings are never errors: they are [`Issue`](crate::eo3::issues::Issue)s.
//! Only unreadable inputs and failures writing generated documents end up here.
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::eo3::raster::RasterReadError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("unsupported location: {0}")]
    UnsupportedLocation(String),

    #[error("builder error: {0}")]
    Builder(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("schema {name} could not be compiled: {reason}")]
    Schema { name: &'static str, reason: String },

    #[error("raster error: {0}")]
    Raster(#[from] RasterReadError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn file_not_found(path: &Path) -> Self {
        Self::FileNotFound(path.to_path_buf())
    }

    pub fn invalid_format(message: impl ToString) -> Self {
        Self::InvalidFormat(message.to_string())
    }

    pub fn yaml(path: impl ToString, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.to_string(),
            source,
        }
    }
}
