use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, cleaning or writing recordings.
#[derive(Error, Debug)]
pub enum CleanError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("series has {actual} samples but the table has {expected} sample rows")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl CleanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Recoverable input problems: the affected file or column is skipped and
/// processing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    #[error("table has no sample rows")]
    EmptyTable,

    #[error("column '{0}' not found")]
    MissingColumn(String),
}

pub type Result<T, E = CleanError> = std::result::Result<T, E>;
