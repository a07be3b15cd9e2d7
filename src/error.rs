use std::path::PathBuf;

use thiserror::Error;

/// Kinematics analysis error types
#[derive(Error, Debug)]
pub enum KinematicsError {
    #[error("Insufficient data: {0}")]
    DataError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Malformed recording {path:?} (row {row}): {reason}")]
    Decode {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for analysis operations
pub type KinResult<T> = Result<T, KinematicsError>;

impl KinematicsError {
    pub fn data(msg: impl Into<String>) -> Self {
        KinematicsError::DataError(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        KinematicsError::InvalidParameters(msg.into())
    }

    /// True for failures caused by the content of a single trial window,
    /// as opposed to I/O or configuration problems.
    pub fn is_data_error(&self) -> bool {
        matches!(self, KinematicsError::DataError(_))
    }
}
