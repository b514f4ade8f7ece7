//! Error type shared by the loaders, the configuration layer and the exact solver interface.

use std::path::PathBuf;

/// Errors raised while loading data, validating configuration or calling an external solver.
///
/// Scheduling anomalies (an unplaceable request, an infeasible schedule) are not errors:
/// they are reported through [`crate::schedule::Schedule`] itself.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown location '{0}'")]
    UnknownLocation(String),

    #[error("drive time matrix row '{row}' has {found} entries, expected {expected}")]
    MatrixShape { row: String, found: usize, expected: usize },

    #[error("invalid drive time {value} from '{from}' to '{to}'")]
    InvalidDriveTime { from: String, to: String, value: f64 },

    #[error("shipment '{id}' has an invalid time window: {reason}")]
    InvalidWindow { id: String, reason: String },

    #[error("shipment '{0}' appears more than once in the input")]
    DuplicateRequest(String),

    #[error("depot '{0}' is not a known location")]
    MissingDepot(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("exact solver unavailable: {0}")]
    ExactUnavailable(String),
}

impl SolverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SolverError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
