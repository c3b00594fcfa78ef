use thiserror::Error;

/// Errors surfaced outside the sample path (config, files).
///
/// The detection path itself never fails; bad samples are dropped.
#[derive(Error, Debug)]
pub enum HazardError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid session log: {0}")]
    InvalidLog(String),
}

pub type HazardResult<T> = Result<T, HazardError>;
