//! Error taxonomy shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("model not found at {0}; train the model first")]
    ModelNotFound(String),

    #[error("data format error: {0}")]
    DataFormat(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("explanation generation failed: {0}")]
    ExplanationGeneration(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Serializable mirror of [`SentinelError`] used in status objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelNotFound,
    DataFormat,
    EmptyInput,
    ExplanationGeneration,
    Persistence,
    Config,
}

impl SentinelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SentinelError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            SentinelError::DataFormat(_) => ErrorKind::DataFormat,
            SentinelError::EmptyInput(_) => ErrorKind::EmptyInput,
            SentinelError::ExplanationGeneration(_) => ErrorKind::ExplanationGeneration,
            SentinelError::Persistence(_) => ErrorKind::Persistence,
            SentinelError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for SentinelError {
    fn from(err: std::io::Error) -> Self {
        SentinelError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::Persistence(err.to_string())
    }
}

impl From<csv::Error> for SentinelError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => SentinelError::Persistence(err.to_string()),
            _ => SentinelError::DataFormat(err.to_string()),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for SentinelError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        SentinelError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let err = SentinelError::ModelNotFound("model.json".into());
        let kind = serde_json::to_string(&err.kind()).unwrap();
        assert_eq!(kind, "\"model_not_found\"");
    }

    #[test]
    fn io_errors_are_persistence() {
        let err: SentinelError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
