//! Error handling primitives shared across the crate.
//!
//! Every failure carries a stable [`ErrorCode`] so the HTTP layer and the
//! command line tools can map it to a status or exit code without matching
//! on message text.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Stable error codes surfaced to HTTP clients and process exit statuses.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Raw data could not be read or decoded.
    DataLoad = 1,
    /// Raw data is missing a required column.
    Schema = 2,
    /// A version or algorithm reference does not resolve.
    Config = 3,
    /// Requested model artefact was not available.
    ModelMissing = 4,
    /// Input failed validation.
    InvalidInput = 5,
    /// Catch-all for prediction and plumbing failures.
    Internal = 6,
}

impl ErrorCode {
    /// HTTP status used when this code crosses the serving boundary.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Ok => 200,
            ErrorCode::InvalidInput => 400,
            ErrorCode::ModelMissing => 404,
            _ => 500,
        }
    }

    /// Process exit status for the offline tools.
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

/// Canonical error type for the crate.
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("failed to load {path}: {reason}")]
    DataLoad { path: PathBuf, reason: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("unknown model version '{requested}' (available: {available})")]
    UnknownVersion { requested: String, available: String },

    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("incomplete configuration for '{version}': {reason}")]
    IncompleteConfig { version: String, reason: String },

    #[error("requested features are not derivable from the data: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("no trained artifact for version '{version}' at {path}")]
    ArtifactNotFound { version: String, path: PathBuf },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("prediction error: {0}")]
    Prediction(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias used throughout the crate.
pub type PricingResult<T> = Result<T, PricingError>;

impl PricingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PricingError::DataLoad { .. } => ErrorCode::DataLoad,
            PricingError::Schema(_) | PricingError::MissingFeatures(_) => ErrorCode::Schema,
            PricingError::UnknownVersion { .. }
            | PricingError::UnsupportedAlgorithm(_)
            | PricingError::IncompleteConfig { .. }
            | PricingError::Config(_) => ErrorCode::Config,
            PricingError::ArtifactNotFound { .. } => ErrorCode::ModelMissing,
            PricingError::Validation(_) => ErrorCode::InvalidInput,
            PricingError::Prediction(_)
            | PricingError::Training(_)
            | PricingError::Serialization(_)
            | PricingError::Io(_) => ErrorCode::Internal,
        }
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        PricingError::Validation(msg.into())
    }

    /// Prediction helper.
    pub fn prediction(msg: impl Into<String>) -> Self {
        PricingError::Prediction(msg.into())
    }

    /// Collapse any failure into the serving-boundary taxonomy: validation
    /// errors pass through, everything else becomes a prediction error.
    pub fn at_serving_boundary(self) -> Self {
        match self {
            err @ PricingError::Validation(_) => err,
            other => PricingError::Prediction(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PricingError {
    fn from(err: serde_json::Error) -> Self {
        PricingError::Serialization(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for PricingError {
    fn from(err: bincode::error::EncodeError) -> Self {
        PricingError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for PricingError {
    fn from(err: bincode::error::DecodeError) -> Self {
        PricingError::Serialization(err.to_string())
    }
}
