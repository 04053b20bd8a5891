//! Error taxonomy shared by the fitting core and its I/O boundary.

use thiserror::Error;

/// Errors raised by session operations and the boundary helpers in `io`.
///
/// Cancellation is deliberately absent: a stop request ends a run with
/// `TrainStatus::Stopped`, which is not a failure.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no target image loaded; call initialize first")]
    NoImageLoaded,

    #[error("a training run is already active on this session")]
    Busy,

    #[error("numeric instability: {0}")]
    NumericInstability(String),

    #[error("training worker failed: {0}")]
    Worker(String),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FitError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        FitError::InvalidConfiguration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FitError>;
