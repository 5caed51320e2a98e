use thiserror::Error;

use crate::{event::ReportError, tracker::TrackerError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No Tokio runtime available for the shared concurrency policy")]
    NoRuntime,

    #[error("Failed to build runtime: {0}")]
    RuntimeBuild(#[source] std::io::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    pub fn invalid_configuration<S: Into<String>>(message: S) -> Self {
        Error::InvalidConfiguration(message.into())
    }
}
