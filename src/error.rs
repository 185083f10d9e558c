use std::path::PathBuf;

use thiserror::Error;

use crate::service::ServiceError;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Configuration error in `{field}`: {reason}")]
    Configuration { field: &'static str, reason: String },

    #[error("Cannot read configuration file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Activation failed: {0}")]
    Activation(#[source] ServiceError),

    #[error("Background recording failed after {recorded} of {requested} sweeps: {source}")]
    BackgroundRecording {
        recorded: usize,
        requested: usize,
        #[source]
        source: ServiceError,
    },

    #[error("Recorded threshold requires a background profile")]
    MissingBackground,

    #[error("Sensor service unavailable: {0}")]
    ServiceUnavailable(#[source] ServiceError),

    #[error("Detector handle used after destroy")]
    UseAfterDestroy,

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

impl DetectorError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
