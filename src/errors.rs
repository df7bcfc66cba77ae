use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::state::PipelineStage;

/// A source file that could not be analyzed for endpoints.
///
/// Never fatal: the file simply contributes no endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse skipped for {}: {reason}", path.display())]
pub struct ParseSkipped {
    pub path: PathBuf,
    pub reason: String,
}

impl ParseSkipped {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Why an external payload generator could not be used.
/// The payload source turns every one of these into a fallback.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generator returned HTTP {0}")]
    Status(u16),

    #[error("generator returned a malformed payload list: {0}")]
    Malformed(String),

    #[error("generator returned an empty payload list")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot create report directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write report into {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot persist report to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read report {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Fatal reasons a run ends in the `Failed` state.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("StorageFailed: {0}")]
    Storage(#[from] StorageError),

    #[error("Cancelled: run aborted at a stage boundary")]
    Cancelled,

    #[error("TimedOut: run exceeded its {0:?} budget")]
    TimedOut(Duration),

    #[error("Incomplete: expected {expected} fuzz results, {received} usable")]
    Incomplete { expected: usize, received: usize },

    #[error("AlreadyFinished: pipeline has already run and ended in {0}")]
    AlreadyFinished(PipelineStage),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("base URL is required")]
    MissingBaseUrl,

    #[error("invalid base URL '{0}': {1}")]
    InvalidBaseUrl(String, String),

    #[error("max_workers must be a positive integer")]
    ZeroWorkers,

    #[error("per-request timeout must be at least one second")]
    ZeroTimeout,

    #[error("no endpoint sources given (use --source or --endpoints)")]
    NoSources,

    #[error("generator '{0}' requires a generator URL")]
    MissingGeneratorUrl(String),
}

#[derive(Debug, Error)]
pub enum RequestBuildError {
    #[error("cannot resolve URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("no fuzz strategy for method {0}")]
    UnsupportedMethod(String),

    #[error("cannot encode JSON body: {0}")]
    Json(#[from] serde_json::Error),
}
