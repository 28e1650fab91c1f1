use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or parsing the input file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open input {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed row {row}: {reason}")]
    Parse { row: u64, reason: String },
}

/// A single write that the sink refused or could not complete.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to connect to sink: {0}")]
    SinkConnect(#[source] sqlx::Error),
    #[error("worker {worker_id} failed to write record {record_id}: {source}")]
    Write {
        worker_id: usize,
        record_id: String,
        #[source]
        source: SinkError,
    },
    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LoaderError {
    /// True for errors that happen before any worker is spawned.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            LoaderError::Config(_)
                | LoaderError::SinkConnect(_)
                | LoaderError::Source(SourceError::Open { .. })
        )
    }
}
