use thiserror::Error;

use crate::store::StoreError;

/// Configuration problems, surfaced before any record is deleted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("parent and child table must differ")]
    SameTable,

    #[error("max_workers must be at least 1")]
    ZeroWorkers,

    #[error("max_batch_size must be between 1 and {max}")]
    InvalidBatchSize { max: usize },

    #[error("invalid timestamp format string '{format}'")]
    InvalidTimestampFormat { format: String },

    /// A parent record without its key attribute means the parent set cannot
    /// be trusted to be complete, so no deletion decision is safe.
    #[error("parent record in '{table}' is missing key attribute '{attribute}'")]
    MissingParentKey { table: String, attribute: String },
}

/// Terminal failure of a sweep run.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A scan failed. Never retried: an incomplete scan cannot safely feed
    /// deletion decisions, so the run aborts and should be re-invoked.
    #[error("scan of table '{table}' failed: {source}")]
    Scan { table: String, source: StoreError },

    /// A delete batch hit a fatal store error. In-flight batches were
    /// drained before this was returned.
    #[error("batch delete against table '{table}' failed: {source}")]
    Delete { table: String, source: StoreError },
}

pub type SweepResult<T> = Result<T, SweepError>;
