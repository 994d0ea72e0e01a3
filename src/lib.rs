//! Orphaned-item sweeper for DynamoDB-style key-value stores.
//!
//! Finds records in a dependent table whose reference attribute no longer
//! resolves to any record of a parent table and deletes them through the
//! store's bounded batch-delete operation, with a worker pool capped at a
//! configurable concurrency ceiling.
//!
//! The pipeline runs in three stages:
//! 1. Scan the parent table to completion, collecting every key value.
//! 2. Stream the child table, classifying each record as live, orphaned, or
//!    too recent to judge (an optional age guard protects just-inserted
//!    children whose parent write is not yet scan-visible).
//! 3. Batch delete-eligible keys and submit them concurrently, retrying
//!    keys the store reports as unprocessed with exponential backoff.
//!
//! Deletion is at-least-once and idempotent, not exactly-once: re-running
//! the sweep after a failure is the intended recovery path.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dynamo_sweep::{SweepConfig, purge_orphans};
//! use dynamo_sweep::store::{DynamoStore, DynamoStoreConfig};
//!
//! # async fn run() -> Result<(), dynamo_sweep::SweepError> {
//! let store = Arc::new(DynamoStore::connect(DynamoStoreConfig::new("eu-west-1")).await);
//!
//! let config = SweepConfig::new("users", "user-sessions", "id", "userId")
//!     .with_timestamp_filter("createdAt", "%Y-%m-%dT%H:%M:%S");
//!
//! let result = purge_orphans(store, &config).await?;
//! tracing::info!(deleted = result.deleted, "sweep done");
//! # Ok(())
//! # }
//! ```

mod classify;
mod config;
mod delete;
mod error;
mod keyset;
mod progress;
mod scan;
pub mod store;
mod sweep;
#[cfg(test)]
mod tests;

pub use classify::{Classification, Classifier};
pub use config::{RetryConfig, SweepConfig, TimestampFilter};
pub use delete::{BatchDeleter, DeleteStats};
pub use error::{ConfigError, SweepError, SweepResult};
pub use keyset::{ParentKeySet, build_parent_key_set};
pub use progress::ProgressCounter;
pub use scan::TableScan;
pub use store::{ItemKey, Record, ScalarValue, StoreClient, StoreError};
pub use sweep::{SweepRunResult, purge_orphans};
