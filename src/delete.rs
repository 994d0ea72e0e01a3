//! Concurrent batch deletion with bounded workers and partial-failure retry.
//!
//! Candidate keys accumulate into batches of at most the store's batch-write
//! limit. Each full batch takes a slot from a worker pool bounded by
//! `max_workers`; when the pool is saturated, dispatch awaits a slot, which
//! backpressures the classification scan feeding the engine. Keys the store
//! reports as unprocessed are resubmitted with exponential backoff until
//! acknowledged or retries are exhausted; exhaustion is a logged per-key
//! failure, not a run failure. A fatal store error stops intake of new
//! batches, lets in-flight batches finish, and surfaces as the run's
//! terminal error from [`BatchDeleter::finish`].

use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{RetryConfig, SweepConfig},
    error::{SweepError, SweepResult},
    progress::ProgressCounter,
    store::{ItemKey, StoreClient, StoreError},
};

/// Terminal state of one dispatched batch.
#[derive(Debug)]
enum BatchOutcome {
    /// Every key acknowledged.
    Acknowledged,
    /// Retries exhausted with this many keys never processed.
    FailedTerminal { unprocessed: usize },
    /// The store reported a non-retryable error.
    Fatal(StoreError),
}

/// Totals reported by [`BatchDeleter::finish`].
#[derive(Debug, Default)]
pub struct DeleteStats {
    /// Keys still unprocessed after retry exhaustion.
    pub failed_keys: u64,
}

/// Shared by every delete worker of one run.
struct DeleteContext {
    store: Arc<dyn StoreClient>,
    table: String,
    retry: RetryConfig,
    progress: Arc<ProgressCounter>,
    cancel: CancellationToken,
    dry_run: bool,
}

/// Batch deletion engine for one sweep run.
pub struct BatchDeleter {
    ctx: Arc<DeleteContext>,
    buffer: Vec<ItemKey>,
    max_batch_size: usize,
    pool: Arc<Semaphore>,
    workers: JoinSet<BatchOutcome>,
}

impl BatchDeleter {
    /// Engine deleting from the config's child table, sharing `progress`
    /// with the caller.
    pub fn new(
        store: Arc<dyn StoreClient>,
        config: &SweepConfig,
        progress: Arc<ProgressCounter>,
    ) -> Self {
        Self {
            ctx: Arc::new(DeleteContext {
                store,
                table: config.child_table.clone(),
                retry: config.retry.clone(),
                progress,
                cancel: CancellationToken::new(),
                dry_run: config.dry_run,
            }),
            buffer: Vec::with_capacity(config.max_batch_size),
            max_batch_size: config.max_batch_size,
            pool: Arc::new(Semaphore::new(config.max_workers)),
            workers: JoinSet::new(),
        }
    }

    /// Cancelled when any worker hits a fatal store error. Producers should
    /// stop feeding the engine once this fires.
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Queue a key for deletion, dispatching a batch once full.
    ///
    /// Awaits a worker slot when the pool is saturated.
    pub async fn push(&mut self, key: ItemKey) {
        self.buffer.push(key);
        if self.buffer.len() >= self.max_batch_size {
            self.dispatch().await;
        }
    }

    /// Flush the partial final batch and drain every worker.
    ///
    /// Returns the first fatal store error any worker hit, after all
    /// in-flight batches have finished.
    pub async fn finish(mut self) -> SweepResult<DeleteStats> {
        self.dispatch().await;

        let mut stats = DeleteStats::default();
        let mut fatal: Option<StoreError> = None;

        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(BatchOutcome::Acknowledged) => {}
                Ok(BatchOutcome::FailedTerminal { unprocessed }) => {
                    stats.failed_keys += unprocessed as u64;
                }
                Ok(BatchOutcome::Fatal(error)) => {
                    if fatal.is_none() {
                        fatal = Some(error);
                    }
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Delete worker task failed");
                }
            }
        }

        match fatal {
            Some(source) => Err(SweepError::Delete {
                table: self.ctx.table.clone(),
                source,
            }),
            None => Ok(stats),
        }
    }

    async fn dispatch(&mut self) {
        if self.buffer.is_empty() || self.ctx.cancel.is_cancelled() {
            return;
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.max_batch_size));

        let permit = match self.pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            // The pool is never closed while the engine lives.
            Err(_) => {
                tracing::error!(table = %self.ctx.table, "Worker pool closed unexpectedly");
                self.ctx.cancel.cancel();
                return;
            }
        };

        let ctx = self.ctx.clone();
        self.workers.spawn(async move {
            let outcome = submit_with_retry(&ctx, batch).await;
            drop(permit);
            outcome
        });
    }
}

/// Drive one batch through its state machine:
/// `Pending → Submitted → {Acknowledged | PartiallyUnprocessed →
/// Pending(retry) | FailedTerminal}`.
async fn submit_with_retry(ctx: &DeleteContext, batch: Vec<ItemKey>) -> BatchOutcome {
    if ctx.dry_run {
        tracing::info!(
            table = %ctx.table,
            keys = batch.len(),
            "DRY RUN: would delete batch"
        );
        ctx.progress.record(batch.len() as u64);
        return BatchOutcome::Acknowledged;
    }

    let max_attempts = if ctx.retry.enabled {
        ctx.retry.max_retries + 1
    } else {
        1
    };

    let mut pending = batch;

    for attempt in 0..max_attempts {
        match ctx.store.delete_batch(&ctx.table, pending.clone()).await {
            Ok(unprocessed) => {
                // Keys acknowledged this round are counted exactly once,
                // even when the rest of the batch keeps retrying.
                let acknowledged = pending.len() - unprocessed.len();
                ctx.progress.record(acknowledged as u64);

                if unprocessed.is_empty() {
                    if attempt > 0 {
                        tracing::debug!(
                            table = %ctx.table,
                            attempt = attempt + 1,
                            "Batch acknowledged after retry"
                        );
                    }
                    return BatchOutcome::Acknowledged;
                }

                if attempt + 1 < max_attempts {
                    let delay = ctx.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        table = %ctx.table,
                        unprocessed = unprocessed.len(),
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Store left keys unprocessed, will resubmit after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                pending = unprocessed;
            }
            Err(error) if error.is_transient() => {
                if attempt + 1 < max_attempts {
                    let delay = ctx.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        table = %ctx.table,
                        error = %error,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient delete failure, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(error) => {
                tracing::error!(
                    table = %ctx.table,
                    error = %error,
                    keys = pending.len(),
                    "Fatal store error during batch delete, aborting run"
                );
                ctx.cancel.cancel();
                return BatchOutcome::Fatal(error);
            }
        }
    }

    for key in &pending {
        tracing::error!(
            table = %ctx.table,
            key = %key,
            attempts = max_attempts,
            "Delete retries exhausted; key left unprocessed"
        );
    }
    BatchOutcome::FailedTerminal {
        unprocessed: pending.len(),
    }
}
