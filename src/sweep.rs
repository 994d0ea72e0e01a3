//! Orchestration of a full orphan sweep.

use std::sync::Arc;

use crate::{
    classify::{Classification, Classifier},
    config::SweepConfig,
    delete::BatchDeleter,
    error::{SweepError, SweepResult},
    keyset::build_parent_key_set,
    progress::{DELETE_LOG_EVERY, ProgressCounter},
    scan::{SCAN_LOG_EVERY, TableScan},
    store::StoreClient,
};

/// Totals from a single sweep run.
#[derive(Debug, Default)]
pub struct SweepRunResult {
    /// Distinct parent keys collected before classification began.
    pub parent_keys: u64,
    /// Child records scanned and classified.
    pub child_records: u64,
    /// Deletions acknowledged by the store (with `dry_run`, deletions that
    /// would have been submitted).
    pub deleted: u64,
    /// Orphans kept because they were younger than the cutoff or of
    /// unknowable age.
    pub kept_too_recent: u64,
    /// Records whose reference resolved to a live parent.
    pub kept_live: u64,
    /// Delete-eligible records missing their own key attribute.
    pub missing_key: u64,
    /// Keys still unprocessed after delete retries were exhausted.
    pub delete_failures: u64,
}

impl SweepRunResult {
    /// Check if any records were deleted.
    pub fn has_deletions(&self) -> bool {
        self.deleted > 0
    }
}

/// Delete every orphaned record in the configured child table.
///
/// Builds the complete parent key set first, then streams the child table,
/// classifying each record and feeding delete-eligible keys to a concurrent
/// batch deletion engine. Deletion is at-least-once and idempotent: a run
/// aborted by a failure can simply be re-invoked, since already-deleted keys
/// do not reappear in the next scan.
///
/// Configuration problems surface as [`SweepError::Config`] before anything
/// is deleted. A scan failure or a fatal store error aborts the run after
/// in-flight batches drain; retry exhaustion on individual keys does not.
pub async fn purge_orphans(
    store: Arc<dyn StoreClient>,
    config: &SweepConfig,
) -> SweepResult<SweepRunResult> {
    config.validate()?;

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };

    tracing::info!(
        parent_table = %config.parent_table,
        child_table = %config.child_table,
        max_workers = config.max_workers,
        "Purge of orphaned items started{}",
        dry_run_msg
    );

    let parents =
        build_parent_key_set(store.as_ref(), &config.parent_table, &config.key_attribute).await?;

    let mut classifier = Classifier::new(
        &parents,
        &config.key_attribute,
        &config.reference_attribute,
    );
    let cutoff = config.timestamp_filter.as_ref().map(|f| f.cutoff());
    if let (Some(filter), Some(cutoff)) = (&config.timestamp_filter, cutoff) {
        classifier = classifier.with_age_gate(&filter.attribute, &filter.format, cutoff);
    }

    let progress = Arc::new(ProgressCounter::new(&config.child_table, DELETE_LOG_EVERY));
    let mut deleter = BatchDeleter::new(store.clone(), config, progress.clone());

    let mut result = SweepRunResult {
        parent_keys: parents.len() as u64,
        ..Default::default()
    };

    // Drain the worker pool even when the scan fails: the run must not
    // return while batches are in flight.
    let scanned = scan_and_classify(store.as_ref(), config, &classifier, &mut deleter, &mut result)
        .await;
    let drained = deleter.finish().await;

    scanned?;
    result.delete_failures = drained?.failed_keys;
    result.deleted = progress.total();

    tracing::info!(
        parent_table = %config.parent_table,
        child_table = %config.child_table,
        scanned = result.child_records,
        deleted = result.deleted,
        too_recent = result.kept_too_recent,
        failed = result.delete_failures,
        "Purge of orphaned items finished{}",
        dry_run_msg
    );

    Ok(result)
}

async fn scan_and_classify(
    store: &dyn StoreClient,
    config: &SweepConfig,
    classifier: &Classifier<'_>,
    deleter: &mut BatchDeleter,
    result: &mut SweepRunResult,
) -> SweepResult<()> {
    // Project only what classification reads, as the store bills per item
    // size scanned.
    let mut attributes = vec![
        config.key_attribute.as_str(),
        config.reference_attribute.as_str(),
    ];
    if let Some(filter) = &config.timestamp_filter {
        attributes.push(filter.attribute.as_str());
    }

    let cancel = deleter.cancel_token();
    let mut scan = TableScan::new(store, &config.child_table, &attributes);

    loop {
        // A fatal delete error means the run is already failing; stop
        // feeding the engine and let finish() report it.
        if cancel.is_cancelled() {
            return Ok(());
        }

        let page = scan.next_page().await.map_err(|source| SweepError::Scan {
            table: config.child_table.clone(),
            source,
        })?;
        let Some(records) = page else { return Ok(()) };

        for record in records {
            result.child_records += 1;
            if result.child_records % SCAN_LOG_EVERY == 0 {
                tracing::info!(
                    table = %config.child_table,
                    scanned = result.child_records,
                    "Child scan progress"
                );
            }

            match classifier.classify(&record) {
                Classification::Live => result.kept_live += 1,
                Classification::TooRecent => result.kept_too_recent += 1,
                Classification::Orphan(key) => deleter.push(key).await,
                Classification::Unkeyed => {
                    result.missing_key += 1;
                    tracing::warn!(
                        table = %config.child_table,
                        key_attribute = %config.key_attribute,
                        "Orphaned record is missing its key attribute and cannot be deleted"
                    );
                }
            }
        }
    }
}
