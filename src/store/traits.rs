use async_trait::async_trait;

use super::{
    error::StoreResult,
    types::{ItemKey, ScanPage, ScanToken},
};

/// The paginated key-value store a sweep runs against.
///
/// Implementations must return every record of a table under pagination
/// without silently dropping pages, accept up to [`MAX_BATCH_SIZE`] delete
/// keys per call and report the subset left unprocessed, and distinguish
/// transient from fatal conditions via [`StoreError`].
///
/// Neither operation retries internally. Retry policy belongs to the caller:
/// scans are never retried (a partial scan cannot safely feed deletion
/// decisions), deletions are retried per batch by the deletion engine.
///
/// [`MAX_BATCH_SIZE`]: super::MAX_BATCH_SIZE
/// [`StoreError`]: super::StoreError
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Fetch one page of `table`, projecting only the named attributes.
    ///
    /// Pass the previous page's token to continue; `None` starts from the
    /// beginning. The returned page's `next` is `None` once the table is
    /// exhausted. A page may be empty while `next` is still set.
    async fn scan_page(
        &self,
        table: &str,
        attributes: &[&str],
        start: Option<ScanToken>,
    ) -> StoreResult<ScanPage>;

    /// Delete the given keys from `table` in one batch call.
    ///
    /// Returns the subset the store reported as unprocessed (throttled or
    /// otherwise deferred); an empty vector means every key was acknowledged.
    async fn delete_batch(&self, table: &str, keys: Vec<ItemKey>) -> StoreResult<Vec<ItemKey>>;
}
