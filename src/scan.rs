//! Paginated table scans.

use crate::store::{Record, ScanToken, StoreClient, StoreResult};

/// How often scan progress is logged, in records.
pub(crate) const SCAN_LOG_EVERY: u64 = 1000;

/// Lazily pages through a table via a [`StoreClient`].
///
/// The caller drives pagination to completion; nothing is fetched until
/// [`next_page`] is called. Scans are never retried here: a failed page
/// surfaces immediately so the caller aborts rather than act on a silently
/// truncated result.
///
/// [`next_page`]: TableScan::next_page
pub struct TableScan<'a> {
    store: &'a dyn StoreClient,
    table: &'a str,
    attributes: &'a [&'a str],
    next: Option<ScanToken>,
    done: bool,
}

impl<'a> TableScan<'a> {
    /// Scan `table` from the beginning, projecting only `attributes`.
    pub fn new(store: &'a dyn StoreClient, table: &'a str, attributes: &'a [&'a str]) -> Self {
        Self {
            store,
            table,
            attributes,
            next: None,
            done: false,
        }
    }

    /// Resume a scan from a previously returned continuation token.
    pub fn from_token(
        store: &'a dyn StoreClient,
        table: &'a str,
        attributes: &'a [&'a str],
        token: ScanToken,
    ) -> Self {
        Self {
            store,
            table,
            attributes,
            next: Some(token),
            done: false,
        }
    }

    /// Fetch the next page. Returns `Ok(None)` once the table is exhausted.
    ///
    /// A page may be empty while later pages still hold records; only `None`
    /// terminates the scan.
    pub async fn next_page(&mut self) -> StoreResult<Option<Vec<Record>>> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .store
            .scan_page(self.table, self.attributes, self.next.take())
            .await?;

        match page.next {
            Some(token) => self.next = Some(token),
            None => self.done = true,
        }
        Ok(Some(page.records))
    }
}
