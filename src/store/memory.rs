//! In-memory store backend.
//!
//! Backs tests and local experiments with deterministic paging plus scripted
//! fault injection: queued transient/fatal errors and keys the next delete
//! call reports as unprocessed. Every submitted delete batch is recorded so
//! tests can assert batch sizes and retry isolation.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;

use super::{
    error::{StoreError, StoreResult},
    traits::StoreClient,
    types::{ItemKey, Record, ScalarValue, ScanPage, ScanToken},
};

/// Attribute name the continuation token stores the resume position under.
const SEQ_ATTRIBUTE: &str = "__seq";

/// In-memory [`StoreClient`] with scripted fault injection.
///
/// Pagination resumes after the last evaluated row, not at a positional
/// offset, so rows deleted while a scan is in flight are never skipped over
/// and never yielded twice — the same contract DynamoDB's
/// `LastEvaluatedKey` gives.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Rows tagged with a monotonically increasing sequence number.
    tables: Mutex<HashMap<String, Vec<(u64, Record)>>>,
    next_seq: AtomicU64,
    page_size: Option<usize>,
    scan_faults: Mutex<VecDeque<StoreError>>,
    delete_faults: Mutex<VecDeque<StoreError>>,
    unprocessed_once: Mutex<HashSet<ItemKey>>,
    unprocessed_always: Mutex<HashSet<ItemKey>>,
    delete_calls: Mutex<Vec<Vec<ItemKey>>>,
}

impl MemoryStore {
    /// Store returning every table in a single page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap scan pages at `page_size` records.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Create `table` if it does not exist, leaving existing rows alone.
    pub fn create_table(&self, table: &str) {
        self.tables
            .lock()
            .expect("poisoned lock")
            .entry(table.to_string())
            .or_default();
    }

    /// Append a record to `table`, creating the table if needed.
    pub fn insert(&self, table: &str, record: Record) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.tables
            .lock()
            .expect("poisoned lock")
            .entry(table.to_string())
            .or_default()
            .push((seq, record));
    }

    /// Snapshot of the rows currently in `table`.
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .expect("poisoned lock")
            .get(table)
            .map(|rows| rows.iter().map(|(_, record)| record.clone()).collect())
            .unwrap_or_default()
    }

    /// Queue an error for the next `scan_page` call.
    pub fn fail_next_scan(&self, error: StoreError) {
        self.scan_faults
            .lock()
            .expect("poisoned lock")
            .push_back(error);
    }

    /// Queue an error for the next `delete_batch` call.
    pub fn fail_next_delete(&self, error: StoreError) {
        self.delete_faults
            .lock()
            .expect("poisoned lock")
            .push_back(error);
    }

    /// Report `key` as unprocessed on its next submission, then process it
    /// normally on any later one.
    pub fn mark_unprocessed_once(&self, key: ItemKey) {
        self.unprocessed_once
            .lock()
            .expect("poisoned lock")
            .insert(key);
    }

    /// Report `key` as unprocessed on every submission.
    pub fn mark_unprocessed_always(&self, key: ItemKey) {
        self.unprocessed_always
            .lock()
            .expect("poisoned lock")
            .insert(key);
    }

    /// Every delete batch submitted so far, in submission order.
    pub fn delete_calls(&self) -> Vec<Vec<ItemKey>> {
        self.delete_calls.lock().expect("poisoned lock").clone()
    }

    /// Size of the largest delete batch submitted so far.
    pub fn max_batch_seen(&self) -> usize {
        self.delete_calls()
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    fn parse_token(token: &ScanToken) -> StoreResult<u64> {
        let value = token
            .0
            .get(SEQ_ATTRIBUTE)
            .ok_or_else(|| StoreError::fatal("invalid continuation token"))?;
        match value {
            ScalarValue::N(n) => n
                .parse()
                .map_err(|_| StoreError::fatal("invalid continuation token")),
            _ => Err(StoreError::fatal("invalid continuation token")),
        }
    }

    fn token_after(seq: u64) -> ScanToken {
        let mut map = HashMap::new();
        map.insert(SEQ_ATTRIBUTE.to_string(), ScalarValue::N(seq.to_string()));
        ScanToken(map)
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn scan_page(
        &self,
        table: &str,
        attributes: &[&str],
        start: Option<ScanToken>,
    ) -> StoreResult<ScanPage> {
        if let Some(error) = self.scan_faults.lock().expect("poisoned lock").pop_front() {
            return Err(error);
        }

        let tables = self.tables.lock().expect("poisoned lock");
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::fatal(format!("table '{table}' not found")))?;

        let after = match start {
            Some(token) => Some(Self::parse_token(&token)?),
            None => None,
        };

        let remaining: Vec<&(u64, Record)> = rows
            .iter()
            .filter(|(seq, _)| after.is_none_or(|after| *seq > after))
            .collect();

        let page_len = match self.page_size {
            Some(size) => size.min(remaining.len()),
            None => remaining.len(),
        };

        let records = remaining[..page_len]
            .iter()
            .map(|(_, row)| {
                row.iter()
                    .filter(|(name, _)| attributes.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .collect();

        let next = (page_len > 0 && page_len < remaining.len())
            .then(|| Self::token_after(remaining[page_len - 1].0));

        Ok(ScanPage { records, next })
    }

    async fn delete_batch(&self, table: &str, keys: Vec<ItemKey>) -> StoreResult<Vec<ItemKey>> {
        self.delete_calls
            .lock()
            .expect("poisoned lock")
            .push(keys.clone());

        if let Some(error) = self.delete_faults.lock().expect("poisoned lock").pop_front() {
            return Err(error);
        }

        let mut tables = self.tables.lock().expect("poisoned lock");
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::fatal(format!("table '{table}' not found")))?;

        let mut deferred = self.unprocessed_once.lock().expect("poisoned lock");
        let stuck = self.unprocessed_always.lock().expect("poisoned lock");
        let mut unprocessed = Vec::new();
        for key in keys {
            if stuck.contains(&key) || deferred.remove(&key) {
                unprocessed.push(key);
                continue;
            }
            rows.retain(|(_, row)| row.get(&key.attribute) != Some(&key.value));
        }
        Ok(unprocessed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> Record {
        let mut record = HashMap::new();
        record.insert("id".to_string(), ScalarValue::S(id.to_string()));
        record.insert("extra".to_string(), ScalarValue::N("1".to_string()));
        record
    }

    #[tokio::test]
    async fn test_scan_pages_and_projection() {
        let store = MemoryStore::new().with_page_size(2);
        for id in ["a", "b", "c"] {
            store.insert("t", row(id));
        }

        let page = store.scan_page("t", &["id"], None).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.next.is_some());
        // Only the projected attribute survives.
        assert_eq!(page.records[0].len(), 1);
        assert!(page.records[0].contains_key("id"));

        let page = store.scan_page("t", &["id"], page.next).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_scan_missing_table_is_fatal() {
        let store = MemoryStore::new();
        let err = store.scan_page("nope", &["id"], None).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_deletes_between_pages_do_not_shift_the_scan() {
        let store = MemoryStore::new().with_page_size(2);
        for id in ["a", "b", "c", "d"] {
            store.insert("t", row(id));
        }

        let page = store.scan_page("t", &["id"], None).await.unwrap();
        assert_eq!(page.records.len(), 2);

        // Delete an already-scanned row before fetching the next page.
        store
            .delete_batch("t", vec![ItemKey::new("id", ScalarValue::S("a".into()))])
            .await
            .unwrap();

        let page = store.scan_page("t", &["id"], page.next).await.unwrap();
        let ids: Vec<_> = page
            .records
            .iter()
            .filter_map(|r| r.get("id").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_delete_removes_rows_and_defers_marked_keys() {
        let store = MemoryStore::new();
        store.insert("t", row("a"));
        store.insert("t", row("b"));
        store.mark_unprocessed_once(ItemKey::new("id", ScalarValue::S("b".into())));

        let unprocessed = store
            .delete_batch(
                "t",
                vec![
                    ItemKey::new("id", ScalarValue::S("a".into())),
                    ItemKey::new("id", ScalarValue::S("b".into())),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            unprocessed,
            vec![ItemKey::new("id", ScalarValue::S("b".into()))]
        );
        assert_eq!(store.records("t").len(), 1);

        // The deferred key processes normally on resubmission.
        let unprocessed = store
            .delete_batch("t", vec![ItemKey::new("id", ScalarValue::S("b".into()))])
            .await
            .unwrap();
        assert!(unprocessed.is_empty());
        assert!(store.records("t").is_empty());
    }

    #[tokio::test]
    async fn test_scripted_faults_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.create_table("t");
        store.fail_next_scan(StoreError::transient("throttled"));

        assert!(store.scan_page("t", &["id"], None).await.is_err());
        assert!(store.scan_page("t", &["id"], None).await.is_ok());
    }
}
