//! Parent key set construction.

use std::collections::HashSet;

use crate::{
    error::{ConfigError, SweepError, SweepResult},
    scan::{SCAN_LOG_EVERY, TableScan},
    store::{ScalarValue, StoreClient},
};

/// The complete set of parent key values at the moment scanning finished.
///
/// Built once before classification starts and read-only thereafter, so it
/// is shared across the run without synchronization.
#[derive(Debug, Default)]
pub struct ParentKeySet {
    values: HashSet<ScalarValue>,
}

impl ParentKeySet {
    pub fn contains(&self, value: &ScalarValue) -> bool {
        self.values.contains(value)
    }

    /// Number of distinct parent keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<ScalarValue> for ParentKeySet {
    fn from_iter<I: IntoIterator<Item = ScalarValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Scan `table` to exhaustion and collect every record's `key_attribute`
/// value.
///
/// Must complete before any deletion decision is made: a partial set would
/// classify live children as orphans. A parent record missing the key
/// attribute is a fatal configuration error for the same reason.
pub async fn build_parent_key_set(
    store: &dyn StoreClient,
    table: &str,
    key_attribute: &str,
) -> SweepResult<ParentKeySet> {
    let attributes = [key_attribute];
    let mut scan = TableScan::new(store, table, &attributes);

    let mut values = HashSet::new();
    let mut scanned = 0u64;

    loop {
        let page = scan.next_page().await.map_err(|source| SweepError::Scan {
            table: table.to_string(),
            source,
        })?;
        let Some(records) = page else { break };

        for mut record in records {
            let Some(value) = record.remove(key_attribute) else {
                return Err(ConfigError::MissingParentKey {
                    table: table.to_string(),
                    attribute: key_attribute.to_string(),
                }
                .into());
            };
            values.insert(value);
            scanned += 1;
            if scanned % SCAN_LOG_EVERY == 0 {
                tracing::info!(table = %table, scanned = scanned, "Parent key scan progress");
            }
        }
    }

    tracing::info!(
        table = %table,
        scanned = scanned,
        distinct = values.len(),
        "Parent key scan complete"
    );

    Ok(ParentKeySet { values })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::{MemoryStore, Record};

    fn parent(id: &str) -> Record {
        let mut record = HashMap::new();
        record.insert("id".to_string(), ScalarValue::S(id.to_string()));
        record.insert("name".to_string(), ScalarValue::S(format!("name-{id}")));
        record
    }

    #[tokio::test]
    async fn test_collects_every_key_across_pages() {
        let store = MemoryStore::new().with_page_size(2);
        for id in ["a", "b", "c", "d", "e"] {
            store.insert("parents", parent(id));
        }

        let set = build_parent_key_set(&store, "parents", "id").await.unwrap();
        assert_eq!(set.len(), 5);
        for id in ["a", "b", "c", "d", "e"] {
            assert!(set.contains(&ScalarValue::S(id.into())));
        }
        assert!(!set.contains(&ScalarValue::S("f".into())));
    }

    #[tokio::test]
    async fn test_empty_parent_table_yields_empty_set() {
        let store = MemoryStore::new();
        store.create_table("parents");

        let set = build_parent_key_set(&store, "parents", "id").await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_keys_collapse() {
        let store = MemoryStore::new();
        store.insert("parents", parent("a"));
        store.insert("parents", parent("a"));

        let set = build_parent_key_set(&store, "parents", "id").await.unwrap();
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_attribute_is_fatal() {
        let store = MemoryStore::new();
        store.insert("parents", parent("a"));
        let mut broken = Record::new();
        broken.insert("name".to_string(), ScalarValue::S("no key".into()));
        store.insert("parents", broken);

        let err = build_parent_key_set(&store, "parents", "id")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SweepError::Config(ConfigError::MissingParentKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_scan_failure_aborts() {
        let store = MemoryStore::new();
        store.insert("parents", parent("a"));
        store.fail_next_scan(crate::store::StoreError::transient("throttled"));

        let err = build_parent_key_set(&store, "parents", "id")
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::Scan { .. }));
    }
}
