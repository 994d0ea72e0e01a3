use std::{collections::HashMap, fmt};

/// Largest number of keys a single batch-delete call may carry.
///
/// Matches the DynamoDB `BatchWriteItem` limit; other key-value stores with
/// bounded batch mutations sit at or above this.
pub const MAX_BATCH_SIZE: usize = 25;

/// A scalar attribute value as stored by the key-value store.
///
/// Numbers keep the store's decimal-string form so equality and hashing are
/// exact (no float round-tripping). Only scalar types can act as key or
/// reference attributes; non-scalar attributes never reach the pipeline
/// because scans project only the attributes it reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    /// String.
    S(String),
    /// Number, in the store's decimal-string representation.
    N(String),
    /// Binary.
    B(Vec<u8>),
}

impl ScalarValue {
    /// The string payload, for `S` values only.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{s}"),
            Self::N(n) => write!(f, "{n}"),
            Self::B(b) => write!(f, "<{} binary bytes>", b.len()),
        }
    }
}

/// A projected item: attribute name to scalar value.
pub type Record = HashMap<String, ScalarValue>;

/// The key of a single item, as submitted to a batch deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    /// Key attribute name.
    pub attribute: String,
    /// Key attribute value.
    pub value: ScalarValue,
}

impl ItemKey {
    pub fn new(attribute: impl Into<String>, value: ScalarValue) -> Self {
        Self {
            attribute: attribute.into(),
            value,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, self.value)
    }
}

/// Opaque continuation token for a paginated scan.
///
/// Carries the key map of the last evaluated item; passing it back resumes
/// the scan immediately after that item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanToken(pub HashMap<String, ScalarValue>);

/// One page of a table scan.
#[derive(Debug, Clone)]
pub struct ScanPage {
    /// Records in this page, projected to the requested attributes.
    pub records: Vec<Record>,
    /// Token for the next page, or `None` once the table is exhausted.
    pub next: Option<ScanToken>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_scalar_value_hashes_by_type_and_payload() {
        let mut set = HashSet::new();
        set.insert(ScalarValue::S("42".into()));
        set.insert(ScalarValue::N("42".into()));

        // Same payload under different types is two distinct members.
        assert_eq!(set.len(), 2);
        assert!(set.contains(&ScalarValue::S("42".into())));
        assert!(!set.contains(&ScalarValue::S("43".into())));
    }

    #[test]
    fn test_scalar_value_as_str() {
        assert_eq!(ScalarValue::S("a".into()).as_str(), Some("a"));
        assert_eq!(ScalarValue::N("1".into()).as_str(), None);
        assert_eq!(ScalarValue::B(vec![1, 2]).as_str(), None);
    }

    #[test]
    fn test_item_key_display() {
        let key = ItemKey::new("id", ScalarValue::S("abc".into()));
        assert_eq!(key.to_string(), "id=abc");

        let key = ItemKey::new("id", ScalarValue::B(vec![0, 1, 2]));
        assert_eq!(key.to_string(), "id=<3 binary bytes>");
    }
}
