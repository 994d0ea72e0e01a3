//! Orphan classification for dependent-table records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::{
    keyset::ParentKeySet,
    store::{ItemKey, Record},
};

/// Outcome of classifying one dependent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The reference resolves to a live parent. Kept.
    Live,

    /// No live parent and old enough; eligible for deletion.
    Orphan(ItemKey),

    /// No live parent, but younger than the cutoff or of unknowable age.
    /// Kept: the parent write may simply not be scan-visible yet.
    TooRecent,

    /// Delete-eligible but missing its own key attribute, so there is no key
    /// to address a deletion to. Kept and counted.
    Unkeyed,
}

/// Classifies dependent records against the completed parent key set.
///
/// Pure decision logic; never touches the store. A record with no reference
/// attribute at all is an orphan (it can never resolve), subject to the same
/// age gate as any other orphan.
pub struct Classifier<'a> {
    parents: &'a ParentKeySet,
    key_attribute: &'a str,
    reference_attribute: &'a str,
    age_gate: Option<AgeGate<'a>>,
}

struct AgeGate<'a> {
    attribute: &'a str,
    format: &'a str,
    cutoff: NaiveDateTime,
}

impl<'a> Classifier<'a> {
    pub fn new(
        parents: &'a ParentKeySet,
        key_attribute: &'a str,
        reference_attribute: &'a str,
    ) -> Self {
        Self {
            parents,
            key_attribute,
            reference_attribute,
            age_gate: None,
        }
    }

    /// Only classify records as orphans once their `attribute` timestamp,
    /// parsed under `format`, is strictly before `cutoff`.
    pub fn with_age_gate(
        mut self,
        attribute: &'a str,
        format: &'a str,
        cutoff: NaiveDateTime,
    ) -> Self {
        self.age_gate = Some(AgeGate {
            attribute,
            format,
            cutoff,
        });
        self
    }

    pub fn classify(&self, record: &Record) -> Classification {
        if let Some(reference) = record.get(self.reference_attribute)
            && self.parents.contains(reference)
        {
            return Classification::Live;
        }

        if let Some(gate) = &self.age_gate
            && !gate.is_old_enough(record)
        {
            return Classification::TooRecent;
        }

        match record.get(self.key_attribute) {
            Some(value) => Classification::Orphan(ItemKey::new(self.key_attribute, value.clone())),
            None => Classification::Unkeyed,
        }
    }
}

impl AgeGate<'_> {
    /// Fail safe: an absent or unparseable timestamp reads as "too recent",
    /// so ambiguous records are never deleted.
    fn is_old_enough(&self, record: &Record) -> bool {
        let Some(raw) = record.get(self.attribute).and_then(|v| v.as_str()) else {
            return false;
        };
        match parse_timestamp(raw, self.format) {
            Some(timestamp) => timestamp < self.cutoff,
            None => false,
        }
    }
}

/// Parse a stored timestamp under a strftime format, accepting offset-carrying,
/// date-time, and date-only formats. Values are interpreted as UTC.
fn parse_timestamp(raw: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_str(raw, format) {
        return Some(with_offset.naive_utc());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
        return Some(datetime);
    }
    NaiveDate::parse_from_str(raw, format)
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}
