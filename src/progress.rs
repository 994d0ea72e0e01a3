//! Deletion progress accounting.

use std::sync::atomic::{AtomicU64, Ordering};

/// How often deletion progress is logged, in acknowledged deletions.
pub(crate) const DELETE_LOG_EVERY: u64 = 100;

/// Thread-safe counter of acknowledged deletions.
///
/// Constructed once per run and shared with every delete worker. Emits a
/// progress line whenever the running total crosses a `log_every` boundary;
/// purely observational, never affects control flow.
#[derive(Debug)]
pub struct ProgressCounter {
    table: String,
    deleted: AtomicU64,
    log_every: u64,
}

impl ProgressCounter {
    /// Counter for deletions against `table`. `log_every = 0` disables the
    /// periodic lines.
    pub fn new(table: impl Into<String>, log_every: u64) -> Self {
        Self {
            table: table.into(),
            deleted: AtomicU64::new(0),
            log_every,
        }
    }

    /// Record `count` acknowledged deletions.
    pub fn record(&self, count: u64) {
        if count == 0 {
            return;
        }
        let total = self.deleted.fetch_add(count, Ordering::Relaxed) + count;

        // A batch can cross several boundaries at once; one line is enough.
        if self.log_every > 0 && total / self.log_every != (total - count) / self.log_every {
            tracing::info!(table = %self.table, deleted = total, "Deletion progress");
        }
    }

    /// Total acknowledged deletions so far.
    pub fn total(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let counter = ProgressCounter::new("t", 100);
        assert_eq!(counter.total(), 0);

        counter.record(25);
        counter.record(25);
        counter.record(0);
        assert_eq!(counter.total(), 50);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = std::sync::Arc::new(ProgressCounter::new("t", 0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.record(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.total(), 8000);
    }
}
