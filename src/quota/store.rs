//! Usage Store Boundary
//!
//! The persistence collaborator behind the quota ledger. The pipeline
//! never touches storage directly; it appends [`UsageRecord`]s and reads
//! rolling-window totals through this trait. Deployments back it with
//! their relational store; the in-memory implementation serves tests and
//! standalone CLI runs.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::types::{ForgeError, Result, UsageRecord};

/// Append-only usage persistence with rolling-window aggregation.
pub trait UsageStore: Send + Sync {
    /// Append one usage record
    fn append(&self, record: UsageRecord) -> Result<()>;

    /// Total tokens (input + output) committed by a user since `since`
    fn window_total(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64>;
}

/// In-memory usage store.
#[derive(Default)]
pub struct MemoryUsageStore {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records for a user, in append order (test/introspection aid)
    pub fn records_for(&self, user_id: &str) -> Vec<UsageRecord> {
        self.records
            .lock()
            .expect("usage store lock poisoned")
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Total number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().expect("usage store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UsageStore for MemoryUsageStore {
    fn append(&self, record: UsageRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| ForgeError::Storage("usage store lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }

    fn window_total(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let records = self
            .records
            .lock()
            .map_err(|_| ForgeError::Storage("usage store lock poisoned".to_string()))?;
        Ok(records
            .iter()
            .filter(|r| r.user_id == user_id && r.timestamp >= since)
            .map(UsageRecord::total)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UsageDelta;
    use chrono::Duration;

    #[test]
    fn test_window_total_filters_by_user_and_time() {
        let store = MemoryUsageStore::new();
        store
            .append(UsageRecord::new("u1", UsageDelta::exact(10, 20), "openai", "gpt-4o"))
            .unwrap();
        store
            .append(UsageRecord::new("u2", UsageDelta::exact(100, 0), "openai", "gpt-4o"))
            .unwrap();

        let mut old = UsageRecord::new("u1", UsageDelta::exact(5, 5), "openai", "gpt-4o");
        old.timestamp = Utc::now() - Duration::days(2);
        store.append(old).unwrap();

        let since = Utc::now() - Duration::days(1);
        assert_eq!(store.window_total("u1", since).unwrap(), 30);
        assert_eq!(store.window_total("u2", since).unwrap(), 100);
        assert_eq!(store.window_total("nobody", since).unwrap(), 0);
    }
}
