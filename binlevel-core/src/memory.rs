//! In-memory stores backing tests and local runs.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::model::{BinId, BinReading, NewTrashLevel, TrashLevelRecord};
use crate::ports::{RecordPort, StoreError, TelemetryPort};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Telemetry store keeping raw bin values in insertion order.
#[derive(Default)]
pub struct MemoryTelemetry {
    bins: Mutex<Vec<(BinId, Value)>>,
    listing_failure: Mutex<Option<String>>,
}

impl MemoryTelemetry {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with raw values.
    #[must_use]
    pub fn with_bins<I, K>(bins: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<BinId>,
    {
        let store = Self::new();
        for (bin, value) in bins {
            store.put(bin, value);
        }
        store
    }

    /// Insert or replace the raw value stored for a bin.
    pub fn put<K: Into<BinId>>(&self, bin: K, value: Value) {
        let bin = bin.into();
        let mut bins = locked(&self.bins);
        match bins.iter_mut().find(|(existing, _)| *existing == bin) {
            Some(entry) => entry.1 = value,
            None => bins.push((bin, value)),
        }
    }

    /// Make subsequent root listings fail with the given message.
    pub fn fail_listing<S: Into<String>>(&self, message: S) {
        *locked(&self.listing_failure) = Some(message.into());
    }
}

#[async_trait]
impl TelemetryPort for MemoryTelemetry {
    async fn list_bins(&self) -> Result<Vec<BinId>, StoreError> {
        if let Some(message) = locked(&self.listing_failure).clone() {
            return Err(StoreError::Internal(message));
        }
        Ok(locked(&self.bins).iter().map(|(bin, _)| bin.clone()).collect())
    }

    async fn latest_reading(&self, bin: &BinId) -> Result<Option<BinReading>, StoreError> {
        let bins = locked(&self.bins);
        Ok(bins
            .iter()
            .find(|(existing, _)| existing == bin)
            .filter(|(_, value)| !value.is_null())
            .map(|(_, value)| BinReading::from_value(bin.clone(), value)))
    }
}

/// Append-only record store assigning strictly increasing timestamps.
///
/// Records live only as long as the process; use [`Self::bounded`] when the
/// store backs a long-running service.
#[derive(Default)]
pub struct MemoryRecords {
    records: Mutex<VecDeque<TrashLevelRecord>>,
    failing_bins: Mutex<HashSet<BinId>>,
    limit: Option<usize>,
}

impl MemoryRecords {
    /// Create an empty, unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that keeps only the newest `limit` records.
    #[must_use]
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Reject every append for the given bin.
    pub fn fail_writes_for<K: Into<BinId>>(&self, bin: K) {
        locked(&self.failing_bins).insert(bin.into());
    }

    /// Snapshot of all appended records in write order.
    #[must_use]
    pub fn records(&self) -> Vec<TrashLevelRecord> {
        locked(&self.records).iter().cloned().collect()
    }

    fn next_timestamp(records: &VecDeque<TrashLevelRecord>) -> DateTime<Utc> {
        let now = Utc::now();
        match records.back() {
            Some(last) if last.created_at >= now => last.created_at + TimeDelta::microseconds(1),
            _ => now,
        }
    }
}

#[async_trait]
impl RecordPort for MemoryRecords {
    async fn append(&self, level: &NewTrashLevel) -> Result<TrashLevelRecord, StoreError> {
        if locked(&self.failing_bins).contains(&level.bin) {
            return Err(StoreError::Internal(format!(
                "write rejected for bin {}",
                level.bin
            )));
        }

        let mut records = locked(&self.records);
        let record = TrashLevelRecord {
            bin: level.bin.clone(),
            trash_level: level.trash_level,
            created_at: Self::next_timestamp(&records),
        };
        records.push_back(record.clone());
        if let Some(limit) = self.limit {
            while records.len() > limit {
                records.pop_front();
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::TrashLevel;

    use super::*;

    fn level(bin: &str) -> NewTrashLevel {
        NewTrashLevel {
            bin: BinId::from(bin),
            trash_level: TrashLevel::EMPTY,
        }
    }

    #[tokio::test]
    async fn bounded_store_keeps_newest_records() {
        let store = MemoryRecords::bounded(2);
        for bin in ["bin1", "bin2", "bin3"] {
            store.append(&level(bin)).await.expect("append");
        }

        let bins: Vec<_> = store.records().into_iter().map(|record| record.bin).collect();
        assert_eq!(bins, vec![BinId::from("bin2"), BinId::from("bin3")]);
    }

    #[tokio::test]
    async fn timestamps_keep_increasing_after_eviction() {
        let store = MemoryRecords::bounded(1);
        let first = store.append(&level("bin1")).await.expect("append");
        let second = store.append(&level("bin1")).await.expect("append");

        assert!(first.created_at < second.created_at);
        assert_eq!(store.records(), vec![second]);
    }
}
