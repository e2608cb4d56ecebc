// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::HealthRecord;

/// Persistence for health records.
pub trait HealthStore: Send + Sync {
    fn save(&self, record: HealthRecord);

    /// Newest first, optionally restricted to one hostname.
    fn list(&self, hostname: Option<&str>, limit: usize) -> Vec<HealthRecord>;

    fn get(&self, id: &str) -> Option<HealthRecord>;
}

/// Bounded in-memory history. The oldest record is dropped at capacity.
pub struct MemoryHealthStore {
    capacity: usize,
    records: Mutex<VecDeque<HealthRecord>>,
}

impl MemoryHealthStore {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, records: Mutex::new(VecDeque::new()) }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl HealthStore for MemoryHealthStore {
    fn save(&self, record: HealthRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_back();
        }
        records.push_front(record);
    }

    fn list(&self, hostname: Option<&str>, limit: usize) -> Vec<HealthRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| hostname.is_none_or(|h| r.hostname == h))
            .take(limit)
            .cloned()
            .collect()
    }

    fn get(&self, id: &str) -> Option<HealthRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
