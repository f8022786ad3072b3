use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::VecDeque;

use crate::models::ProbeResult;

/// Records that carry the instant they were taken
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for ProbeResult {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Append-only log that keeps at most `capacity` records, evicting the oldest
#[derive(Debug, Clone)]
pub struct RollingHistory<T> {
    records: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, record: T) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.records.back()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.records.get(index)
    }
}

impl<T: Clone> RollingHistory<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.records.iter().cloned().collect()
    }
}

impl<T: Timestamped> RollingHistory<T> {
    /// Records strictly newer than `cutoff`
    pub fn since(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &T> {
        self.records.iter().filter(move |r| r.timestamp() > cutoff)
    }
}

impl<T> Extend<T> for RollingHistory<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for record in iter {
            self.push(record);
        }
    }
}

impl<T: Serialize> Serialize for RollingHistory<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.iter())
    }
}
