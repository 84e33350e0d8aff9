//! Fixed-window request counting with a bounded key table.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Upper bound on tracked keys per limiter.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Counter for one key within its current window.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Keys in insertion order alongside their buckets. A key keeps its queue position when its
/// window is reset, so eviction is strictly by first insertion, never by recency of use.
struct Table<K> {
    buckets: HashMap<K, Bucket>,
    order: VecDeque<K>,
}

/// RateLimiter
///
/// Admits at most `max_rate` observations of a key per `max_age` window. State is one
/// mutex-guarded table so the evict-then-insert sequence is atomic with respect to every
/// other observation. Expired buckets are only replaced lazily, on the next observation of
/// the same key, or pushed out by the size bound.
pub struct RateLimiter<K> {
    table: Mutex<Table<K>>,
    max_rate: u32,
    max_age: Duration,
    capacity: usize,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(max_rate: u32, max_age: Duration) -> Self {
        Self::with_capacity(max_rate, max_age, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_rate: u32, max_age: Duration, capacity: usize) -> Self {
        Self {
            table: Mutex::new(Table {
                buckets: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_rate,
            max_age,
            capacity: capacity.max(1),
        }
    }

    /// Records an observation of `key` now. Returns false when the key is over its limit.
    pub fn check(&self, key: &K) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &K, now: Instant) -> bool {
        // A poisoned lock still holds a consistent table: every mutation below completes
        // before anything that could panic.
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bucket) = table.buckets.get_mut(key) {
            if now.saturating_duration_since(bucket.window_start) < self.max_age {
                if bucket.count >= self.max_rate {
                    return false;
                }
                bucket.count += 1;
                return true;
            }
        }

        if table.buckets.len() >= self.capacity {
            if let Some(oldest) = table.order.pop_front() {
                table.buckets.remove(&oldest);
            }
        }

        let fresh = Bucket {
            window_start: now,
            count: 1,
        };
        if table.buckets.insert(key.clone(), fresh).is_none() {
            table.order.push_back(key.clone());
        }
        true
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .contains_key(key)
    }

    /// Current count for `key`, if tracked.
    pub fn count(&self, key: &K) -> Option<u32> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .get(key)
            .map(|b| b.count)
    }
}
