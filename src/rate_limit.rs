//! Per-actor token-bucket rate limiter.
//!
//! Each key owns one `AtomicU64` packing the remaining milli-tokens (high 24
//! bits) and the last refill time in milliseconds since the limiter epoch
//! (low 40 bits). Acquiring a token is a CAS loop on that word, so keys never
//! contend with each other.
//!
//! The number of tracked keys is bounded by `max_keys`: slots are reserved
//! through an atomic counter before a bucket is inserted. Idle buckets are
//! evicted by `sweep_idle`; when the map is full the stalest bucket is
//! evicted to make room.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TIME_BITS: u32 = 40;
const TIME_MASK: u64 = (1 << TIME_BITS) - 1;
const MAX_MILLI_TOKENS: u64 = (1 << (64 - TIME_BITS)) - 1;
const MILLI: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Burst size, in requests
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub max_keys: usize,
    pub idle_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            refill_per_sec: 5.0,
            max_keys: 10_000,
            idle_ttl_secs: 600,
        }
    }
}

#[inline]
fn pack(milli_tokens: u64, at_ms: u64) -> u64 {
    (milli_tokens << TIME_BITS) | (at_ms & TIME_MASK)
}

#[inline]
fn unpack(word: u64) -> (u64, u64) {
    (word >> TIME_BITS, word & TIME_MASK)
}

struct Bucket {
    state: AtomicU64,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    tracked: AtomicUsize,
    capacity_milli: u64,
    /// Milli-tokens regained per elapsed millisecond
    refill_per_ms: f64,
    max_keys: usize,
    idle_ttl_ms: u64,
    epoch: Instant,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity_milli = (u64::from(config.capacity.max(1)) * MILLI).min(MAX_MILLI_TOKENS);
        Self {
            buckets: DashMap::new(),
            tracked: AtomicUsize::new(0),
            capacity_milli,
            refill_per_ms: config.refill_per_sec.max(0.0),
            max_keys: config.max_keys.max(1),
            idle_ttl_ms: config.idle_ttl_secs.saturating_mul(1000),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 & TIME_MASK
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }

    /// Take one token for `key`. Returns `false` when the caller is limited.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, self.now_ms())
    }

    pub fn check_at(&self, key: &str, now_ms: u64) -> bool {
        loop {
            if let Some(bucket) = self.buckets.get(key) {
                return self.take(&bucket.state, now_ms);
            }
            if !self.reserve_slot(now_ms) {
                warn!(key, max_keys = self.max_keys, "Rate limiter full, request rejected");
                return false;
            }
            match self.buckets.entry(key.to_string()) {
                Entry::Occupied(_) => self.release_slots(1),
                Entry::Vacant(slot) => {
                    slot.insert(Bucket {
                        state: AtomicU64::new(pack(self.capacity_milli, now_ms)),
                    });
                }
            }
        }
    }

    fn take(&self, state: &AtomicU64, now_ms: u64) -> bool {
        let mut current = state.load(Ordering::Acquire);
        loop {
            let (tokens, last_ms) = unpack(current);
            let elapsed = now_ms.saturating_sub(last_ms);
            let regained = (elapsed as f64 * self.refill_per_ms) as u64;
            let available = tokens.saturating_add(regained).min(self.capacity_milli);

            let (remaining, allowed) = if available >= MILLI {
                (available - MILLI, true)
            } else {
                (available, false)
            };
            let stamp = now_ms.max(last_ms);
            match state.compare_exchange_weak(
                current,
                pack(remaining, stamp),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return allowed,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserve room for one new bucket, evicting idle or stale buckets when full.
    fn reserve_slot(&self, now_ms: u64) -> bool {
        for _ in 0..2 {
            let reserved = self
                .tracked
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < self.max_keys).then_some(n + 1)
                })
                .is_ok();
            if reserved {
                return true;
            }
            if self.sweep_idle_at(now_ms) == 0 {
                self.evict_stalest();
            }
        }
        false
    }

    fn release_slots(&self, n: usize) {
        if n > 0 {
            self.tracked.fetch_sub(n, Ordering::AcqRel);
        }
    }

    fn evict_stalest(&self) {
        let stalest = self
            .buckets
            .iter()
            .map(|entry| (unpack(entry.value().state.load(Ordering::Acquire)).1, entry.key().clone()))
            .min_by_key(|(last_ms, _)| *last_ms)
            .map(|(_, key)| key);
        if let Some(key) = stalest
            && self.buckets.remove(&key).is_some()
        {
            self.release_slots(1);
            debug!(key = %key, "Evicted stalest rate-limit bucket");
        }
    }

    /// Drop buckets untouched for longer than the idle TTL.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(self.now_ms())
    }

    pub fn sweep_idle_at(&self, now_ms: u64) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let (_, last_ms) = unpack(bucket.state.load(Ordering::Acquire));
            let keep = now_ms.saturating_sub(last_ms) <= self.idle_ttl_ms;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.release_slots(removed);
        removed
    }

    /// Whole tokens left for `key` as of its last refill.
    pub fn tokens(&self, key: &str) -> Option<u64> {
        self.buckets
            .get(key)
            .map(|b| unpack(b.state.load(Ordering::Acquire)).0 / MILLI)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
