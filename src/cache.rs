//!
//! tabularium read-through cache
//! -----------------------------
//! Process-wide memoization keyed by the wrapped call's arguments. A `get`
//! returns a live entry without invoking the compute closure; an expired or
//! absent entry is recomputed, replaced and returned. Failed computations are
//! never memoized. There is no per-key lock, so concurrent callers may
//! recompute the same key redundantly, and there is no background sweep:
//! an expired entry is only replaced at the next `get` for that exact key.
//!
//! Time is injected through the `Clock` trait so expiry can be exercised in
//! tests without sleeping.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time; the production clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock advanced by hand; lets embedders and tests drive
/// expiry without sleeping.
pub struct ManualClock {
    now: parking_lot::Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: parking_lot::Mutex::new(Instant::now()) }
    }

    pub fn advance(&self, by: Duration) {
        let mut g = self.now.lock();
        *g += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Read-through TTL cache. Cloning shares the underlying store.
pub struct TtlCache<K, V> {
    clock: Arc<dyn Clock>,
    map: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self { clock: self.clock.clone(), map: self.map.clone() }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock, map: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Return the live value for `key`, computing and storing it when absent
    /// or expired. Errors from `compute` propagate to the caller uncached.
    pub fn get<E>(
        &self,
        key: K,
        ttl: Duration,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let now = self.clock.now();
        {
            let r = self.map.read();
            if let Some(ent) = r.get(&key) {
                if now < ent.expires_at {
                    debug!(target: "tabularium::cache", "hit key={:?}", key);
                    return Ok(ent.value.clone());
                }
            }
        }
        debug!(target: "tabularium::cache", "miss key={:?} ttl_secs={}", key, ttl.as_secs());
        let value = compute()?;
        let entry = CacheEntry { value: value.clone(), expires_at: now + ttl };
        // Replace, never patch: a stale entry is overwritten wholesale
        self.map.write().insert(key, entry);
        Ok(value)
    }

    /// Number of entries currently stored, live or expired.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
