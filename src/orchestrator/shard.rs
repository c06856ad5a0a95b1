//! Sharded key-value map with per-shard locking.
//!
//! Per-sender maps (batches, conversation state, timers) are split across a
//! fixed number of independently locked shards so that work on one sender
//! never waits on an unrelated sender's lock. Critical sections are
//! synchronous and short; never hold a shard across an `.await`.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::{Mutex, PoisonError};

const DEFAULT_SHARDS: usize = 16;

/// A `HashMap` split across independently locked shards.
pub struct ShardedMap<K, V> {
    shards: Vec<Mutex<HashMap<K, V>>>,
    hasher: RandomState,
}

impl<K, V> Default for ShardedMap<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq,
{
    /// Create a map with the default shard count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map with `count` shards (at least one).
    #[must_use]
    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1);
        Self {
            shards: (0..count).map(|_| Mutex::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)] // Result is < shard count.
    fn shard_for<Q>(&self, key: &Q) -> &Mutex<HashMap<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let index = (hash % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Run `f` against the shard that owns `key`, holding its lock.
    pub fn with<Q, R>(&self, key: &Q, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut shard = self
            .shard_for(key)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut shard)
    }

    /// Remove every entry for which `keep` returns `false`, one shard at a time.
    ///
    /// Returns the number of removed entries.
    pub fn retain(&self, mut keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = shard.len();
            shard.retain(|k, v| keep(k, v));
            removed += before - shard.len();
        }
        removed
    }

    /// Total number of entries across all shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Whether every shard is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
