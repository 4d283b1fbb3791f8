// ABOUTME: Content-addressed instruction cache — observability/warm-up hint, never consulted to replay execution

use crate::config::DEFAULT_INSTRUCTION_CACHE_SIZE;
use crate::value::hash::fnv1a;
use std::collections::HashMap;
use std::sync::Mutex;

/// One entry recorded per distinct instruction sequence the VM has
/// dispatched through `Vm::run` — a hit counter, not a replay buffer.
/// The cache is present purely for observability: it is never consulted
/// to replay execution, only hit counts are tracked.
#[derive(Debug, Clone)]
pub struct CachedSequence {
    pub instructions: Vec<u8>,
    pub hits: u64,
}

struct Entry {
    sequence: CachedSequence,
    /// Monotonically increasing "last touched" counter used for LRU
    /// eviction, enforcing `max_size` via a hand-rolled LRU rather than
    /// leaving the cache unbounded.
    last_touch: u64,
}

struct Inner {
    entries: HashMap<u64, Entry>,
    max_size: usize,
    clock: u64,
}

/// A process-wide (or per-engine, if constructed explicitly) bounded
/// instruction cache keyed by the FNV-1a hash of the instruction byte
/// slice.
pub struct InstructionCache {
    inner: Mutex<Inner>,
}

impl InstructionCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                max_size,
                clock: 0,
            }),
        }
    }

    /// Records one dispatch of `instructions`, bumping its hit counter
    /// (inserting it first if unseen) and evicting the least-recently
    /// touched entry if this insertion would exceed `max_size`.
    pub fn record(&self, instructions: &[u8]) -> u64 {
        let key = fnv1a(instructions);
        let mut inner = self.inner.lock().expect("instruction cache mutex poisoned");
        inner.clock += 1;
        let clock = inner.clock;
        let max_size = inner.max_size;
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.sequence.hits += 1;
            entry.last_touch = clock;
            return entry.sequence.hits;
        }
        if inner.entries.len() >= max_size && max_size > 0 {
            if let Some(&lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_touch)
                .map(|(k, _)| k)
            {
                inner.entries.remove(&lru_key);
            }
        }
        inner.entries.insert(
            key,
            Entry {
                sequence: CachedSequence {
                    instructions: instructions.to_vec(),
                    hits: 1,
                },
                last_touch: clock,
            },
        );
        1
    }

    pub fn get(&self, instructions: &[u8]) -> Option<CachedSequence> {
        let key = fnv1a(instructions);
        let inner = self.inner.lock().expect("instruction cache mutex poisoned");
        inner.entries.get(&key).map(|e| e.sequence.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("instruction cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InstructionCache {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTION_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_hits_on_repeated_sequences() {
        let cache = InstructionCache::default();
        let seq = [1u8, 2, 3];
        assert_eq!(cache.record(&seq), 1);
        assert_eq!(cache.record(&seq), 2);
        assert_eq!(cache.get(&seq).unwrap().hits, 2);
    }

    #[test]
    fn distinct_sequences_get_distinct_entries() {
        let cache = InstructionCache::default();
        cache.record(&[1, 2, 3]);
        cache.record(&[4, 5, 6]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn enforces_max_size_with_lru_eviction() {
        let cache = InstructionCache::new(2);
        cache.record(&[1]);
        cache.record(&[2]);
        cache.record(&[3]);
        assert_eq!(cache.len(), 2);
        // [1] was least-recently touched and should have been evicted.
        assert!(cache.get(&[1]).is_none());
        assert!(cache.get(&[2]).is_some());
        assert!(cache.get(&[3]).is_some());
    }
}
