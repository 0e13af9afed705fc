use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Fresh,
    Duplicate { duplicates: u32 },
}

#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    first_seen: Instant,
    duplicates: u32,
    touched: u64,
}

/// Bounded map of recently seen content hashes.
///
/// Entries live for `ttl` from first sight. Past `max_entries` the least recently touched hash
/// is evicted. Recency is tracked with an append-only touch log; stale log records are skipped
/// on eviction and compacted once the log grows past twice the bound.
///
/// A repeat only counts as a duplicate while an earlier copy is still live, i.e. queued or in
/// flight. The owner reports that with [`DedupCache::acquire`] and [`DedupCache::release`].
#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<String, DedupEntry>,
    touches: VecDeque<(u64, String)>,
    clock: u64,
    /// Pending copies per hash.
    live: HashMap<String, usize>,
}

impl DedupCache {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: HashMap::new(),
            touches: VecDeque::new(),
            clock: 0,
            live: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn duplicates(&self, hash: &str) -> Option<u32> {
        self.entries.get(hash).map(|entry| entry.duplicates)
    }

    #[must_use]
    pub fn is_live(&self, hash: &str) -> bool {
        self.live.contains_key(hash)
    }

    /// Marks one more copy of `hash` as queued.
    pub fn acquire(&mut self, hash: &str) {
        if !self.is_enabled() {
            return;
        }
        *self.live.entry(hash.to_string()).or_insert(0) += 1;
    }

    /// Marks one copy of `hash` as delivered or dropped.
    pub fn release(&mut self, hash: &str) {
        if let Some(count) = self.live.get_mut(hash) {
            *count -= 1;
            if *count == 0 {
                self.live.remove(hash);
            }
        }
    }

    /// Records a sighting of `hash` and reports whether it repeats a live copy seen within the
    /// TTL.
    pub fn check(&mut self, hash: &str, now: Instant) -> DedupDecision {
        if !self.is_enabled() {
            return DedupDecision::Fresh;
        }

        self.clock += 1;
        let tick = self.clock;
        let ttl = self.ttl;
        let live = self.live.contains_key(hash);

        if let Some(entry) = self.entries.get_mut(hash) {
            if live && now.saturating_duration_since(entry.first_seen) < ttl {
                entry.duplicates += 1;
                entry.touched = tick;
                let duplicates = entry.duplicates;
                self.touches.push_back((tick, hash.to_string()));
                self.compact_touches();
                return DedupDecision::Duplicate { duplicates };
            }
            *entry = DedupEntry {
                first_seen: now,
                duplicates: 0,
                touched: tick,
            };
            self.touches.push_back((tick, hash.to_string()));
            self.compact_touches();
            return DedupDecision::Fresh;
        }

        if self.entries.len() >= self.max_entries {
            self.purge_expired(now);
        }
        while self.entries.len() >= self.max_entries {
            if !self.evict_least_recent() {
                break;
            }
        }

        self.entries.insert(
            hash.to_string(),
            DedupEntry {
                first_seen: now,
                duplicates: 0,
                touched: tick,
            },
        );
        self.touches.push_back((tick, hash.to_string()));
        self.compact_touches();
        DedupDecision::Fresh
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.first_seen) < ttl);
    }

    fn evict_least_recent(&mut self) -> bool {
        while let Some((tick, hash)) = self.touches.pop_front() {
            let current = self.entries.get(&hash).map(|entry| entry.touched);
            if current == Some(tick) {
                self.entries.remove(&hash);
                return true;
            }
        }
        false
    }

    fn compact_touches(&mut self) {
        if self.touches.len() <= self.max_entries.saturating_mul(2) {
            return;
        }
        let entries = &self.entries;
        self.touches.retain(|(tick, hash)| {
            entries
                .get(hash)
                .is_some_and(|entry| entry.touched == *tick)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Checks `hash` and, when fresh, keeps it live like the worker does on enqueue.
    fn admit(cache: &mut DedupCache, hash: &str, now: Instant) -> DedupDecision {
        let decision = cache.check(hash, now);
        if decision == DedupDecision::Fresh {
            cache.acquire(hash);
        }
        decision
    }

    #[test]
    fn test_repeat_within_ttl_is_duplicate() {
        let mut cache = DedupCache::new(Duration::from_secs(5), 10);
        let now = Instant::now();
        assert_eq!(admit(&mut cache, "abc", now), DedupDecision::Fresh);
        assert_eq!(
            cache.check("abc", now + Duration::from_secs(1)),
            DedupDecision::Duplicate { duplicates: 1 }
        );
        assert_eq!(
            cache.check("abc", now + Duration::from_secs(2)),
            DedupDecision::Duplicate { duplicates: 2 }
        );
        assert_eq!(cache.duplicates("abc"), Some(2));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut cache = DedupCache::new(Duration::from_secs(5), 10);
        let now = Instant::now();
        admit(&mut cache, "abc", now);
        assert_eq!(
            cache.check("abc", now + Duration::from_secs(5)),
            DedupDecision::Fresh
        );
        assert_eq!(cache.duplicates("abc"), Some(0));
    }

    #[test]
    fn test_least_recently_touched_is_evicted() {
        let mut cache = DedupCache::new(Duration::from_secs(60), 2);
        let now = Instant::now();
        admit(&mut cache, "a", now);
        admit(&mut cache, "b", now);
        // touching "a" makes "b" the eviction candidate
        admit(&mut cache, "a", now);
        admit(&mut cache, "c", now);

        assert_eq!(cache.len(), 2);
        assert!(cache.duplicates("a").is_some());
        assert!(cache.duplicates("b").is_none());
        assert!(cache.duplicates("c").is_some());
    }

    #[test]
    fn test_expired_entries_are_purged_before_eviction() {
        let mut cache = DedupCache::new(Duration::from_secs(1), 2);
        let now = Instant::now();
        cache.check("old", now);
        cache.check("recent", now + Duration::from_millis(900));
        cache.check("new", now + Duration::from_millis(1500));

        assert!(cache.duplicates("old").is_none());
        assert!(cache.duplicates("recent").is_some());
        assert!(cache.duplicates("new").is_some());
    }

    #[test]
    fn test_zero_ttl_disables() {
        let mut cache = DedupCache::new(Duration::ZERO, 10);
        let now = Instant::now();
        assert!(!cache.is_enabled());
        assert_eq!(admit(&mut cache, "abc", now), DedupDecision::Fresh);
        assert_eq!(admit(&mut cache, "abc", now), DedupDecision::Fresh);
        assert!(cache.is_empty());
        assert!(!cache.is_live("abc"));
    }

    #[test]
    fn test_released_hash_is_fresh_again() {
        let mut cache = DedupCache::new(Duration::from_secs(5), 10);
        let now = Instant::now();
        admit(&mut cache, "abc", now);
        cache.release("abc");
        assert!(!cache.is_live("abc"));

        assert_eq!(
            admit(&mut cache, "abc", now + Duration::from_secs(1)),
            DedupDecision::Fresh
        );
        assert_eq!(
            admit(&mut cache, "abc", now + Duration::from_secs(2)),
            DedupDecision::Duplicate { duplicates: 1 }
        );
    }

    #[test]
    fn test_live_copies_are_counted() {
        let mut cache = DedupCache::new(Duration::from_secs(5), 10);
        cache.acquire("abc");
        cache.acquire("abc");
        cache.release("abc");
        assert!(cache.is_live("abc"));
        cache.release("abc");
        assert!(!cache.is_live("abc"));
        // releasing an unknown hash is a no-op
        cache.release("abc");
    }

    #[test]
    fn test_touch_log_stays_bounded() {
        let mut cache = DedupCache::new(Duration::from_secs(60), 4);
        let now = Instant::now();
        for _ in 0..100 {
            admit(&mut cache, "same", now);
        }
        assert!(cache.touches.len() <= 8);
        assert_eq!(cache.duplicates("same"), Some(99));
    }
}
