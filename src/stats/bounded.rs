//! Bounded, lock-protected accounting primitives.
//!
//! # Responsibilities
//! - Count keys with a hard cap on distinct keys (LRU eviction)
//! - Remember a window of recently seen items (FIFO eviction)
//!
//! # Design Decisions
//! - One `Mutex` per structure; every operation is O(log n) or better
//! - Evicted counts are lost entirely: these bound attacker-driven memory,
//!   they are not long-horizon counters

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;

/// Counter map holding at most `capacity` keys, evicting the least recently touched.
#[derive(Debug)]
pub struct LruCounter<K> {
    capacity: usize,
    inner: Mutex<LruInner<K>>,
}

#[derive(Debug)]
struct LruInner<K> {
    /// key -> (count, last touch tick)
    counts: HashMap<K, (u64, u64)>,
    /// last touch tick -> key, oldest first
    recency: BTreeMap<u64, K>,
    tick: u64,
}

impl<K> LruInner<K>
where
    K: Eq + Hash + Clone,
{
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl<K> LruCounter<K>
where
    K: Eq + Hash + Clone + Ord,
{
    /// Create a counter that retains at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LruInner {
                counts: HashMap::new(),
                recency: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    /// Add `amount` to `key`, marking it most recently used.
    pub fn increment(&self, key: K, amount: u64) {
        let mut guard = self.inner.lock().expect("lru counter mutex poisoned");
        let inner = &mut *guard;
        let tick = inner.next_tick();

        if let Some((count, touched)) = inner.counts.get_mut(&key) {
            let previous = *touched;
            *count = count.saturating_add(amount);
            *touched = tick;
            inner.recency.remove(&previous);
            inner.recency.insert(tick, key);
            return;
        }

        if inner.counts.len() >= self.capacity {
            if let Some((_, oldest)) = inner.recency.pop_first() {
                inner.counts.remove(&oldest);
            }
        }
        inner.counts.insert(key.clone(), (amount, tick));
        inner.recency.insert(tick, key);
    }

    /// Current count for `key`, 0 when absent. Does not affect recency.
    pub fn get(&self, key: &K) -> u64 {
        let inner = self.inner.lock().expect("lru counter mutex poisoned");
        inner.counts.get(key).map(|(count, _)| *count).unwrap_or(0)
    }

    /// The `n` highest counts, descending; equal counts are ordered by key.
    pub fn most_common(&self, n: usize) -> Vec<(K, u64)> {
        let mut entries: Vec<(K, u64)> = {
            let inner = self.inner.lock().expect("lru counter mutex poisoned");
            inner
                .counts
                .iter()
                .map(|(key, (count, _))| (key.clone(), *count))
                .collect()
        };
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }

    /// Number of keys currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lru counter mutex poisoned").counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Set of the most recent `capacity` distinct items.
///
/// Membership means "inside the retained window", not "ever seen".
#[derive(Debug)]
pub struct FifoSet<T> {
    capacity: usize,
    inner: Mutex<FifoInner<T>>,
}

#[derive(Debug)]
struct FifoInner<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
}

impl<T> FifoSet<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(FifoInner {
                order: VecDeque::new(),
                members: HashSet::new(),
            }),
        }
    }

    /// Add `item`; returns true if it was not already inside the window.
    pub fn add(&self, item: T) -> bool {
        let mut guard = self.inner.lock().expect("fifo set mutex poisoned");
        let inner = &mut *guard;
        if inner.members.contains(&item) {
            return false;
        }

        inner.order.push_back(item.clone());
        inner.members.insert(item);

        let mut evicted = false;
        while inner.order.len() > self.capacity {
            inner.order.pop_front();
            evicted = true;
        }

        if evicted || inner.members.len() != inner.order.len() {
            inner.members = inner.order.iter().cloned().collect();
        }
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner
            .lock()
            .expect("fifo set mutex poisoned")
            .members
            .contains(item)
    }

    /// Number of items inside the window.
    pub fn size(&self) -> usize {
        self.inner.lock().expect("fifo set mutex poisoned").order.len()
    }

    /// Sizes of the ordered window and the membership set, in that order.
    pub fn sizes(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("fifo set mutex poisoned");
        (inner.order.len(), inner.members.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lru_evicts_least_recently_touched() {
        let counter = LruCounter::new(3);
        counter.increment("a".to_string(), 1);
        counter.increment("b".to_string(), 1);
        counter.increment("c".to_string(), 1);
        counter.increment("d".to_string(), 1);

        assert_eq!(counter.len(), 3);
        assert_eq!(counter.get(&"a".to_string()), 0);
        assert_eq!(counter.get(&"d".to_string()), 1);
    }

    #[test]
    fn test_lru_touch_protects_key() {
        let counter = LruCounter::new(3);
        counter.increment("a".to_string(), 1);
        counter.increment("b".to_string(), 1);
        counter.increment("c".to_string(), 1);
        // touching "a" makes "b" the eviction candidate
        counter.increment("a".to_string(), 1);
        counter.increment("d".to_string(), 1);

        assert_eq!(counter.get(&"a".to_string()), 2);
        assert_eq!(counter.get(&"b".to_string()), 0);
        assert_eq!(counter.get(&"c".to_string()), 1);
        assert_eq!(counter.len(), 3);
    }

    #[test]
    fn test_lru_get_does_not_touch() {
        let counter = LruCounter::new(2);
        counter.increment(1u32, 5);
        counter.increment(2u32, 1);
        assert_eq!(counter.get(&1), 5);
        counter.increment(3u32, 1);
        assert_eq!(counter.get(&1), 0);
    }

    #[test]
    fn test_most_common_ordering() {
        let counter = LruCounter::new(10);
        counter.increment("/a".to_string(), 3);
        counter.increment("/b".to_string(), 7);
        counter.increment("/c".to_string(), 3);
        counter.increment("/d".to_string(), 1);

        let top = counter.most_common(3);
        assert_eq!(
            top,
            vec![
                ("/b".to_string(), 7),
                ("/a".to_string(), 3),
                ("/c".to_string(), 3),
            ]
        );
        assert!(counter.most_common(0).is_empty());
    }

    #[test]
    fn test_fifo_set_window() {
        let set = FifoSet::new(3);
        assert!(set.add("1.1.1.1"));
        assert!(!set.add("1.1.1.1"));
        assert!(set.add("2.2.2.2"));
        assert!(set.add("3.3.3.3"));
        assert!(set.add("4.4.4.4"));

        assert_eq!(set.size(), 3);
        assert!(!set.contains(&"1.1.1.1"));
        assert!(set.contains(&"4.4.4.4"));
        let (order, members) = set.sizes();
        assert_eq!(order, members);

        // evicted items count as new again
        assert!(set.add("1.1.1.1"));
        assert!(!set.contains(&"2.2.2.2"));
    }

    #[test]
    fn test_fifo_sizes_stay_equal() {
        let set = FifoSet::new(50);
        for i in 0..500 {
            set.add(i % 120);
            let (order, members) = set.sizes();
            assert_eq!(order, members);
            assert!(order <= 50);
        }
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = Arc::new(LruCounter::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment("/hot".to_string(), 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(&"/hot".to_string()), 8000);
    }
}
