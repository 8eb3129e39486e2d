//! Bounded most-recently-used cache of states reached by replaying move sequences.
use crate::engine::{GameState, Move};
use fxhash::FxHashMap;
use std::collections::BTreeMap;

/// Default number of move sequences kept by a [`ReplayCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 250;

struct CacheEntry {
    state: GameState,
    stamp: u64,
}

/// Maps a move sequence (from the level's initial state) to the state it reaches.
///
/// Holds at most `capacity` entries and evicts the least recently used one when full.
/// Both inserting an existing key and a successful lookup count as a use.
pub struct ReplayCache {
    capacity: usize,
    entries: FxHashMap<Vec<Move>, CacheEntry>,
    /// Recency index: stamp -> key, oldest first.
    recency: BTreeMap<u64, Vec<Move>>,
    clock: u64,
}

impl ReplayCache {
    pub fn new(capacity: usize) -> Self {
        ReplayCache {
            capacity,
            entries: FxHashMap::default(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, moves: &[Move]) -> bool {
        self.entries.contains_key(moves)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn promote(&mut self, moves: &[Move]) {
        let stamp = self.tick();
        if let Some(entry) = self.entries.get_mut(moves) {
            if let Some(key) = self.recency.remove(&entry.stamp) {
                self.recency.insert(stamp, key);
            }
            entry.stamp = stamp;
        }
    }

    /// Stores `state` under `moves`. If `moves` is already cached the existing entry is
    /// only marked as most recently used.
    pub fn insert(&mut self, moves: Vec<Move>, state: GameState) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(moves.as_slice()) {
            self.promote(&moves);
            return;
        }
        let stamp = self.tick();
        self.recency.insert(stamp, moves.clone());
        self.entries.insert(moves, CacheEntry { state, stamp });
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Looks up the state reached by `moves`, marking it as most recently used.
    pub fn get(&mut self, moves: &[Move]) -> Option<&GameState> {
        if !self.entries.contains_key(moves) {
            return None;
        }
        self.promote(moves);
        self.entries.get(moves).map(|entry| &entry.state)
    }

    /// Finds the longest cached prefix of `moves`. Returns its length together with the
    /// cached state, or `None` when no prefix (not even the empty one) is cached.
    pub fn longest_prefix(&mut self, moves: &[Move]) -> Option<(usize, GameState)> {
        let len = (0..=moves.len())
            .rev()
            .find(|&len| self.entries.contains_key(&moves[..len]))?;
        self.get(&moves[..len]).map(|state| (len, state.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Color, Direction};
    use crate::utils::load_level;

    fn mv(s: &str) -> Move {
        s.parse().unwrap()
    }

    fn seq(moves: &[&str]) -> Vec<Move> {
        moves.iter().map(|m| mv(m)).collect()
    }

    fn some_state(col: usize) -> GameState {
        let mut row = vec!['_'; 6];
        row[col] = 'R';
        let text = format!("{}\n######", row.into_iter().collect::<String>());
        load_level(&text).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = ReplayCache::new(DEFAULT_CACHE_CAPACITY);
        assert!(cache.is_empty());
        cache.insert(seq(&["rd"]), some_state(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&seq(&["rd"])), Some(&some_state(1)));
        assert_eq!(cache.get(&seq(&["ra"])), None);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = ReplayCache::new(2);
        assert_eq!(cache.capacity(), 2);
        cache.insert(seq(&["rd"]), some_state(1));
        cache.insert(seq(&["rd", "rd"]), some_state(2));
        // Touch the first entry so the second becomes the eviction candidate.
        assert!(cache.get(&seq(&["rd"])).is_some());
        cache.insert(seq(&["rd", "rd", "rd"]), some_state(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&seq(&["rd"])));
        assert!(!cache.contains(&seq(&["rd", "rd"])));
        assert!(cache.contains(&seq(&["rd", "rd", "rd"])));
    }

    #[test]
    fn test_reinsert_only_promotes() {
        let mut cache = ReplayCache::new(2);
        cache.insert(seq(&["rd"]), some_state(1));
        cache.insert(seq(&["ra"]), some_state(0));
        cache.insert(seq(&["rd"]), some_state(5));
        // The first state is kept, but the key is now most recently used.
        assert_eq!(cache.get(&seq(&["rd"])), Some(&some_state(1)));
        cache.insert(seq(&["rw"]), some_state(2));
        assert!(cache.contains(&seq(&["rd"])));
        assert!(!cache.contains(&seq(&["ra"])));
    }

    #[test]
    fn test_longest_prefix() {
        let mut cache = ReplayCache::new(10);
        assert_eq!(cache.longest_prefix(&seq(&["rd"])), None);
        cache.insert(Vec::new(), some_state(0));
        cache.insert(seq(&["rd", "rd"]), some_state(2));
        let (len, state) = cache.longest_prefix(&seq(&["rd", "rd", "rd"])).unwrap();
        assert_eq!(len, 2);
        assert_eq!(state, some_state(2));
        let (len, _) = cache
            .longest_prefix(&[Move::new(Color::Red, Direction::Left)])
            .unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = ReplayCache::new(0);
        cache.insert(seq(&["rd"]), some_state(1));
        assert!(cache.is_empty());
    }
}
