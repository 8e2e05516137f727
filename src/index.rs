//! Maps `(handle, aligned_offset)` to the arena slot holding that block.

use std::collections::HashMap;

use generational_arena::Index as ArenaIndex;

use crate::handles::Handle;

pub(crate) type BlockKey = (Handle, u64);

/// Average-case constant time lookup keyed on the pair, a plain hash
/// map, the same shape as `PairHash`/`blocks_map` in
/// `original_source/app/page-cache.cpp`.
pub(crate) struct Index {
    map: HashMap<BlockKey, ArenaIndex>,
}

impl Index {
    pub(crate) fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Precondition: `key` is absent. Violating this would silently
    /// orphan the previous block's arena slot, so it is checked even in
    /// release builds via the returned bool rather than panicking.
    pub(crate) fn insert(&mut self, key: BlockKey, idx: ArenaIndex) -> bool {
        self.map.insert(key, idx).is_none()
    }

    pub(crate) fn get(&self, key: &BlockKey) -> Option<ArenaIndex> {
        self.map.get(key).copied()
    }

    pub(crate) fn remove(&mut self, key: &BlockKey) -> Option<ArenaIndex> {
        self.map.remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Used by `close` and `fsync` to iterate every block owned by a
    /// handle. Collects keys rather than returning an iterator borrowing
    /// `self`, since callers mutate the index while visiting entries.
    pub(crate) fn keys_for_handle(&self, handle: Handle) -> Vec<BlockKey> {
        self.map.keys().filter(|(h, _)| *h == handle).copied().collect()
    }
}
