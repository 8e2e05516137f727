//! Owns block buffers. Blocks live in a `generational_arena::Arena`; the
//! index and eviction queue hold `generational_arena::Index` values into
//! it rather than `Arc`/raw pointers, ruling out cyclic ownership. This
//! mirrors how `src/gruel` (in the same teacher repo) stores its own
//! pooled objects.

use generational_arena::{Arena, Index as ArenaIndex};

use crate::device::AlignedBuf;
use crate::handles::Handle;

pub(crate) struct Block {
    pub(crate) handle: Handle,
    pub(crate) offset: u64,
    pub(crate) data: AlignedBuf,
    pub(crate) dirty: bool,
}

pub(crate) struct BlockStore {
    arena: Arena<Block>,
    block_size: usize,
}

impl BlockStore {
    pub(crate) fn new(block_size: usize) -> Self {
        Self { arena: Arena::new(), block_size }
    }

    /// Allocates a fresh, zero-initialised block, not yet indexed or
    /// queued; the caller publishes it once its content is settled.
    pub(crate) fn allocate(&mut self, handle: Handle, offset: u64) -> ArenaIndex {
        self.arena.insert(Block {
            handle,
            offset,
            data: AlignedBuf::zeroed(self.block_size),
            dirty: false,
        })
    }

    pub(crate) fn get(&self, idx: ArenaIndex) -> &Block {
        self.arena.get(idx).expect("arena index outlived its block")
    }

    pub(crate) fn get_mut(&mut self, idx: ArenaIndex) -> &mut Block {
        self.arena.get_mut(idx).expect("arena index outlived its block")
    }

    /// Frees the buffer. The caller must already have written the block
    /// back if dirty and removed it from the index and queue.
    pub(crate) fn release(&mut self, idx: ArenaIndex) -> Block {
        self.arena.remove(idx).expect("double release of a cache block")
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_block_is_zeroed_and_clean() {
        let mut store = BlockStore::new(4096);
        let idx = store.allocate(Handle::for_test(0), 0);
        let block = store.get(idx);
        assert!(!block.dirty);
        assert!(block.data.as_slice().iter().all(|&b| b == 0));
        assert_eq!(block.data.len(), 4096);
    }

    #[test]
    fn release_frees_the_slot() {
        let mut store = BlockStore::new(4096);
        let idx = store.allocate(Handle::for_test(0), 0);
        assert_eq!(store.len(), 1);
        store.release(idx);
        assert_eq!(store.len(), 0);
    }
}
