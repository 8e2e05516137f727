//! The public API. Translates byte-level `read`/`write` at arbitrary
//! offsets into block-aligned operations, consults the index, loads or
//! allocates via the store and device adapter, updates dirty flags,
//! triggers eviction, performs read-ahead, and implements `fsync` and
//! `close` write-back.

use std::path::Path;

use generational_arena::Index as ArenaIndex;
use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::device::DeviceFile;
use crate::error::{CacheError, SeekErrorKind};
use crate::evict::EvictionQueue;
use crate::handles::{Handle, HandleTable};
use crate::index::Index;
use crate::store::BlockStore;

/// Block size and cache capacity. The engine itself never reads these
/// from the environment or a CLI flag; the embedding program decides
/// them once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub block_size: usize,
    pub capacity: usize,
}

impl Default for CacheConfig {
    /// Matches `BLOCK_SIZE`/`CACHE_CAPACITY` in
    /// `original_source/app/page-cache.cpp`.
    fn default() -> Self {
        Self { block_size: 4096, capacity: 256 }
    }
}

/// The three standard seek anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

struct Inner {
    handles: HandleTable,
    index: Index,
    queue: EvictionQueue,
    store: BlockStore,
}

/// The process-wide cache. One mutex (`parking_lot::Mutex`, matching
/// this teacher repo's preference over `std::sync::Mutex` elsewhere in
/// `gruel`/`vcontrol`) protects the handle table, index, eviction
/// queue, and every block's metadata and data, structural rather than
/// a convention callers must uphold, since all four live inside one
/// `Inner` behind one lock.
pub struct Engine {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl Engine {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                handles: HandleTable::new(),
                index: Index::new(),
                queue: EvictionQueue::new(),
                store: BlockStore::new(config.block_size),
            }),
            config,
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    #[instrument(skip(self))]
    pub fn open(&self, path: impl AsRef<Path> + std::fmt::Debug) -> Result<Handle, CacheError> {
        let device = DeviceFile::open(path.as_ref())?;
        let mut inner = self.inner.lock();
        let handle = inner.handles.register(device);
        debug!(%handle, "opened");
        Ok(handle)
    }

    #[instrument(skip(self))]
    pub fn close(&self, handle: Handle) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        inner.handles.get(handle)?;

        for key in inner.index.keys_for_handle(handle) {
            let idx = inner.index.remove(&key).expect("index entry vanished under the lock");
            inner.queue.remove(idx);
            Self::release_writing_back_if_dirty(&mut inner, handle, idx)?;
        }

        inner.handles.remove(handle)?;
        debug!(%handle, "closed");
        Ok(())
    }

    /// Lock-free position query, used by `read`/`write` while already
    /// holding the mutex. The original program this engine replaces had
    /// `read`/`write` call straight into `lseek(.., SEEK_CUR)`, which
    /// re-acquired the same (non-reentrant) lock they were already
    /// holding; this sidesteps that re-entrancy entirely.
    fn position_locked(inner: &Inner, handle: Handle) -> Result<u64, CacheError> {
        Ok(inner.handles.get(handle)?.position)
    }

    #[instrument(skip(self))]
    pub fn lseek(&self, handle: Handle, offset: i64, whence: Whence) -> Result<u64, CacheError> {
        let mut inner = self.inner.lock();
        inner.handles.get(handle)?;

        if whence == Whence::End {
            // Flush before consulting device length, so an end-anchored
            // seek sees a length consistent with any dirty blocks.
            Self::flush_locked(&mut inner, handle)?;
        }

        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => Self::position_locked(&inner, handle)? as i64,
            Whence::End => inner
                .handles
                .get(handle)?
                .device
                .len()
                .map_err(|e| match e {
                    CacheError::Io { source, .. } => CacheError::Seek(SeekErrorKind::Length(source)),
                    other => other,
                })? as i64,
        };

        let new_pos = base
            .checked_add(offset)
            .filter(|&p| p >= 0)
            .ok_or(CacheError::Seek(SeekErrorKind::NegativeOffset))?;

        let of = inner.handles.get_mut(handle)?;
        of.position = new_pos as u64;
        Ok(of.position)
    }

    #[instrument(skip(self, buf), fields(n = buf.len()))]
    pub fn read(&self, handle: Handle, buf: &mut [u8]) -> Result<usize, CacheError> {
        let mut inner = self.inner.lock();
        let block_size = self.config.block_size as u64;
        let pos = Self::position_locked(&inner, handle)?;
        let aligned = pos - (pos % block_size);
        let k = (pos - aligned) as usize;

        let idx = self.resident_for_read(&mut inner, handle, aligned)?;
        let copied = {
            let block = inner.store.get(idx);
            let avail = self.config.block_size - k;
            let n = buf.len().min(avail);
            buf[..n].copy_from_slice(&block.data.as_slice()[k..k + n]);
            n
        };

        inner.handles.get_mut(handle)?.position = pos + copied as u64;

        let next_aligned = aligned + block_size;
        if inner.index.get(&(handle, next_aligned)).is_none() {
            if let Err(e) = self.resident_for_read(&mut inner, handle, next_aligned) {
                // Read-ahead errors never fail the caller's request.
                trace!(error = %e, "read-ahead failed, discarding");
            }
        }

        Ok(copied)
    }

    #[instrument(skip(self, buf), fields(n = buf.len()))]
    pub fn write(&self, handle: Handle, buf: &[u8]) -> Result<usize, CacheError> {
        let mut inner = self.inner.lock();
        let block_size = self.config.block_size as u64;
        let pos = Self::position_locked(&inner, handle)?;
        let aligned = pos - (pos % block_size);
        let k = (pos - aligned) as usize;

        let idx = self.resident_for_write(&mut inner, handle, aligned)?;
        let copied = {
            let block = inner.store.get_mut(idx);
            let avail = self.config.block_size - k;
            let n = buf.len().min(avail);
            block.data.as_mut_slice()[k..k + n].copy_from_slice(&buf[..n]);
            block.dirty = true;
            n
        };

        inner.handles.get_mut(handle)?.position = pos + copied as u64;
        Ok(copied)
    }

    #[instrument(skip(self))]
    pub fn fsync(&self, handle: Handle) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        inner.handles.get(handle)?;
        Self::flush_locked(&mut inner, handle)
    }

    /// Writes back every dirty block owned by `handle`. Writes back as
    /// many as possible and returns the first failure; blocks whose
    /// write-back succeeded are left clean.
    fn flush_locked(inner: &mut Inner, handle: Handle) -> Result<(), CacheError> {
        let mut first_err = None;
        for key in inner.index.keys_for_handle(handle) {
            let idx = inner.index.get(&key).expect("index entry vanished under the lock");
            if !inner.store.get(idx).dirty {
                continue;
            }
            let (offset, result) = {
                let block = inner.store.get(idx);
                let device = &inner.handles.get(handle)?.device;
                (block.offset, device.write_block(block.offset, &block.data))
            };
            match result {
                Ok(()) => inner.store.get_mut(idx).dirty = false,
                Err(e) => {
                    warn!(offset, error = %e, "write-back failed during fsync");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolves `(handle, aligned)` to a resident block for a `read`,
    /// loading it from the device on a miss.
    fn resident_for_read(&self, inner: &mut Inner, handle: Handle, aligned: u64) -> Result<ArenaIndex, CacheError> {
        if let Some(idx) = inner.index.get(&(handle, aligned)) {
            return Ok(idx);
        }

        let idx = inner.store.allocate(handle, aligned);
        {
            let block = inner.store.get_mut(idx);
            let result = inner.handles.get(handle)?.device.read_block(aligned, &mut block.data);
            if let Err(e) = result {
                inner.store.release(idx);
                return Err(e);
            }
        }

        self.publish(inner, idx, handle, aligned)?;
        Ok(idx)
    }

    /// Resolves `(handle, aligned)` to a resident block for a `write`.
    /// A write-miss never reads the device: the fresh block comes from
    /// `BlockStore::allocate` zero-initialised and is published as-is.
    /// If the caller only writes part of the block, the untouched
    /// remainder stays zero and overwrites whatever was on disk there
    /// once the block is written back — the aliasing hazard spec.md §9
    /// documents rather than avoids.
    fn resident_for_write(&self, inner: &mut Inner, handle: Handle, aligned: u64) -> Result<ArenaIndex, CacheError> {
        if let Some(idx) = inner.index.get(&(handle, aligned)) {
            return Ok(idx);
        }

        let idx = inner.store.allocate(handle, aligned);
        self.publish(inner, idx, handle, aligned)?;
        Ok(idx)
    }

    /// Publishes a newly loaded block into the index and eviction
    /// queue. Evicts the FIFO head first when the index is already at
    /// capacity, writing it back through the adapter if dirty. An
    /// eviction write-back failure propagates to the caller that
    /// triggered it; the victim is still discarded.
    fn publish(&self, inner: &mut Inner, idx: ArenaIndex, handle: Handle, aligned: u64) -> Result<(), CacheError> {
        if inner.index.len() >= self.config.capacity {
            let victim = inner.queue.pop_front().expect("eviction queue empty while index is at capacity");
            let (v_handle, v_offset) = {
                let block = inner.store.get(victim);
                (block.handle, block.offset)
            };
            inner.index.remove(&(v_handle, v_offset));
            Self::release_writing_back_if_dirty(inner, v_handle, victim)?;
        }

        inner.index.insert((handle, aligned), idx);
        inner.queue.push(idx);
        Ok(())
    }

    /// Writes back `idx` through `owner`'s device if dirty, then
    /// releases its buffer regardless of outcome; a failed write-back
    /// still discards the block.
    fn release_writing_back_if_dirty(inner: &mut Inner, owner: Handle, idx: ArenaIndex) -> Result<(), CacheError> {
        let dirty = inner.store.get(idx).dirty;
        if !dirty {
            inner.store.release(idx);
            return Ok(());
        }
        let (offset, result) = {
            let block = inner.store.get(idx);
            let device = &inner.handles.get(owner)?.device;
            (block.offset, device.write_block(block.offset, &block.data))
        };
        inner.store.release(idx);
        if let Err(e) = &result {
            warn!(%owner, offset, error = %e, "write-back failed");
        }
        result
    }
}
