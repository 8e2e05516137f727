//! Unbuffered, block-aligned positioned reads and writes against the
//! host OS, grounded in `orbblk`'s raw `pread`/`pwrite` against a device
//! fd and in `wormholefs`'s `O_DIRECT`-opened, `Mutex`-guarded
//! `std::fs::File`.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fs::File;
use std::os::fd::FromRawFd;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;
use nix::sys::uio::{pread, pwrite};
use tracing::warn;

use crate::error::{CacheError, io_error_from_errno};

/// Alignment the host OS requires of buffers handed to unbuffered I/O.
/// Block size is always a multiple of this.
pub(crate) const BLOCK_ALIGN: usize = 4096;

/// A block-sized buffer allocated with alignment `>= BLOCK_ALIGN`, so it
/// can be handed directly to `pread`/`pwrite` on an `O_DIRECT` fd.
pub(crate) struct AlignedBuf {
    ptr: *mut u8,
    len: usize,
    layout: Layout,
}

// The buffer is exclusively owned by whoever holds the `Block` it lives
// in, which is itself only ever touched under the engine's single mutex.
unsafe impl Send for AlignedBuf {}

impl AlignedBuf {
    pub(crate) fn zeroed(len: usize) -> Self {
        let layout = Layout::from_size_align(len, BLOCK_ALIGN)
            .expect("block size must be a positive multiple of the device alignment");
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "allocation failure for a {len}-byte cache block");
        Self { ptr, len, layout }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

/// One open underlying file, reached only through whole, aligned blocks.
pub(crate) struct DeviceFile {
    file: File,
    path: PathBuf,
}

impl DeviceFile {
    /// Opens `path` read-write, unbuffered and write-through. Pairing
    /// `O_DIRECT` with `O_SYNC` is deliberate: it ensures a back-write
    /// issued through this adapter reaches the device rather than
    /// stopping at an OS-internal buffer.
    pub(crate) fn open(path: &Path) -> Result<Self, CacheError> {
        let direct = OFlag::O_RDWR | OFlag::O_DIRECT | OFlag::O_SYNC;
        let fd = match open(path, direct, Mode::empty()) {
            Ok(fd) => fd,
            Err(Errno::EINVAL) => {
                warn!(path = %path.display(), "O_DIRECT rejected by filesystem, reopening write-through only");
                open(path, OFlag::O_RDWR | OFlag::O_SYNC, Mode::empty()).map_err(|source| {
                    CacheError::Open { path: path.to_path_buf(), source: io_error_from_errno(source) }
                })?
            }
            Err(source) => {
                return Err(CacheError::Open { path: path.to_path_buf(), source: io_error_from_errno(source) });
            }
        };
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self { file, path: path.to_path_buf() })
    }

    /// Reads exactly one block at `aligned_offset`. A short read at EOF
    /// zero-pads the remainder of `buf`.
    pub(crate) fn read_block(&self, aligned_offset: u64, buf: &mut AlignedBuf) -> Result<(), CacheError> {
        let want = buf.len();
        let n = pread(&self.file, buf.as_mut_slice(), aligned_offset as i64)
            .map_err(|source| CacheError::Io { offset: aligned_offset, source: io_error_from_errno(source) })?;
        if n < want {
            buf.as_mut_slice()[n..].fill(0);
        }
        Ok(())
    }

    /// Writes exactly one block at `aligned_offset`.
    pub(crate) fn write_block(&self, aligned_offset: u64, buf: &AlignedBuf) -> Result<(), CacheError> {
        let want = buf.len();
        let n = pwrite(&self.file, buf.as_slice(), aligned_offset as i64)
            .map_err(|source| CacheError::Io { offset: aligned_offset, source: io_error_from_errno(source) })?;
        if n != want {
            return Err(CacheError::Io {
                offset: aligned_offset,
                source: std::io::Error::new(std::io::ErrorKind::WriteZero, "short write-back of a cache block"),
            });
        }
        Ok(())
    }

    /// Current on-disk length of the file, used by `Whence::End` seeks.
    pub(crate) fn len(&self) -> Result<u64, CacheError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|source| CacheError::Io { offset: 0, source })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
