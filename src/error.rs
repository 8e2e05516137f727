use std::path::PathBuf;

use nix::errno::Errno;

use crate::handles::Handle;

/// Errors surfaced by the cache engine.
///
/// Each variant corresponds to one of the POSIX-flavoured failure kinds
/// a `-1`-sentinel API would collapse into one value; the richer
/// channel here is kept internal to the library and only flattened at
/// the CLI boundary (`src/bin/cachedemo.rs`).
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("handle {0} is not open")]
    UnknownHandle(Handle),

    #[error("device io at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("seek: {0}")]
    Seek(#[from] SeekErrorKind),
}

#[derive(thiserror::Error, Debug)]
pub enum SeekErrorKind {
    #[error("resulting offset is negative")]
    NegativeOffset,
    #[error("querying device length: {0}")]
    Length(#[source] std::io::Error),
}

/// Turns an `Errno` into the `std::io::Error` form the rest of the
/// crate's error variants carry.
pub(crate) fn io_error_from_errno(e: Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}
