//! A user-space block (page) cache layered above unbuffered file I/O.
//!
//! The engine ([`Engine`]) interposes fixed-size aligned blocks between
//! callers and the underlying device: repeated access to the same
//! region is served from memory, small writes are coalesced into
//! whole-block back-writes, and a FIFO policy bounds memory use. This
//! crate covers only the engine itself; `src/bin/cachedemo.rs` is a
//! thin, untested command-line driver built on top of it.

mod device;
mod error;
mod evict;
mod handles;
mod index;
mod store;

pub mod engine;

pub use engine::{CacheConfig, Engine, Whence};
pub use error::{CacheError, SeekErrorKind};
pub use handles::Handle;
