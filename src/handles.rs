//! Maps opaque integer handles to the underlying device object and
//! per-handle logical position.

use std::collections::HashMap;
use std::fmt;

use crate::device::DeviceFile;
use crate::error::CacheError;

/// An opaque handle issued to callers. Never reused while the
/// identifier's file is still open.
///
/// Allocated as a small dense counter, independent of any raw OS file
/// descriptor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
impl Handle {
    pub(crate) fn for_test(n: u64) -> Self {
        Handle(n)
    }
}

pub(crate) struct OpenFile {
    pub(crate) device: DeviceFile,
    pub(crate) position: u64,
}

/// Registers open device objects and their per-handle state. Contains
/// every handle that has not yet been closed, and no others.
pub(crate) struct HandleTable {
    next: u64,
    files: HashMap<Handle, OpenFile>,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self { next: 0, files: HashMap::new() }
    }

    pub(crate) fn register(&mut self, device: DeviceFile) -> Handle {
        let handle = Handle(self.next);
        self.next += 1;
        self.files.insert(handle, OpenFile { device, position: 0 });
        handle
    }

    pub(crate) fn get(&self, handle: Handle) -> Result<&OpenFile, CacheError> {
        self.files.get(&handle).ok_or(CacheError::UnknownHandle(handle))
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Result<&mut OpenFile, CacheError> {
        self.files.get_mut(&handle).ok_or(CacheError::UnknownHandle(handle))
    }

    pub(crate) fn remove(&mut self, handle: Handle) -> Result<OpenFile, CacheError> {
        self.files.remove(&handle).ok_or(CacheError::UnknownHandle(handle))
    }
}
