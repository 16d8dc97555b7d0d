use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use cutout_logging::{cutout_error, cutout_trace};
use thiserror::Error;

const HANDLE_SCHEME: &str = "blob:cutout/";

/// Opaque, externally dereferenceable token for a live byte buffer.
///
/// Tokens are handed out for preview and download only; nothing in the
/// pipeline parses them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HANDLE_SCHEME}{}", self.0)
    }
}

/// A byte buffer together with the handle that exposes it.
///
/// Not `Clone`: an artifact is released by moving it back into
/// [`ResourceManager::release`], so each handle can be released at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    handle: Handle,
    bytes: Bytes,
}

impl Artifact {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceStats {
    pub acquired: u64,
    pub released: u64,
    pub live: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("handle {0} is not live")]
    NotLive(Handle),
}

/// Sole allocator of handles; keeps acquire/release accounting in one place.
#[derive(Debug, Default)]
pub struct ResourceManager {
    next: u64,
    live: HashMap<Handle, Bytes>,
    acquired: u64,
    released: u64,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, bytes: Bytes) -> Artifact {
        self.next += 1;
        let handle = Handle(self.next);
        self.live.insert(handle.clone(), bytes.clone());
        self.acquired += 1;
        cutout_trace!("acquired {} ({} bytes)", handle, bytes.len());
        Artifact { handle, bytes }
    }

    pub fn release(&mut self, artifact: Artifact) -> Result<(), ResourceError> {
        match self.live.remove(&artifact.handle) {
            Some(_) => {
                self.released += 1;
                cutout_trace!("released {}", artifact.handle);
                Ok(())
            }
            None => {
                cutout_error!("release of handle {} that is not live", artifact.handle);
                Err(ResourceError::NotLive(artifact.handle))
            }
        }
    }

    /// Dereferences a live handle.
    pub fn resolve(&self, handle: &Handle) -> Option<Bytes> {
        self.live.get(handle).cloned()
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            acquired: self.acquired,
            released: self.released,
            live: self.live.len(),
        }
    }
}
