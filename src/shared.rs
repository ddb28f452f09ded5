//! Shared, lock-guarded buffers.
//!
//! [`SharedBuf`] puts a [`ChainBuf`] behind an `Arc<Mutex<_>>`. Each
//! operation run through it is one critical section, and change callbacks
//! run while the lock is held. That is the documented hazard of this
//! design: a callback must not take the lock again. Callbacks do not need
//! to: they receive the buffer as `&mut ChainBuf` directly.
//!
//! The shared wrapper is also where deferred callbacks live: a dispatch
//! job must reach the buffer after the mutating call returns, which
//! requires the shared handle.

use crate::buffer::ChainBuf;
use crate::defer::{DeferCtx, DeferQueue};
use crate::error::Result;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// A clonable, lock-guarded buffer handle.
///
/// # Examples
///
/// ```
/// use chainbuf::SharedBuf;
///
/// let buf = SharedBuf::new();
/// buf.add(b"shared").unwrap();
///
/// let other = buf.clone();
/// assert_eq!(other.len(), 6);
/// ```
#[derive(Clone)]
pub struct SharedBuf {
    inner: Arc<Mutex<ChainBuf>>,
}

impl SharedBuf {
    /// Creates an empty shared buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::from_buf(ChainBuf::new())
    }

    /// Wraps an existing buffer.
    #[must_use]
    pub fn from_buf(buf: ChainBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buf)),
        }
    }

    /// Locks the buffer for a multi-operation critical section.
    ///
    /// Other handles block until the guard drops. Do not call from inside
    /// a change callback: the lock is already held there.
    pub fn lock(&self) -> MutexGuard<'_, ChainBuf> {
        self.inner.lock()
    }

    /// Runs one operation under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut ChainBuf) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Routes this buffer's change callbacks through `queue`: deltas
    /// coalesce per entry and a single job per buffer flushes them on the
    /// queue's thread.
    pub fn defer_callbacks(&self, queue: Arc<dyn DeferQueue>) {
        let mut buf = self.inner.lock();
        buf.defer_ctx = Some(DeferCtx {
            queue,
            handle: Arc::downgrade(&self.inner),
        });
    }

    /// Appends bytes under the lock. See [`ChainBuf::add`].
    pub fn add(&self, data: &[u8]) -> Result<()> {
        self.with(|buf| buf.add(data))
    }

    /// Discards bytes from the head under the lock. See
    /// [`ChainBuf::drain`].
    pub fn drain(&self, n: usize) -> Result<()> {
        self.with(|buf| buf.drain(n))
    }

    /// Copies bytes out of the head under the lock. See
    /// [`ChainBuf::remove`].
    pub fn remove(&self, dst: &mut [u8]) -> Result<usize> {
        self.with(|buf| buf.remove(dst))
    }

    /// Buffer length. See [`ChainBuf::len`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for SharedBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuf")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}
