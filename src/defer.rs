//! The deferred-dispatch seam.
//!
//! The buffer consumes its host event loop through one narrow contract:
//! accept a job now, run it later on the loop's thread. Coalescing is the
//! buffer's responsibility: at most one dispatch job per buffer is in
//! flight, no matter how many mutations occur before it runs.
//!
//! [`ManualQueue`] is the in-process stand-in used by tests and demos: it
//! holds jobs until [`ManualQueue::run_pending`] is called, which plays the
//! role of one event-loop iteration.

use crate::buffer::ChainBuf;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// A scheduled unit of deferred callback work.
pub type Job = Box<dyn FnOnce() + Send>;

/// The event-loop contract consumed for deferred callbacks.
pub trait DeferQueue: Send + Sync {
    /// Enqueues a job to run later on the loop's thread.
    fn defer(&self, job: Job);
}

/// Links a buffer to its dispatch queue. The back-reference is weak so a
/// queued job outliving the buffer degrades to a no-op.
pub(crate) struct DeferCtx {
    pub(crate) queue: Arc<dyn DeferQueue>,
    pub(crate) handle: Weak<Mutex<ChainBuf>>,
}

/// A queue that runs jobs only when explicitly pumped.
pub struct ManualQueue {
    jobs: SegQueue<Job>,
}

impl ManualQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: SegQueue::new(),
        }
    }

    /// Runs every currently queued job and returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.jobs.pop() {
            job();
            ran += 1;
        }
        ran
    }

    /// Returns true if no jobs are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for ManualQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferQueue for ManualQueue {
    fn defer(&self, job: Job) {
        self.jobs.push(job);
    }
}

impl std::fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualQueue")
            .field("pending", &self.jobs.len())
            .finish()
    }
}
