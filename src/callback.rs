//! Change notifications.
//!
//! Every successful mutation reports a window `{orig_size, n_added,
//! n_deleted}` to the registered callbacks. Delivery is immediate by
//! default; binding a queue through
//! [`SharedBuf::defer_callbacks`](crate::SharedBuf::defer_callbacks)
//! switches the buffer to deferred mode, where windows coalesce per entry
//! and a single dispatch job flushes the aggregate.
//!
//! Callbacks receive `&mut ChainBuf` and may mutate the buffer; nested
//! mutations are delivered as their own window once the current pass
//! finishes. A callback may remove itself through its handle. Suspension
//! pauses delivery for one entry while its deltas keep accumulating.

use crate::buffer::ChainBuf;
use std::mem;
use std::sync::Arc;

/// Delta report passed to change callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackInfo {
    /// Buffer length at the start of the reported window.
    pub orig_size: usize,
    /// Bytes appended during the window.
    pub n_added: usize,
    /// Bytes drained during the window.
    pub n_deleted: usize,
}

/// Identifies a registered callback for later configuration or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

type CallbackFn = Box<dyn FnMut(&mut ChainBuf, &CallbackInfo) + Send>;

struct CallbackEntry {
    id: u64,
    func: CallbackFn,
    enabled: bool,
    suspended: bool,
    /// Buffer length at the first coalesced delta.
    pending_orig: usize,
    acc_added: usize,
    acc_deleted: usize,
}

impl CallbackEntry {
    fn has_pending(&self) -> bool {
        self.acc_added != 0 || self.acc_deleted != 0
    }

    fn accumulate(&mut self, orig: usize, added: usize, deleted: usize) {
        if !self.has_pending() {
            self.pending_orig = orig;
        }
        self.acc_added += added;
        self.acc_deleted += deleted;
    }

    fn take_pending(&mut self) -> CallbackInfo {
        let info = CallbackInfo {
            orig_size: self.pending_orig,
            n_added: self.acc_added,
            n_deleted: self.acc_deleted,
        };
        self.acc_added = 0;
        self.acc_deleted = 0;
        info
    }
}

/// Per-buffer callback state.
#[derive(Default)]
pub(crate) struct CallbackSet {
    entries: Vec<CallbackEntry>,
    next_id: u64,
    /// Recursion guard: set while a delivery pass runs.
    notifying: bool,
    /// Window folded together by mutations nested inside a callback.
    pending: Option<(usize, usize, usize)>,
    /// Removals requested from inside a callback.
    removals: Vec<u64>,
    pub(crate) dispatch_scheduled: bool,
}

impl ChainBuf {
    /// Registers a change callback and returns its handle.
    ///
    /// Entries run in registration order, though callers should not depend
    /// on the order between entries. The callback runs with the buffer
    /// borrowed mutably (under the shared lock, if one is in use) and may
    /// mutate the buffer or remove itself; configuring *other* entries
    /// from inside a callback is not supported.
    pub fn add_callback<F>(&mut self, func: F) -> CallbackHandle
    where
        F: FnMut(&mut ChainBuf, &CallbackInfo) + Send + 'static,
    {
        let id = self.cb.next_id;
        self.cb.next_id += 1;
        self.cb.entries.push(CallbackEntry {
            id,
            func: Box::new(func),
            enabled: true,
            suspended: false,
            pending_orig: 0,
            acc_added: 0,
            acc_deleted: 0,
        });
        CallbackHandle(id)
    }

    /// Unregisters a callback. Returns false if the handle is unknown.
    ///
    /// Inside a callback this may only be used for self-removal; the
    /// removal takes effect when the current delivery pass finishes.
    pub fn remove_callback(&mut self, handle: CallbackHandle) -> bool {
        if self.cb.notifying {
            self.cb.removals.push(handle.0);
            return true;
        }
        let before = self.cb.entries.len();
        self.cb.entries.retain(|e| e.id != handle.0);
        self.cb.entries.len() != before
    }

    /// Enables or disables a callback without unregistering it. Disabled
    /// entries observe no windows at all. Returns false if the handle is
    /// unknown.
    pub fn set_callback_enabled(&mut self, handle: CallbackHandle, enabled: bool) -> bool {
        match self.cb.entries.iter_mut().find(|e| e.id == handle.0) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Pauses delivery for one entry. Deltas keep accumulating while
    /// suspended. Returns false if the handle is unknown.
    pub fn suspend_callback(&mut self, handle: CallbackHandle) -> bool {
        match self.cb.entries.iter_mut().find(|e| e.id == handle.0) {
            Some(entry) => {
                entry.suspended = true;
                true
            }
            None => false,
        }
    }

    /// Resumes delivery for one entry. If deltas accumulated during the
    /// suspension the entry is invoked once with the aggregate (or
    /// scheduled once, in deferred mode). Returns false if the handle is
    /// unknown.
    pub fn unsuspend_callback(&mut self, handle: CallbackHandle) -> bool {
        let Some(entry) = self.cb.entries.iter_mut().find(|e| e.id == handle.0) else {
            return false;
        };
        entry.suspended = false;
        if entry.has_pending() {
            if self.deferred() {
                self.schedule_dispatch();
            } else {
                self.pump();
            }
        }
        true
    }

    /// Delivers any pending deferred aggregates immediately, on the
    /// calling thread. The scheduled dispatch job becomes a no-op.
    pub fn flush_callbacks(&mut self) {
        self.cb.dispatch_scheduled = false;
        self.pump();
    }

    /// Reports one mutation window to the callback set.
    pub(crate) fn note_mutation(&mut self, orig: usize, added: usize, deleted: usize) {
        if added == 0 && deleted == 0 {
            return;
        }
        if self.cb.notifying {
            // Nested mutation from inside a callback: fold into the
            // follow-up window the running pass will deliver.
            match &mut self.cb.pending {
                Some((_, a, d)) => {
                    *a += added;
                    *d += deleted;
                }
                None => self.cb.pending = Some((orig, added, deleted)),
            }
            return;
        }
        if self.cb.entries.is_empty() {
            return;
        }
        if self.deferred() {
            for entry in self.cb.entries.iter_mut().filter(|e| e.enabled) {
                entry.accumulate(orig, added, deleted);
            }
            self.schedule_dispatch();
            return;
        }
        self.cb.pending = Some((orig, added, deleted));
        self.pump();
    }

    fn deferred(&self) -> bool {
        self.defer_ctx.is_some()
    }

    /// Enqueues the single coalescing dispatch job, if none is in flight.
    pub(crate) fn schedule_dispatch(&mut self) {
        if self.cb.dispatch_scheduled {
            return;
        }
        let (queue, handle) = match &self.defer_ctx {
            Some(ctx) => (Arc::clone(&ctx.queue), ctx.handle.clone()),
            None => return,
        };
        self.cb.dispatch_scheduled = true;
        queue.defer(Box::new(move || {
            if let Some(shared) = handle.upgrade() {
                let mut buf = shared.lock();
                buf.cb.dispatch_scheduled = false;
                buf.pump();
            }
        }));
    }

    /// The delivery engine. Runs windows and per-entry aggregates to
    /// quiescence. The entry list is detached during invocation so
    /// callbacks can mutate the buffer; additions and self-removals made
    /// meanwhile are merged after each round.
    fn pump(&mut self) {
        if self.cb.notifying {
            return;
        }
        self.cb.notifying = true;
        loop {
            let window = self.cb.pending.take();
            let window = if self.deferred() {
                // Deferred mode coalesces per entry; windows raised by
                // nested mutations join the aggregates.
                if let Some((orig, added, deleted)) = window {
                    for entry in self.cb.entries.iter_mut().filter(|e| e.enabled) {
                        entry.accumulate(orig, added, deleted);
                    }
                }
                None
            } else {
                window
            };
            let has_aggregate = self
                .cb
                .entries
                .iter()
                .any(|e| e.enabled && !e.suspended && e.has_pending());
            if window.is_none() && !has_aggregate {
                break;
            }
            let mut entries = mem::take(&mut self.cb.entries);
            for entry in &mut entries {
                if !entry.enabled {
                    continue;
                }
                if entry.suspended {
                    if let Some((orig, added, deleted)) = window {
                        entry.accumulate(orig, added, deleted);
                    }
                    continue;
                }
                if entry.has_pending() {
                    let info = entry.take_pending();
                    (entry.func)(self, &info);
                }
                if let Some((orig_size, n_added, n_deleted)) = window {
                    let info = CallbackInfo {
                        orig_size,
                        n_added,
                        n_deleted,
                    };
                    (entry.func)(self, &info);
                }
            }
            let registered = mem::take(&mut self.cb.entries);
            entries.extend(registered);
            if !self.cb.removals.is_empty() {
                let removals = mem::take(&mut self.cb.removals);
                entries.retain(|e| !removals.contains(&e.id));
            }
            self.cb.entries = entries;
        }
        self.cb.notifying = false;
    }
}
