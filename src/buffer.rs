//! The chained byte buffer.
//!
//! [`ChainBuf`] is a segmented FIFO byte queue: producers append at the tail
//! (by copy, by reference, by file range, or by relinking another buffer's
//! segments) and consumers drain from the head. Bytes move between buffers
//! without copying; only boundary splits and explicit contiguity requests
//! ([`ChainBuf::pullup`]) copy.
//!
//! The buffer is passive: all concurrency comes from the caller (see
//! [`SharedBuf`](crate::SharedBuf) for the locked wrapper) and all change
//! notification goes through the callback set (see
//! [`add_callback`](ChainBuf::add_callback)).

use crate::callback::CallbackSet;
use crate::defer::DeferCtx;
use crate::error::{Error, ErrorKind, Result};
use crate::segment::{round_capacity, Segment};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;

/// Selects one end of a buffer for freeze operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    /// The drain side: freezing it rejects drains, removes, prepends and
    /// outbound writes.
    Front,
    /// The append side: freezing it rejects adds, reservations and inbound
    /// reads.
    Back,
}

/// A segmented byte queue with zero-copy transfer between buffers.
///
/// # Examples
///
/// ```
/// use chainbuf::ChainBuf;
///
/// let mut buf = ChainBuf::new();
/// buf.add(b"hello").unwrap();
/// assert_eq!(buf.len(), 5);
///
/// let mut out = [0u8; 8];
/// let n = buf.remove(&mut out).unwrap();
/// assert_eq!(&out[..n], b"hello");
/// assert!(buf.is_empty());
/// ```
pub struct ChainBuf {
    pub(crate) chain: VecDeque<Segment>,
    pub(crate) total_len: usize,
    /// Bumped by every structural mutation; cursors minted under an older
    /// generation are refused.
    pub(crate) generation: u64,
    /// Uncommitted reservation length in the tail segment. Never counted
    /// in `total_len`.
    reserved: usize,
    frozen_front: bool,
    frozen_back: bool,
    pub(crate) cb: CallbackSet,
    pub(crate) defer_ctx: Option<DeferCtx>,
}

impl ChainBuf {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: VecDeque::new(),
            total_len: 0,
            generation: 0,
            reserved: 0,
            frozen_front: false,
            frozen_back: false,
            cb: CallbackSet::default(),
            defer_ctx: None,
        }
    }

    /// Number of live bytes in the buffer.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.total_len
    }

    /// Returns true if the buffer holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Number of bytes readable from the head without crossing a segment
    /// boundary.
    #[must_use]
    pub fn contiguous_space(&self) -> usize {
        self.chain.front().map_or(0, Segment::len)
    }

    /// Number of segments in the chain, including an empty staging tail.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.chain.len()
    }

    /// Disallows mutations at the given end. Rejected operations fail with
    /// [`ErrorKind::Frozen`] and leave the buffer unchanged.
    pub fn freeze(&mut self, end: End) {
        match end {
            End::Front => self.frozen_front = true,
            End::Back => self.frozen_back = true,
        }
    }

    /// Re-allows mutations at the given end.
    pub fn unfreeze(&mut self, end: End) {
        match end {
            End::Front => self.frozen_front = false,
            End::Back => self.frozen_back = false,
        }
    }

    /// Returns true if the given end is frozen.
    #[must_use]
    pub fn is_frozen(&self, end: End) -> bool {
        match end {
            End::Front => self.frozen_front,
            End::Back => self.frozen_back,
        }
    }

    pub(crate) fn check_unfrozen_front(&self) -> Result<()> {
        if self.frozen_front {
            return Err(Error::new(ErrorKind::Frozen).with_context("front of buffer is frozen"));
        }
        Ok(())
    }

    pub(crate) fn check_unfrozen_back(&self) -> Result<()> {
        if self.frozen_back {
            return Err(Error::new(ErrorKind::Frozen).with_context("back of buffer is frozen"));
        }
        Ok(())
    }

    /// Drops an outstanding reservation, trimming its zero-fill from the
    /// tail block. Every append-side mutation calls this first so the
    /// reservation slice can never alias relocated storage.
    pub(crate) fn invalidate_reservation(&mut self) {
        if self.reserved > 0 {
            if let Some(tail) = self.chain.back_mut() {
                tail.trim_reservation();
            }
            self.reserved = 0;
        }
    }

    pub(crate) fn drop_empty_tail(&mut self) {
        while self.chain.back().is_some_and(Segment::is_empty) {
            self.chain.pop_back();
        }
    }

    /// Guarantees the tail segment has at least `n` bytes of contiguous
    /// spare capacity, reallocating an empty tail or chaining a new segment
    /// per the growth policy.
    fn ensure_tail_spare(&mut self, n: usize) -> Result<()> {
        if let Some(tail) = self.chain.back_mut() {
            if tail.spare() >= n {
                return Ok(());
            }
            if tail.is_owned() && tail.is_empty() {
                tail.reset();
                return tail.grow_to(round_capacity(n));
            }
        }
        let seg = Segment::with_capacity(round_capacity(n))?;
        self.chain.push_back(seg);
        Ok(())
    }

    /// Pre-allocates spare capacity for at least `n` more bytes without
    /// changing the buffer contents or length.
    pub fn expand(&mut self, n: usize) -> Result<()> {
        self.invalidate_reservation();
        self.ensure_tail_spare(n)
    }

    /// Appends `data` by copying it into the tail.
    ///
    /// Fails with [`ErrorKind::Frozen`] if the back is frozen and
    /// [`ErrorKind::OutOfMemory`] if allocation fails; either way the
    /// buffer is unchanged.
    pub fn add(&mut self, data: &[u8]) -> Result<()> {
        self.check_unfrozen_back()?;
        if data.is_empty() {
            return Ok(());
        }
        let orig = self.total_len;
        self.invalidate_reservation();
        // Allocate any overflow segment up front so failure leaves the
        // buffer untouched.
        let spare = self.chain.back().map_or(0, Segment::spare);
        let overflow = data.len().saturating_sub(spare);
        let new_seg = if overflow > 0 {
            Some(Segment::with_capacity(round_capacity(overflow))?)
        } else {
            None
        };
        let mut rest = data;
        if let Some(tail) = self.chain.back_mut() {
            let taken = tail.push_bytes(rest);
            rest = &rest[taken..];
        }
        if let Some(mut seg) = new_seg {
            let taken = seg.push_bytes(rest);
            debug_assert!(taken == rest.len());
            self.chain.push_back(seg);
        }
        self.total_len += data.len();
        self.generation += 1;
        self.note_mutation(orig, data.len(), 0);
        Ok(())
    }

    /// Inserts `data` before the current head, using the head segment's
    /// leading slack when it fits.
    pub fn prepend(&mut self, data: &[u8]) -> Result<()> {
        self.check_unfrozen_front()?;
        if data.is_empty() {
            return Ok(());
        }
        let orig = self.total_len;
        self.invalidate_reservation();
        let fits = self
            .chain
            .front()
            .is_some_and(|head| head.front_slack() >= data.len());
        if fits {
            let head = self.chain.front_mut().expect("head checked above");
            head.prepend_bytes(data);
        } else {
            let seg = Segment::for_prepend(round_capacity(data.len()), data)?;
            self.chain.push_front(seg);
        }
        self.total_len += data.len();
        self.generation += 1;
        self.note_mutation(orig, data.len(), 0);
        Ok(())
    }

    /// Moves every segment of `src` to the end of `self` without copying
    /// bytes. `src` is left empty.
    pub fn add_buffer(&mut self, src: &mut Self) -> Result<()> {
        self.check_unfrozen_back()?;
        src.check_unfrozen_front()?;
        let n = src.total_len;
        if n == 0 {
            return Ok(());
        }
        let dst_orig = self.total_len;
        self.invalidate_reservation();
        src.invalidate_reservation();
        self.drop_empty_tail();
        src.chain.retain(|seg| !seg.is_empty());
        self.chain.append(&mut src.chain);
        src.total_len = 0;
        src.generation += 1;
        self.total_len += n;
        self.generation += 1;
        src.note_mutation(n, 0, n);
        self.note_mutation(dst_orig, n, 0);
        Ok(())
    }

    /// Moves every segment of `src` before the current head of `self`
    /// without copying bytes. `src` is left empty.
    pub fn prepend_buffer(&mut self, src: &mut Self) -> Result<()> {
        self.check_unfrozen_front()?;
        src.check_unfrozen_front()?;
        let n = src.total_len;
        if n == 0 {
            return Ok(());
        }
        let dst_orig = self.total_len;
        self.invalidate_reservation();
        src.invalidate_reservation();
        src.chain.retain(|seg| !seg.is_empty());
        while let Some(seg) = src.chain.pop_back() {
            self.chain.push_front(seg);
        }
        src.total_len = 0;
        src.generation += 1;
        self.total_len += n;
        self.generation += 1;
        src.note_mutation(n, 0, n);
        self.note_mutation(dst_orig, n, 0);
        Ok(())
    }

    /// Transfers up to `n` bytes from the head of `self` to the tail of
    /// `dst`, relinking whole segments and splitting only the boundary
    /// segment. Returns the number of bytes transferred.
    pub fn remove_buffer(&mut self, dst: &mut Self, n: usize) -> Result<usize> {
        self.check_unfrozen_front()?;
        dst.check_unfrozen_back()?;
        let budget = n.min(self.total_len);
        if budget == 0 {
            return Ok(0);
        }
        let src_orig = self.total_len;
        let dst_orig = dst.total_len;
        self.invalidate_reservation();
        dst.invalidate_reservation();

        let mut moved: Vec<Segment> = Vec::new();
        let mut taken = 0;
        let split_result: Result<()> = loop {
            if taken == budget {
                break Ok(());
            }
            let Some(front) = self.chain.front_mut() else {
                break Ok(());
            };
            let remaining = budget - taken;
            if front.is_empty() {
                self.chain.pop_front();
                continue;
            }
            if front.len() <= remaining {
                taken += front.len();
                moved.push(self.chain.pop_front().expect("front checked above"));
                continue;
            }
            // Boundary segment: split the partial prefix.
            let prefix = if front.is_file() {
                match front.split_file_prefix(remaining) {
                    Ok(seg) => seg,
                    Err(e) => break Err(Error::io(e).with_context("splitting file segment")),
                }
            } else {
                let mut seg = match Segment::with_capacity(round_capacity(remaining)) {
                    Ok(seg) => seg,
                    Err(e) => break Err(e),
                };
                seg.push_bytes(&front.data()[..remaining]);
                front.advance(remaining);
                seg
            };
            taken += remaining;
            moved.push(prefix);
            break Ok(());
        };

        if let Err(e) = split_result {
            // The split was the last step; put the whole segments back.
            for seg in moved.into_iter().rev() {
                self.chain.push_front(seg);
            }
            return Err(e);
        }

        dst.drop_empty_tail();
        dst.chain.extend(moved);
        self.total_len -= taken;
        self.generation += 1;
        dst.total_len += taken;
        dst.generation += 1;
        self.note_mutation(src_orig, 0, taken);
        dst.note_mutation(dst_orig, taken, 0);
        Ok(taken)
    }

    /// Appends an externally owned region without copying. `cleanup` runs
    /// exactly once when the last byte is drained or the buffer is dropped.
    ///
    /// The resulting segment is pinned: it cannot be written into, and
    /// [`ChainBuf::pullup`] will not copy out of it.
    pub fn add_reference<T, F>(&mut self, data: T, cleanup: F) -> Result<()>
    where
        T: AsRef<[u8]> + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.check_unfrozen_back()?;
        let len = data.as_ref().len();
        if len == 0 {
            cleanup();
            return Ok(());
        }
        let orig = self.total_len;
        self.invalidate_reservation();
        self.drop_empty_tail();
        self.chain
            .push_back(Segment::external(Box::new(data), Some(Box::new(cleanup))));
        self.total_len += len;
        self.generation += 1;
        self.note_mutation(orig, len, 0);
        Ok(())
    }

    /// Appends `length` bytes of `file` starting at `offset`. Ownership of
    /// the handle transfers to the buffer; it is closed exactly once when
    /// the segment is destroyed.
    ///
    /// File segments are opaque to [`ChainBuf::pullup`],
    /// [`ChainBuf::remove`] and scanning; they are emitted by
    /// [`ChainBuf::write_to`](ChainBuf::write_to).
    pub fn add_file(&mut self, file: File, offset: u64, length: usize) -> Result<()> {
        self.check_unfrozen_back()?;
        if length == 0 {
            return Ok(());
        }
        let orig = self.total_len;
        self.invalidate_reservation();
        self.drop_empty_tail();
        self.chain.push_back(Segment::file(file, offset, length));
        self.total_len += length;
        self.generation += 1;
        self.note_mutation(orig, length, 0);
        Ok(())
    }

    /// Appends formatted text. Returns the number of bytes appended.
    ///
    /// The text is staged in a scratch string so the append is atomic and
    /// produces a single change notification.
    pub fn add_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        use std::fmt::Write as _;
        let mut scratch = String::new();
        scratch
            .write_fmt(args)
            .map_err(|_| Error::new(ErrorKind::BadArgument).with_context("formatting failed"))?;
        self.add(scratch.as_bytes())?;
        Ok(scratch.len())
    }

    /// Reserves `n` contiguous writable bytes in the tail and returns them.
    ///
    /// The reserved bytes are zero-initialized, invisible to readers, and
    /// not counted in [`ChainBuf::len`] until
    /// [`commit_space`](ChainBuf::commit_space) marks a prefix of them
    /// live. A second `reserve_space`, or any other append-side mutation,
    /// invalidates an uncommitted reservation.
    pub fn reserve_space(&mut self, n: usize) -> Result<&mut [u8]> {
        self.check_unfrozen_back()?;
        self.invalidate_reservation();
        self.ensure_tail_spare(n)?;
        self.reserved = n;
        let tail = self.chain.back_mut().expect("tail exists after ensure");
        Ok(tail.open_reservation(n))
    }

    /// Marks the first `k` reserved bytes live and closes the reservation.
    ///
    /// Fails with [`ErrorKind::BadArgument`] if `k` exceeds the
    /// outstanding reservation.
    pub fn commit_space(&mut self, k: usize) -> Result<()> {
        self.check_unfrozen_back()?;
        if k > self.reserved {
            return Err(
                Error::new(ErrorKind::BadArgument).with_context("commit exceeds reservation")
            );
        }
        if self.reserved == 0 {
            return Ok(());
        }
        let orig = self.total_len;
        let tail = self.chain.back_mut().expect("reservation implies tail");
        tail.commit(k);
        self.reserved = 0;
        if k > 0 {
            self.total_len += k;
            self.generation += 1;
            self.note_mutation(orig, k, 0);
        }
        Ok(())
    }

    /// Copies up to `dst.len()` bytes from the head into `dst` and drains
    /// them. Returns the number of bytes copied.
    pub fn remove(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.check_unfrozen_front()?;
        let n = dst.len().min(self.total_len);
        if n == 0 {
            return Ok(0);
        }
        let mut scanned = 0;
        for seg in &self.chain {
            if scanned >= n {
                break;
            }
            if seg.is_file() {
                return Err(Error::new(ErrorKind::UnsupportedSegment)
                    .with_context("remove across a file segment"));
            }
            scanned += seg.len();
        }
        let orig = self.total_len;
        self.copy_head(&mut dst[..n]);
        self.drain_inner(n);
        self.note_mutation(orig, 0, n);
        Ok(n)
    }

    /// Copies the first `dst.len()` bytes of the stream into `dst` without
    /// draining. Callers guarantee the range is in memory.
    pub(crate) fn copy_head(&self, dst: &mut [u8]) {
        let mut copied = 0;
        for seg in &self.chain {
            if copied == dst.len() {
                break;
            }
            let take = seg.len().min(dst.len() - copied);
            dst[copied..copied + take].copy_from_slice(&seg.data()[..take]);
            copied += take;
        }
        debug_assert!(copied == dst.len());
    }

    /// Discards up to `n` bytes from the head. Draining more than the
    /// buffer holds drains everything and succeeds.
    pub fn drain(&mut self, n: usize) -> Result<()> {
        self.check_unfrozen_front()?;
        let n = n.min(self.total_len);
        if n == 0 {
            return Ok(());
        }
        let orig = self.total_len;
        self.drain_inner(n);
        self.note_mutation(orig, 0, n);
        Ok(())
    }

    /// Removes `n` bytes from the front of the chain. Callers have already
    /// checked gates and clamped `n` to the buffer length.
    pub(crate) fn drain_inner(&mut self, mut n: usize) {
        debug_assert!(n <= self.total_len);
        self.total_len -= n;
        self.generation += 1;
        while n > 0 {
            let keep_for_reuse = self.chain.len() == 1;
            let front = self.chain.front_mut().expect("drain within length");
            if front.len() <= n {
                n -= front.len();
                if keep_for_reuse && front.is_owned() {
                    let len = front.len();
                    front.advance(len);
                    front.collapse_front();
                } else {
                    self.chain.pop_front();
                }
            } else {
                front.advance(n);
                n = 0;
            }
        }
    }

    /// Makes the first `n` bytes contiguous and returns them.
    ///
    /// Idempotent: if the head segment already holds `n` bytes no copy
    /// occurs. Fails with [`ErrorKind::UnsupportedSegment`] if the range
    /// would copy out of a pinned or file segment, and
    /// [`ErrorKind::BadArgument`] if `n` exceeds the buffer length.
    pub fn pullup(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.total_len {
            return Err(
                Error::new(ErrorKind::BadArgument).with_context("pullup beyond buffer length")
            );
        }
        if n == 0 {
            return Ok(&[]);
        }
        if self.chain.front().map_or(0, Segment::len) >= n {
            return Ok(&self.chain.front().expect("head holds bytes").data()[..n]);
        }
        let mut scanned = 0;
        for seg in &self.chain {
            if scanned >= n {
                break;
            }
            if !seg.is_owned() {
                return Err(Error::new(ErrorKind::UnsupportedSegment)
                    .with_context("pullup across a pinned or file segment"));
            }
            scanned += seg.len();
        }
        let mut merged = Segment::with_capacity(round_capacity(n))?;
        let mut remaining = n;
        while remaining > 0 {
            let front = self.chain.front_mut().expect("pullup within length");
            let take = front.len().min(remaining);
            merged.push_bytes(&front.data()[..take]);
            front.advance(take);
            remaining -= take;
            let keep_staging = self.chain.len() == 1 && remaining == 0;
            if self.chain.front().is_some_and(Segment::is_empty) && !keep_staging {
                self.chain.pop_front();
            }
        }
        self.chain.push_front(merged);
        self.generation += 1;
        Ok(&self.chain.front().expect("merged head").data()[..n])
    }

    /// Makes the entire buffer contiguous and returns it.
    pub fn pullup_all(&mut self) -> Result<&[u8]> {
        let n = self.total_len;
        self.pullup(n)
    }

    /// Legacy length accessor.
    #[deprecated(since = "0.1.0", note = "use `len`")]
    #[must_use]
    pub fn get_length(&self) -> usize {
        self.len()
    }

    /// Legacy whole-buffer byte accessor.
    #[deprecated(since = "0.1.0", note = "use `pullup_all`")]
    pub fn get_data(&mut self) -> Result<&[u8]> {
        self.pullup_all()
    }
}

impl Default for ChainBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChainBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuf")
            .field("len", &self.total_len)
            .field("segments", &self.chain.len())
            .field("frozen_front", &self.frozen_front)
            .field("frozen_back", &self.frozen_back)
            .finish_non_exhaustive()
    }
}

/// Streaming formatted append. Each `write_str` is one `add`; use
/// [`ChainBuf::add_fmt`] for a single coalesced append.
impl fmt::Write for ChainBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.add(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn drain_to_vec(buf: &mut ChainBuf) -> Vec<u8> {
        let mut out = vec![0u8; buf.len()];
        let n = buf.remove(&mut out).expect("remove");
        out.truncate(n);
        out
    }

    #[test]
    fn add_remove_roundtrip() {
        init_test("add_remove_roundtrip");
        let mut buf = ChainBuf::new();
        buf.add(b"hello").expect("add");
        let mut out = [0u8; 10];
        let n = buf.remove(&mut out).expect("remove");
        crate::assert_with_log!(n == 5, "removed", 5, n);
        let ok = &out[..5] == b"hello";
        crate::assert_with_log!(ok, "bytes", b"hello", &out[..5]);
        let len = buf.len();
        crate::assert_with_log!(len == 0, "len", 0, len);
        crate::test_complete!("add_remove_roundtrip");
    }

    #[test]
    fn length_tracks_adds_and_drains() {
        init_test("length_tracks_adds_and_drains");
        let mut buf = ChainBuf::new();
        buf.add(b"abcdef").expect("add");
        buf.add(&[b'x'; 1000]).expect("add");
        buf.drain(3).expect("drain");
        let mut out = [0u8; 10];
        let removed = buf.remove(&mut out).expect("remove");
        let expect = 6 + 1000 - 3 - removed;
        let len = buf.len();
        crate::assert_with_log!(len == expect, "len", expect, len);
        crate::test_complete!("length_tracks_adds_and_drains");
    }

    #[test]
    fn drain_more_than_length_drains_everything() {
        init_test("drain_more_than_length_drains_everything");
        let mut buf = ChainBuf::new();
        buf.add(b"abc").expect("add");
        buf.drain(100).expect("drain");
        let len = buf.len();
        crate::assert_with_log!(len == 0, "len", 0, len);
        crate::test_complete!("drain_more_than_length_drains_everything");
    }

    #[test]
    fn add_buffer_moves_segments_without_copy() {
        init_test("add_buffer_moves_segments_without_copy");
        let mut src = ChainBuf::new();
        let chunk = vec![0xAB_u8; 32 * 1024];
        for _ in 0..32 {
            src.add(&chunk).expect("add");
        }
        let src_segments = src.segment_count();
        crate::assert_with_log!(src_segments == 32, "src segments", 32, src_segments);

        let mut dst = ChainBuf::new();
        dst.add_buffer(&mut src).expect("add_buffer");
        let src_len = src.len();
        crate::assert_with_log!(src_len == 0, "src emptied", 0, src_len);
        let dst_len = dst.len();
        crate::assert_with_log!(dst_len == 1024 * 1024, "dst length", 1024 * 1024, dst_len);
        let dst_segments = dst.segment_count();
        crate::assert_with_log!(dst_segments == 32, "dst segments relinked", 32, dst_segments);
        crate::test_complete!("add_buffer_moves_segments_without_copy");
    }

    #[test]
    fn add_buffer_preserves_byte_stream() {
        init_test("add_buffer_preserves_byte_stream");
        let mut dst = ChainBuf::new();
        dst.add(b"head-").expect("add");
        let mut src = ChainBuf::new();
        src.add(b"tail").expect("add");
        dst.add_buffer(&mut src).expect("add_buffer");
        let bytes = drain_to_vec(&mut dst);
        let ok = bytes == b"head-tail";
        crate::assert_with_log!(ok, "stream", b"head-tail", bytes);
        crate::test_complete!("add_buffer_preserves_byte_stream");
    }

    #[test]
    fn prepend_uses_head_slack() {
        init_test("prepend_uses_head_slack");
        let mut buf = ChainBuf::new();
        buf.add(b" world").expect("add");
        buf.prepend(b"hello").expect("prepend");
        let segments = buf.segment_count();
        crate::assert_with_log!(segments == 2, "segments", 2, segments);
        // The prepend head keeps slack for the next prepend.
        buf.prepend(b">> ").expect("prepend");
        let segments = buf.segment_count();
        crate::assert_with_log!(segments == 2, "slack reused", 2, segments);
        let bytes = drain_to_vec(&mut buf);
        let ok = bytes == b">> hello world";
        crate::assert_with_log!(ok, "stream", b">> hello world", bytes);
        crate::test_complete!("prepend_uses_head_slack");
    }

    #[test]
    fn prepend_buffer_moves_to_front() {
        init_test("prepend_buffer_moves_to_front");
        let mut dst = ChainBuf::new();
        dst.add(b"body").expect("add");
        let mut src = ChainBuf::new();
        src.add(b"header:").expect("add");
        dst.prepend_buffer(&mut src).expect("prepend_buffer");
        let src_len = src.len();
        crate::assert_with_log!(src_len == 0, "src emptied", 0, src_len);
        let bytes = drain_to_vec(&mut dst);
        let ok = bytes == b"header:body";
        crate::assert_with_log!(ok, "stream", b"header:body", bytes);
        crate::test_complete!("prepend_buffer_moves_to_front");
    }

    #[test]
    fn remove_buffer_relinks_and_splits_boundary() {
        init_test("remove_buffer_relinks_and_splits_boundary");
        let mut src = ChainBuf::new();
        src.add_reference(b"0123456789".to_vec(), || {}).expect("add");
        src.add_reference(b"abcdefghij".to_vec(), || {}).expect("add");
        let mut dst = ChainBuf::new();
        let n = src.remove_buffer(&mut dst, 13).expect("remove_buffer");
        crate::assert_with_log!(n == 13, "transferred", 13, n);
        let dst_bytes = drain_to_vec(&mut dst);
        let ok = dst_bytes == b"0123456789abc";
        crate::assert_with_log!(ok, "dst stream", b"0123456789abc", dst_bytes);
        let src_bytes = drain_to_vec(&mut src);
        let ok = src_bytes == b"defghij";
        crate::assert_with_log!(ok, "src remainder", b"defghij", src_bytes);
        crate::test_complete!("remove_buffer_relinks_and_splits_boundary");
    }

    #[test]
    fn reserve_commit_makes_bytes_visible() {
        init_test("reserve_commit_makes_bytes_visible");
        let mut buf = ChainBuf::new();
        let space = buf.reserve_space(4096).expect("reserve");
        let cap = space.len();
        crate::assert_with_log!(cap == 4096, "reserved", 4096, cap);
        space[..10].copy_from_slice(b"0123456789");
        let len = buf.len();
        crate::assert_with_log!(len == 0, "invisible before commit", 0, len);
        buf.commit_space(10).expect("commit");
        let len = buf.len();
        crate::assert_with_log!(len == 10, "visible after commit", 10, len);
        let mut out = [0u8; 10];
        let n = buf.remove(&mut out).expect("remove");
        crate::assert_with_log!(n == 10, "removed", 10, n);
        let ok = &out == b"0123456789";
        crate::assert_with_log!(ok, "bytes", b"0123456789", &out);
        crate::test_complete!("reserve_commit_makes_bytes_visible");
    }

    #[test]
    fn repeated_reserve_returns_same_region() {
        init_test("repeated_reserve_returns_same_region");
        let mut buf = ChainBuf::new();
        buf.add(b"seed").expect("add");
        let first = buf.reserve_space(64).expect("reserve");
        first[0] = 0xEE;
        let second = buf.reserve_space(64).expect("reserve again");
        // Same region: the previous zero-fill is re-applied, nothing leaked
        // into the readable bytes.
        let len = second.len();
        crate::assert_with_log!(len == 64, "len", 64, len);
        let zeroed = second[0] == 0;
        crate::assert_with_log!(zeroed, "re-zeroed", 0u8, second[0]);
        let buf_len = buf.len();
        crate::assert_with_log!(buf_len == 4, "length unchanged", 4, buf_len);
        crate::test_complete!("repeated_reserve_returns_same_region");
    }

    #[test]
    fn commit_more_than_reserved_is_rejected() {
        init_test("commit_more_than_reserved_is_rejected");
        let mut buf = ChainBuf::new();
        buf.reserve_space(16).expect("reserve");
        let err = buf.commit_space(17).expect_err("over-commit");
        let kind = err.kind();
        crate::assert_with_log!(
            kind == crate::ErrorKind::BadArgument,
            "kind",
            crate::ErrorKind::BadArgument,
            kind
        );
        // The reservation survives a rejected commit.
        buf.commit_space(16).expect("commit");
        let len = buf.len();
        crate::assert_with_log!(len == 16, "len", 16, len);
        crate::test_complete!("commit_more_than_reserved_is_rejected");
    }

    #[test]
    fn intervening_add_invalidates_reservation() {
        init_test("intervening_add_invalidates_reservation");
        let mut buf = ChainBuf::new();
        buf.reserve_space(32).expect("reserve");
        buf.add(b"interloper").expect("add");
        let err = buf.commit_space(1).expect_err("stale commit");
        let kind = err.kind();
        crate::assert_with_log!(
            kind == crate::ErrorKind::BadArgument,
            "kind",
            crate::ErrorKind::BadArgument,
            kind
        );
        let bytes = drain_to_vec(&mut buf);
        let ok = bytes == b"interloper";
        crate::assert_with_log!(ok, "stream intact", b"interloper", bytes);
        crate::test_complete!("intervening_add_invalidates_reservation");
    }

    #[test]
    fn freeze_front_rejects_drains() {
        init_test("freeze_front_rejects_drains");
        let mut buf = ChainBuf::new();
        buf.add(b"x").expect("add");
        buf.freeze(End::Front);
        let err = buf.drain(1).expect_err("frozen drain");
        crate::assert_with_log!(err.is_frozen(), "frozen", true, err.is_frozen());
        let len = buf.len();
        crate::assert_with_log!(len == 1, "len unchanged", 1, len);
        buf.unfreeze(End::Front);
        buf.drain(1).expect("drain");
        let len = buf.len();
        crate::assert_with_log!(len == 0, "len", 0, len);
        crate::test_complete!("freeze_front_rejects_drains");
    }

    #[test]
    fn freeze_back_rejects_appends() {
        init_test("freeze_back_rejects_appends");
        let mut buf = ChainBuf::new();
        buf.freeze(End::Back);
        let err = buf.add(b"nope").expect_err("frozen add");
        crate::assert_with_log!(err.is_frozen(), "frozen add", true, err.is_frozen());
        let err = buf.reserve_space(16).expect_err("frozen reserve");
        crate::assert_with_log!(err.is_frozen(), "frozen reserve", true, err.is_frozen());
        let len = buf.len();
        crate::assert_with_log!(len == 0, "len unchanged", 0, len);
        buf.unfreeze(End::Back);
        buf.add(b"ok").expect("add");
        let len = buf.len();
        crate::assert_with_log!(len == 2, "len", 2, len);
        crate::test_complete!("freeze_back_rejects_appends");
    }

    #[test]
    fn freeze_front_still_allows_appends() {
        init_test("freeze_front_still_allows_appends");
        let mut buf = ChainBuf::new();
        buf.freeze(End::Front);
        buf.add(b"appended").expect("add with frozen front");
        let len = buf.len();
        crate::assert_with_log!(len == 8, "len", 8, len);
        crate::test_complete!("freeze_front_still_allows_appends");
    }

    #[test]
    fn pullup_is_idempotent_and_preserves_stream() {
        init_test("pullup_is_idempotent_and_preserves_stream");
        let mut buf = ChainBuf::new();
        buf.add(&[b'a'; 300]).expect("add");
        buf.add(&[b'b'; 300]).expect("add");
        let seg_before = buf.segment_count();
        crate::assert_with_log!(seg_before >= 2, "segmented", ">= 2", seg_before);

        let first = buf.pullup(400).expect("pullup").to_vec();
        let again = buf.pullup(400).expect("pullup again").to_vec();
        let ok = first == again;
        crate::assert_with_log!(ok, "idempotent", true, ok);
        let len = buf.len();
        crate::assert_with_log!(len == 600, "length unchanged", 600, len);

        let mut expect = vec![b'a'; 300];
        expect.extend_from_slice(&[b'b'; 300]);
        let bytes = drain_to_vec(&mut buf);
        let ok = bytes == expect;
        crate::assert_with_log!(ok, "stream preserved", "300 a's then 300 b's", ok);
        crate::test_complete!("pullup_is_idempotent_and_preserves_stream");
    }

    #[test]
    fn pullup_refuses_pinned_range() {
        init_test("pullup_refuses_pinned_range");
        let mut buf = ChainBuf::new();
        buf.add(b"heap").expect("add");
        buf.add_reference(b"pinned".to_vec(), || {}).expect("add_reference");
        let err = buf.pullup(6).expect_err("pinned pullup");
        let kind = err.kind();
        crate::assert_with_log!(
            kind == crate::ErrorKind::UnsupportedSegment,
            "kind",
            crate::ErrorKind::UnsupportedSegment,
            kind
        );
        // Entirely within the head segment: no copy, no error.
        let head = buf.pullup(4).expect("head pullup");
        let ok = head == b"heap";
        crate::assert_with_log!(ok, "head bytes", b"heap", head);
        crate::test_complete!("pullup_refuses_pinned_range");
    }

    #[test]
    fn reference_cleanup_fires_once_on_drain() {
        init_test("reference_cleanup_fires_once_on_drain");
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in = Arc::clone(&fired);
        let mut buf = ChainBuf::new();
        buf.add_reference(b"external".to_vec(), move || {
            fired_in.fetch_add(1, Ordering::SeqCst);
        })
        .expect("add_reference");
        buf.drain(3).expect("partial drain");
        let count = fired.load(Ordering::SeqCst);
        crate::assert_with_log!(count == 0, "not yet released", 0, count);
        buf.drain(5).expect("final drain");
        let count = fired.load(Ordering::SeqCst);
        crate::assert_with_log!(count == 1, "released once", 1, count);
        crate::test_complete!("reference_cleanup_fires_once_on_drain");
    }

    #[test]
    fn reference_cleanup_fires_once_on_drop() {
        init_test("reference_cleanup_fires_once_on_drop");
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in = Arc::clone(&fired);
        let mut buf = ChainBuf::new();
        buf.add_reference(b"external".to_vec(), move || {
            fired_in.fetch_add(1, Ordering::SeqCst);
        })
        .expect("add_reference");
        drop(buf);
        let count = fired.load(Ordering::SeqCst);
        crate::assert_with_log!(count == 1, "released once", 1, count);
        crate::test_complete!("reference_cleanup_fires_once_on_drop");
    }

    #[test]
    fn add_fmt_appends_formatted_text() {
        init_test("add_fmt_appends_formatted_text");
        let mut buf = ChainBuf::new();
        let n = buf
            .add_fmt(format_args!("status={} code={}", "ok", 200))
            .expect("add_fmt");
        crate::assert_with_log!(n == 18, "appended", 18, n);
        let bytes = drain_to_vec(&mut buf);
        let ok = bytes == b"status=ok code=200";
        crate::assert_with_log!(ok, "text", b"status=ok code=200", bytes);
        crate::test_complete!("add_fmt_appends_formatted_text");
    }

    #[test]
    fn expand_preserves_content_and_length() {
        init_test("expand_preserves_content_and_length");
        let mut buf = ChainBuf::new();
        buf.add(b"payload").expect("add");
        buf.expand(64 * 1024).expect("expand");
        let len = buf.len();
        crate::assert_with_log!(len == 7, "length unchanged", 7, len);
        let bytes = drain_to_vec(&mut buf);
        let ok = bytes == b"payload";
        crate::assert_with_log!(ok, "content", b"payload", bytes);
        crate::test_complete!("expand_preserves_content_and_length");
    }

    #[test]
    fn contiguous_space_reports_head_run() {
        init_test("contiguous_space_reports_head_run");
        let mut buf = ChainBuf::new();
        let contiguous = buf.contiguous_space();
        crate::assert_with_log!(contiguous == 0, "empty", 0, contiguous);
        buf.add_reference(b"abc".to_vec(), || {}).expect("add");
        buf.add_reference(b"defg".to_vec(), || {}).expect("add");
        let contiguous = buf.contiguous_space();
        crate::assert_with_log!(contiguous == 3, "head run", 3, contiguous);
        crate::test_complete!("contiguous_space_reports_head_run");
    }

    #[test]
    fn drained_buffer_reuses_staging_segment() {
        init_test("drained_buffer_reuses_staging_segment");
        let mut buf = ChainBuf::new();
        buf.add(b"round one").expect("add");
        buf.drain(9).expect("drain");
        let segments = buf.segment_count();
        crate::assert_with_log!(segments == 1, "staging kept", 1, segments);
        buf.add(b"round two").expect("add");
        let segments = buf.segment_count();
        crate::assert_with_log!(segments == 1, "reused", 1, segments);
        let bytes = drain_to_vec(&mut buf);
        let ok = bytes == b"round two";
        crate::assert_with_log!(ok, "content", b"round two", bytes);
        crate::test_complete!("drained_buffer_reuses_staging_segment");
    }
}
