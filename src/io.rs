//! The I/O bridge: moving bytes between a buffer and a reader/writer.
//!
//! Reads scatter into two fresh tail extents so one call can cross a
//! segment boundary; writes gather every in-memory head segment into a
//! single vectored call. File segments are emitted through positional
//! reads into a scratch block, the portable stand-in for the kernel
//! send-file path, which the safe API cannot express directly.
//!
//! Partial transfers are not errors: whatever was transferred is
//! reflected in the buffer (appended on the read side, drained on the
//! write side) and errors from the underlying calls surface verbatim as
//! [`ErrorKind::Io`](crate::ErrorKind::Io).

use crate::buffer::ChainBuf;
use crate::error::{Error, Result};
use crate::segment::{round_capacity, Segment};
use smallvec::SmallVec;
use std::io::{self, IoSlice, IoSliceMut, Read, Write};

/// Per-call read cap applied when the caller does not name one.
const DEFAULT_READ_SIZE: usize = 4096;

/// Scratch block size for emitting file segments.
const FILE_CHUNK: usize = 16 * 1024;

impl ChainBuf {
    /// Reads up to `howmuch` bytes (default 4096) from `reader` into the
    /// tail, scatter-reading into the tail's spare capacity plus one
    /// fresh segment.
    ///
    /// Returns the number of bytes appended; `Ok(0)` means end of input.
    /// On error the buffer keeps only the bytes of earlier calls; nothing
    /// from the failed call is appended.
    pub fn read_from<R: Read>(&mut self, reader: &mut R, howmuch: Option<usize>) -> Result<usize> {
        self.check_unfrozen_back()?;
        let want = howmuch.unwrap_or(DEFAULT_READ_SIZE);
        if want == 0 {
            return Ok(0);
        }
        let orig = self.total_len;
        self.invalidate_reservation();

        let spare = self.chain.back().map_or(0, Segment::spare);
        let first_len = spare.min(want);
        let second_len = want - first_len;
        let mut scratch = if second_len > 0 {
            Some(Segment::with_capacity(round_capacity(second_len))?)
        } else {
            None
        };

        let outcome = {
            let mut extents: SmallVec<[IoSliceMut<'_>; 2]> = SmallVec::new();
            if first_len > 0 {
                let tail = self.chain.back_mut().expect("spare implies a tail");
                extents.push(IoSliceMut::new(tail.open_reservation(first_len)));
            }
            if let Some(seg) = scratch.as_mut() {
                extents.push(IoSliceMut::new(seg.open_reservation(second_len)));
            }
            reader.read_vectored(&mut extents)
        };

        let n = match outcome {
            Ok(n) => n,
            Err(e) => {
                if first_len > 0 {
                    if let Some(tail) = self.chain.back_mut() {
                        tail.trim_reservation();
                    }
                }
                return Err(Error::io(e).with_context("scatter read"));
            }
        };

        let into_tail = n.min(first_len);
        if first_len > 0 {
            let tail = self.chain.back_mut().expect("spare implies a tail");
            tail.commit(into_tail);
        }
        if let Some(mut seg) = scratch {
            let into_scratch = n - into_tail;
            if into_scratch > 0 {
                seg.commit(into_scratch);
                self.chain.push_back(seg);
            }
        }
        if n > 0 {
            self.total_len += n;
            self.generation += 1;
            tracing::trace!(bytes = n, "buffer read");
            self.note_mutation(orig, n, 0);
        }
        Ok(n)
    }

    /// Writes the whole buffer to `writer`, draining what was written.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> Result<usize> {
        self.write_atmost_to(writer, usize::MAX)
    }

    /// Writes up to `at_most` bytes from the head to `writer`, draining
    /// exactly the written count.
    ///
    /// In-memory segments go out in one gather call per run; file segments
    /// are emitted through a scratch block. A short write is not an error.
    /// If the writer fails after earlier rounds transferred bytes, those
    /// bytes stay drained and the failure surfaces as
    /// [`ErrorKind::Io`](crate::ErrorKind::Io).
    pub fn write_atmost_to<W: Write>(&mut self, writer: &mut W, at_most: usize) -> Result<usize> {
        self.check_unfrozen_front()?;
        let budget = at_most.min(self.total_len);
        if budget == 0 {
            return Ok(0);
        }
        let orig = self.total_len;
        let mut written = 0;
        let outcome: io::Result<()> = loop {
            if written == budget {
                break Ok(());
            }
            let head_is_file = self.chain.front().is_some_and(Segment::is_file);
            let step = if head_is_file {
                self.emit_file_head(writer, budget - written)
            } else {
                self.gather_write_head(writer, budget - written)
            };
            match step {
                // The writer accepted nothing; report the partial count.
                Ok(0) => break Ok(()),
                Ok(n) => {
                    self.drain_inner(n);
                    written += n;
                }
                Err(e) => break Err(e),
            }
        };
        if written > 0 {
            tracing::trace!(bytes = written, budget, "buffer write");
            self.note_mutation(orig, 0, written);
        }
        match outcome {
            Ok(()) => Ok(written),
            Err(e) => Err(Error::io(e).with_context(format!("after writing {written} bytes"))),
        }
    }

    /// One gather-write over the run of in-memory segments at the head.
    fn gather_write_head<W: Write>(&self, writer: &mut W, limit: usize) -> io::Result<usize> {
        let mut slices: SmallVec<[IoSlice<'_>; 8]> = SmallVec::new();
        let mut queued = 0;
        for seg in &self.chain {
            if queued >= limit || seg.is_file() {
                break;
            }
            let take = seg.len().min(limit - queued);
            slices.push(IoSlice::new(&seg.data()[..take]));
            queued += take;
        }
        debug_assert!(!slices.is_empty());
        writer.write_vectored(&slices)
    }

    /// One scratch-block emission step for a file segment at the head.
    fn emit_file_head<W: Write>(&self, writer: &mut W, limit: usize) -> io::Result<usize> {
        let head = self.chain.front().expect("file segment at head");
        let take = head.len().min(limit).min(FILE_CHUNK);
        let mut scratch = vec![0u8; take];
        let got = head.file_read_at(0, &mut scratch)?;
        if got == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file segment shorter than declared",
            ));
        }
        writer.write(&scratch[..got])
    }
}
