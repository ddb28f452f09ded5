//! Cursors and forward substring search.
//!
//! A [`Cursor`] is a logical byte position with cached segment coordinates
//! for O(1) advancement. Cursors are stamped with the buffer generation at
//! mint time; any structural mutation bumps the generation and stale
//! cursors are refused with [`ErrorKind::BadArgument`].

use crate::buffer::ChainBuf;
use crate::error::{Error, ErrorKind, Result};

/// A stable logical position inside a buffer.
///
/// Minted by [`ChainBuf::cursor_head`], [`ChainBuf::cursor_at`] or
/// [`ChainBuf::search`]; invalidated by any mutation of the buffer.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pos: usize,
    /// Cached chain coordinates of `pos`.
    seg: usize,
    seg_off: usize,
    generation: u64,
}

impl Cursor {
    /// The logical byte offset from the buffer head.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ChainBuf {
    /// A cursor at position zero, stamped with the current generation.
    #[must_use]
    pub fn cursor_head(&self) -> Cursor {
        let mut cur = Cursor {
            pos: 0,
            seg: 0,
            seg_off: 0,
            generation: self.generation,
        };
        self.normalize(&mut cur);
        cur
    }

    /// Positions a cursor at an absolute offset from the head.
    ///
    /// Fails with [`ErrorKind::BadArgument`] past the end of the buffer.
    /// Position `len()` is the valid one-past-the-end cursor.
    pub fn cursor_at(&self, pos: usize) -> Result<Cursor> {
        if pos > self.total_len {
            return Err(Error::new(ErrorKind::BadArgument).with_context("cursor past end"));
        }
        let mut cur = self.cursor_head();
        self.walk(&mut cur, pos);
        Ok(cur)
    }

    /// Advances a cursor by `n` bytes using its cached coordinates.
    ///
    /// Fails with [`ErrorKind::BadArgument`] if the cursor is stale or the
    /// advance would pass the end of the buffer; the cursor is unchanged
    /// on failure.
    pub fn cursor_add(&self, cur: &mut Cursor, n: usize) -> Result<()> {
        self.check_generation(cur)?;
        if cur.pos + n > self.total_len {
            return Err(Error::new(ErrorKind::BadArgument).with_context("advance past end"));
        }
        self.walk(cur, n);
        Ok(())
    }

    /// Forward substring search for `needle`, starting at `start` (or at
    /// the head when `None`).
    ///
    /// Returns a cursor at the first byte of the lowest match at or after
    /// the start position, `Ok(None)` when there is no match, and
    /// [`ErrorKind::BadArgument`] when `start` is stale. Matches spanning
    /// segment boundaries are found; a file segment ends the searchable
    /// region.
    pub fn search(&self, needle: &[u8], start: Option<&Cursor>) -> Result<Option<Cursor>> {
        let mut cur = match start {
            Some(c) => {
                self.check_generation(c)?;
                *c
            }
            None => self.cursor_head(),
        };
        self.normalize(&mut cur);
        if needle.is_empty() {
            return Ok(Some(cur));
        }
        let first = needle[0];
        while cur.pos + needle.len() <= self.total_len {
            if cur.seg >= self.chain.len() {
                break;
            }
            let seg = &self.chain[cur.seg];
            if seg.is_file() {
                break;
            }
            match seg.data()[cur.seg_off..].iter().position(|&b| b == first) {
                None => {
                    cur.pos += seg.len() - cur.seg_off;
                    cur.seg += 1;
                    cur.seg_off = 0;
                    self.normalize(&mut cur);
                }
                Some(i) => {
                    let candidate = Cursor {
                        pos: cur.pos + i,
                        seg: cur.seg,
                        seg_off: cur.seg_off + i,
                        generation: self.generation,
                    };
                    if candidate.pos + needle.len() > self.total_len {
                        break;
                    }
                    match self.verify_at(candidate.seg, candidate.seg_off, needle) {
                        // File segment inside the window: nothing past it
                        // is searchable either.
                        None => break,
                        Some(true) => return Ok(Some(candidate)),
                        Some(false) => {
                            cur.pos = candidate.pos + 1;
                            cur.seg = candidate.seg;
                            cur.seg_off = candidate.seg_off + 1;
                            self.normalize(&mut cur);
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    fn check_generation(&self, cur: &Cursor) -> Result<()> {
        if cur.generation != self.generation {
            return Err(Error::new(ErrorKind::BadArgument).with_context("stale cursor"));
        }
        Ok(())
    }

    /// Advances `cur` by `n` bytes. Callers have bounds-checked `n`.
    fn walk(&self, cur: &mut Cursor, mut n: usize) {
        cur.pos += n;
        while n > 0 {
            let left = self.chain[cur.seg].len() - cur.seg_off;
            if n < left {
                cur.seg_off += n;
                return;
            }
            n -= left;
            cur.seg += 1;
            cur.seg_off = 0;
        }
        self.normalize(cur);
    }

    /// Restores the coordinate invariant: either `seg` addresses a byte
    /// (`seg_off < len`) or the cursor is one past the end.
    fn normalize(&self, cur: &mut Cursor) {
        while cur.seg < self.chain.len() && cur.seg_off >= self.chain[cur.seg].len() {
            cur.seg += 1;
            cur.seg_off = 0;
        }
    }

    /// Matches `needle` against the bytes starting at `(seg, off)`.
    /// `None` means the window ran into a file segment.
    fn verify_at(&self, mut seg: usize, mut off: usize, needle: &[u8]) -> Option<bool> {
        for &expect in needle {
            while off >= self.chain[seg].len() {
                seg += 1;
                off = 0;
            }
            let s = &self.chain[seg];
            if s.is_file() {
                return None;
            }
            if s.data()[off] != expect {
                return Some(false);
            }
            off += 1;
        }
        Some(true)
    }
}
