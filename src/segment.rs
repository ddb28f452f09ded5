//! Chain segments: the storage units of a [`ChainBuf`](crate::ChainBuf).
//!
//! A segment is a contiguous byte extent with a drained prefix (`misalign`)
//! and a live length (`off`); the live window is `[misalign, misalign + off)`.
//! Storage comes in three kinds:
//!
//! - **Owned**: a heap block (`Vec<u8>`). The vec length is the initialized
//!   high-water mark and equals `misalign + off` except while a reservation
//!   is open at the tail.
//! - **External**: a pinned, immutable region owned elsewhere, released
//!   through a cleanup hook that runs exactly once when the segment drops.
//! - **File**: a byte range of an owned file handle, closed exactly once
//!   when the segment drops. Opaque to in-memory readers.

use crate::error::{Error, ErrorKind, Result};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// Minimum capacity of a freshly allocated owned segment.
pub(crate) const MIN_CAPACITY: usize = 256;

/// Rounds a requested size up to the allocation granularity: the next power
/// of two, clamped below by [`MIN_CAPACITY`].
pub(crate) fn round_capacity(n: usize) -> usize {
    n.max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .unwrap_or(n)
}

/// A pinned region owned outside the buffer.
pub(crate) struct ExternalRegion {
    data: Box<dyn AsRef<[u8]> + Send>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for ExternalRegion {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// A byte range of an owned file.
pub(crate) struct FileRegion {
    file: File,
    offset: u64,
}

pub(crate) enum Storage {
    Owned(Vec<u8>),
    External(ExternalRegion),
    File(FileRegion),
}

/// One link of the buffer chain.
pub(crate) struct Segment {
    storage: Storage,
    /// Drained prefix within the storage.
    misalign: usize,
    /// Live bytes following `misalign`.
    off: usize,
}

impl Segment {
    /// Allocates an empty owned segment with at least `capacity` bytes.
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self> {
        let mut vec = Vec::new();
        vec.try_reserve_exact(capacity)
            .map_err(|_| Error::new(ErrorKind::OutOfMemory))?;
        Ok(Self {
            storage: Storage::Owned(vec),
            misalign: 0,
            off: 0,
        })
    }

    /// Builds an owned segment laid out for prepending: the live bytes sit
    /// at the end of the block so that later prepends can grow into the
    /// leading slack.
    pub(crate) fn for_prepend(capacity: usize, data: &[u8]) -> Result<Self> {
        debug_assert!(capacity >= data.len());
        let mut vec = Vec::new();
        vec.try_reserve_exact(capacity)
            .map_err(|_| Error::new(ErrorKind::OutOfMemory))?;
        vec.resize(capacity - data.len(), 0);
        vec.extend_from_slice(data);
        Ok(Self {
            storage: Storage::Owned(vec),
            misalign: capacity - data.len(),
            off: data.len(),
        })
    }

    /// Wraps an externally owned region. `cleanup` runs exactly once when
    /// the segment is destroyed.
    pub(crate) fn external(
        data: Box<dyn AsRef<[u8]> + Send>,
        cleanup: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        let len = (*data).as_ref().len();
        Self {
            storage: Storage::External(ExternalRegion { data, cleanup }),
            misalign: 0,
            off: len,
        }
    }

    /// Wraps `length` bytes of `file` starting at `offset`. The segment owns
    /// the handle and closes it on drop.
    pub(crate) fn file(file: File, offset: u64, length: usize) -> Self {
        Self {
            storage: Storage::File(FileRegion { file, offset }),
            misalign: 0,
            off: length,
        }
    }

    /// Live byte count.
    pub(crate) fn len(&self) -> usize {
        self.off
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.off == 0
    }

    pub(crate) fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub(crate) fn is_file(&self) -> bool {
        matches!(self.storage, Storage::File(_))
    }

    /// The live bytes, for in-memory storage. Empty for file segments,
    /// whose bytes are only reachable through [`Segment::file_read_at`].
    pub(crate) fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(vec) => &vec[self.misalign..self.misalign + self.off],
            Storage::External(region) => {
                &(*region.data).as_ref()[self.misalign..self.misalign + self.off]
            }
            Storage::File(_) => &[],
        }
    }

    /// Writable capacity remaining behind the live bytes. Zero for pinned
    /// and file segments.
    pub(crate) fn spare(&self) -> usize {
        match &self.storage {
            Storage::Owned(vec) => vec.capacity() - vec.len(),
            _ => 0,
        }
    }

    /// Drained leading slack a prepend may grow into. Zero for pinned and
    /// file segments.
    pub(crate) fn front_slack(&self) -> usize {
        match &self.storage {
            Storage::Owned(_) => self.misalign,
            _ => 0,
        }
    }

    /// Copies as much of `src` as fits into the spare tail capacity.
    /// Returns the number of bytes taken.
    pub(crate) fn push_bytes(&mut self, src: &[u8]) -> usize {
        let Storage::Owned(vec) = &mut self.storage else {
            return 0;
        };
        let n = src.len().min(vec.capacity() - vec.len());
        vec.extend_from_slice(&src[..n]);
        self.off += n;
        n
    }

    /// Copies `src` into the leading slack. Requires
    /// `src.len() <= front_slack()`.
    pub(crate) fn prepend_bytes(&mut self, src: &[u8]) {
        let Storage::Owned(vec) = &mut self.storage else {
            unreachable!("prepend into non-owned segment");
        };
        debug_assert!(src.len() <= self.misalign);
        self.misalign -= src.len();
        vec[self.misalign..self.misalign + src.len()].copy_from_slice(src);
        self.off += src.len();
    }

    /// Drains `n` bytes from the front of the live window. `n <= len()`.
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.off);
        self.misalign += n;
        self.off -= n;
    }

    /// Resets a fully drained owned segment for reuse, discarding any open
    /// reservation bytes past the live window.
    pub(crate) fn reset(&mut self) {
        let Storage::Owned(vec) = &mut self.storage else {
            unreachable!("reset of non-owned segment");
        };
        debug_assert!(self.off == 0);
        vec.clear();
        self.misalign = 0;
    }

    /// Like [`Segment::reset`], but preserves `reserved` trailing bytes of
    /// an open reservation by shifting them to the start of the block.
    pub(crate) fn collapse_front(&mut self) {
        let Storage::Owned(vec) = &mut self.storage else {
            unreachable!("collapse of non-owned segment");
        };
        debug_assert!(self.off == 0);
        vec.drain(..self.misalign);
        self.misalign = 0;
    }

    /// Grows an owned segment's block to at least `capacity` bytes.
    pub(crate) fn grow_to(&mut self, capacity: usize) -> Result<()> {
        let Storage::Owned(vec) = &mut self.storage else {
            unreachable!("grow of non-owned segment");
        };
        if let Some(additional) = capacity.checked_sub(vec.len()) {
            vec.try_reserve(additional)
                .map_err(|_| Error::new(ErrorKind::OutOfMemory))?;
        }
        Ok(())
    }

    /// Opens a zero-initialized reservation of `n` bytes past the live
    /// window and returns it. Requires `spare() >= n`.
    pub(crate) fn open_reservation(&mut self, n: usize) -> &mut [u8] {
        let Storage::Owned(vec) = &mut self.storage else {
            unreachable!("reservation in non-owned segment");
        };
        let start = self.misalign + self.off;
        debug_assert!(vec.len() == start);
        vec.resize(start + n, 0);
        &mut vec[start..start + n]
    }

    /// Discards any reservation bytes past the live window.
    pub(crate) fn trim_reservation(&mut self) {
        if let Storage::Owned(vec) = &mut self.storage {
            vec.truncate(self.misalign + self.off);
        }
    }

    /// Marks the first `k` reserved bytes live and discards the rest.
    pub(crate) fn commit(&mut self, k: usize) {
        let Storage::Owned(vec) = &mut self.storage else {
            unreachable!("commit into non-owned segment");
        };
        debug_assert!(self.misalign + self.off + k <= vec.len());
        self.off += k;
        vec.truncate(self.misalign + self.off);
    }

    /// Reads live file bytes starting `at` bytes into the live window.
    pub(crate) fn file_read_at(&self, at: usize, out: &mut [u8]) -> io::Result<usize> {
        let Storage::File(region) = &self.storage else {
            unreachable!("file read on non-file segment");
        };
        debug_assert!(at < self.off);
        let pos = region.offset + (self.misalign + at) as u64;
        region.file.read_at(out, pos)
    }

    /// Splits the first `n` live bytes of a file segment into a new segment
    /// sharing the underlying file (duplicated handle), advancing this one.
    pub(crate) fn split_file_prefix(&mut self, n: usize) -> io::Result<Self> {
        let Storage::File(region) = &self.storage else {
            unreachable!("file split on non-file segment");
        };
        debug_assert!(n < self.off);
        let dup = region.file.try_clone()?;
        let prefix = Self::file(dup, region.offset + self.misalign as u64, n);
        self.advance(n);
        Ok(prefix)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.storage {
            Storage::Owned(_) => "owned",
            Storage::External(_) => "external",
            Storage::File(_) => "file",
        };
        f.debug_struct("Segment")
            .field("kind", &kind)
            .field("misalign", &self.misalign)
            .field("off", &self.off)
            .finish()
    }
}
