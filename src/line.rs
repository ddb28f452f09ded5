//! Line extraction with four end-of-line dialects.

use crate::buffer::ChainBuf;
use crate::error::Result;

/// End-of-line dialects understood by [`ChainBuf::read_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolStyle {
    /// The longest run of `\r`/`\n` bytes terminates the line and is
    /// consumed whole. A run still touching the end of the readable data
    /// does not complete a line: more terminator bytes could arrive.
    Any,
    /// An optional `\r` followed by a single `\n`; both are consumed.
    Crlf,
    /// Exactly `\r\n`; both are consumed.
    CrlfStrict,
    /// A single `\n`; it is consumed. A preceding `\r` stays in the line.
    Lf,
}

impl ChainBuf {
    /// Extracts the next complete line, excluding its terminator, and
    /// drains it together with the terminator.
    ///
    /// Returns `Ok(None)` with no mutation when the buffer holds no
    /// complete line yet; callers treat that as "wait for more bytes",
    /// not as an error. Scanning covers the in-memory prefix of the
    /// buffer; a file segment ends the scannable region.
    pub fn read_line(&mut self, style: EolStyle) -> Result<Option<Vec<u8>>> {
        self.check_unfrozen_front()?;
        let Some((line_len, eol_len)) = self.find_line(style) else {
            return Ok(None);
        };
        let orig = self.total_len;
        let mut line = vec![0u8; line_len];
        self.copy_head(&mut line);
        self.drain_inner(line_len + eol_len);
        self.note_mutation(orig, 0, line_len + eol_len);
        Ok(Some(line))
    }

    /// Locates the next terminator. Returns `(line_len, eol_len)`.
    fn find_line(&self, style: EolStyle) -> Option<(usize, usize)> {
        let bytes = self
            .chain
            .iter()
            .take_while(|seg| !seg.is_file())
            .flat_map(|seg| seg.data().iter().copied());
        match style {
            EolStyle::Lf => {
                for (i, b) in bytes.enumerate() {
                    if b == b'\n' {
                        return Some((i, 1));
                    }
                }
                None
            }
            EolStyle::Crlf => {
                let mut prev = None;
                for (i, b) in bytes.enumerate() {
                    if b == b'\n' {
                        return if prev == Some(b'\r') {
                            Some((i - 1, 2))
                        } else {
                            Some((i, 1))
                        };
                    }
                    prev = Some(b);
                }
                None
            }
            EolStyle::CrlfStrict => {
                let mut prev = None;
                for (i, b) in bytes.enumerate() {
                    if b == b'\n' && prev == Some(b'\r') {
                        return Some((i - 1, 2));
                    }
                    prev = Some(b);
                }
                None
            }
            EolStyle::Any => {
                let mut run_start = None;
                for (i, b) in bytes.enumerate() {
                    let terminator = b == b'\r' || b == b'\n';
                    match run_start {
                        None if terminator => run_start = Some(i),
                        Some(start) if !terminator => return Some((start, i - start)),
                        _ => {}
                    }
                }
                // Either no terminator, or a run still touching the end of
                // the readable data.
                None
            }
        }
    }
}
