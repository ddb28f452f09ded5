//! Error types for chainbuf.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - A rejected mutation leaves the buffer unchanged
//! - "Not found" outcomes (failed search, incomplete line) are not errors;
//!   they are expressed as `None` by the operations that produce them

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Allocation failed; the operation left the buffer unchanged.
    OutOfMemory,
    /// Mutation rejected by a front/back freeze gate.
    Frozen,
    /// Invalid argument, e.g. committing more than was reserved or
    /// seeking a cursor past the end of the buffer.
    BadArgument,
    /// An I/O call failed; the buffer reflects any partial transfer that
    /// actually occurred.
    Io,
    /// The operation cannot cross a segment of this kind (e.g. a
    /// contiguity request over a file-backed segment).
    UnsupportedSegment,
}

/// The main error type for buffer operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error is a freeze-gate rejection.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        matches!(self.kind, ErrorKind::Frozen)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates an `Io` error wrapping an OS error.
    #[must_use]
    pub fn io(source: std::io::Error) -> Self {
        Self::new(ErrorKind::Io).with_source(source)
    }

    /// Returns the underlying I/O error, if this is an `Io` error.
    #[must_use]
    pub fn io_error(&self) -> Option<&std::io::Error> {
        self.source
            .as_deref()
            .and_then(|s| s.downcast_ref::<std::io::Error>())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io(e)
    }
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
