//! Chainbuf: a chained byte buffer for staged I/O.
//!
//! # Overview
//!
//! A [`ChainBuf`] is a segmented FIFO byte queue built for moving data
//! between application code and the operating system without needless
//! copying. Bytes append at the tail and drain from the head; whole
//! buffers transfer between each other by relinking segments; external
//! memory and file ranges join the stream by reference.
//!
//! # Core Guarantees
//!
//! - **Zero-copy transfer**: [`ChainBuf::add_buffer`] and friends move
//!   segments, never bytes
//! - **Two-phase append**: [`ChainBuf::reserve_space`] hands out writable
//!   space that stays invisible until [`ChainBuf::commit_space`]
//! - **Exactly-once release**: external-reference cleanups and file
//!   handles fire/close exactly once, on drain or drop
//! - **Gated ends**: front/back freezes reject mutations with no side
//!   effects
//! - **Coalesced notification**: change callbacks can be deferred through
//!   a host event loop and collapse to one dispatch per buffer
//!
//! # Module Structure
//!
//! - [`buffer`]: the chain and its mutation operations
//! - [`cursor`]: stable positions and substring search
//! - [`line`]: line extraction with four end-of-line dialects
//! - [`callback`]: change notifications, suspension, recursion handling
//! - [`defer`]: the event-loop seam for deferred dispatch
//! - [`io`]: scatter/gather bridge to `Read`/`Write`
//! - [`shared`]: the lock-guarded shared wrapper
//! - [`error`]: error types
//! - [`test_utils`]: logging and assertion helpers for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod buffer;
pub mod callback;
pub mod cursor;
pub mod defer;
pub mod error;
pub mod io;
pub mod line;
mod segment;
pub mod shared;
pub mod test_utils;

// Re-exports for convenient access to core types
pub use buffer::{ChainBuf, End};
pub use callback::{CallbackHandle, CallbackInfo};
pub use cursor::Cursor;
pub use defer::{DeferQueue, Job, ManualQueue};
pub use error::{Error, ErrorKind, Result};
pub use line::EolStyle;
pub use shared::SharedBuf;
