//! murmur core: the pure admission primitives of the chat write path.
//!
//! This crate holds the content admission validator, the submission rate
//! limiter transition function, the message record model and the shared
//! error surface. Nothing here performs I/O or owns a runtime, so every
//! decision can be tested without timers, sockets or a store.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `MurmurError`/`Result` so a malformed
//! draft can never take the process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod clock;
pub mod content;
pub mod error;
pub mod ratelimit;
pub mod record;

/// Shared result type.
pub use error::{ContentErrorKind, MurmurError, Result};
