//! murmur gateway library entry.
//!
//! Wires content admission, per-session rate limiting, attestation and the
//! message store behind an HTTP/WebSocket surface. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod api;
pub mod app_state;
pub mod attest;
pub mod config;
pub mod obs;
pub mod ops;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod store;
