//! Lightweight in-process metrics (dependency-free).
//!
//! Admission outcomes are counted here and rendered by the `/metrics`
//! handler. Security statistics are not: those are derived from the
//! attestation event log.

pub mod metrics;

pub use metrics::GatewayMetrics;
