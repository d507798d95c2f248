//! Attestation provider port.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use murmur_core::error::Result;

/// External attestation service. Token issuance is opaque to murmur: the
/// provider either hands back a bearer string or fails.
#[async_trait]
pub trait AttestationProvider: Send + Sync {
    async fn issue_token(&self) -> Result<String>;
}

/// Local provider for development and tests: mints structurally valid
/// three-segment tokens without contacting anyone.
#[derive(Debug, Default)]
pub struct DevAttestationProvider {
    issued: AtomicU64,
}

impl DevAttestationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AttestationProvider for DevAttestationProvider {
    async fn issue_token(&self) -> Result<String> {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("dev.{n:016x}.unsigned"))
    }
}
