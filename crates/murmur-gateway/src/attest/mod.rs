//! Attestation layer (token cache, enforcement, security event log).

pub mod events;
pub mod middleware;
pub mod provider;

pub use events::{
    EventContext, LogWriter, SecurityEvent, SecurityEventKind, SecurityEventLog, SecurityStats,
};
pub use middleware::{AttestationMiddleware, AttestationSettings, CachedToken};
pub use provider::{AttestationProvider, DevAttestationProvider};
