//! Shared application state for the murmur gateway.
//!
//! Wires the attestation middleware, the storage collaborator, the session
//! registry and the composer together once at startup. Startup errors are
//! returned, never panicked on. A persistent security log spawns its writer
//! task here, so construction must happen inside the tokio runtime.

use std::sync::Arc;

use murmur_core::clock::Clock;
use murmur_core::error::{MurmurError, Result};

use crate::attest::{
    AttestationMiddleware, AttestationProvider, AttestationSettings, EventContext, SecurityEventLog,
};
use crate::config::GatewayConfig;
use crate::obs::GatewayMetrics;
use crate::pipeline::Composer;
use crate::session::SessionRegistry;
use crate::store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    composer: Composer,
    sessions: SessionRegistry,
    metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Build application state from validated config and the two external
    /// collaborators.
    pub fn new(
        cfg: GatewayConfig,
        provider: Arc<dyn AttestationProvider>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        cfg.validate()?;

        let a = &cfg.attestation;
        let log = match &a.log_path {
            Some(path) => {
                let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                    MurmurError::Internal("persistent security log needs a tokio runtime".into())
                })?;
                let (log, writer) = SecurityEventLog::persistent(a.log_capacity, path);
                runtime.spawn(writer.run());
                log
            }
            None => SecurityEventLog::in_memory(a.log_capacity),
        };
        let settings = AttestationSettings {
            cache_key: a.cache_key.clone(),
            token_ttl_ms: a.token_ttl_ms,
            context: EventContext {
                client: a.client.clone(),
                origin: a.origin.clone(),
            },
        };
        let attestation = AttestationMiddleware::new(provider, Arc::clone(&clock), settings, log);

        if !a.enforce {
            tracing::warn!("attestation enforcement disabled; privileged writes are not attested");
        }

        let metrics = Arc::new(GatewayMetrics::default());
        let composer = Composer::new(&cfg, attestation, store, clock, Arc::clone(&metrics))?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                composer,
                sessions: SessionRegistry::new(),
                metrics,
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn composer(&self) -> &Composer {
        &self.inner.composer
    }

    pub fn attestation(&self) -> &AttestationMiddleware {
        self.inner.composer.attestation()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Gauges computed at scrape time.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("murmur_sessions", self.sessions().len() as u64),
            (
                "murmur_attestation_token_cached",
                self.attestation().cached_token().is_some() as u64,
            ),
        ]
    }
}
