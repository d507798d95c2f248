//! Attestation token cache and enforcement middleware.
//!
//! One instance per process, constructed explicitly and cloned into every
//! call site that performs a privileged write. Clones share the cache, the
//! in-flight request table and the event log.
//!
//! Coalescing: concurrent misses on the same cache key join a single shared
//! upstream request. The shared future itself stores the token and removes
//! its in-flight entry, so the bookkeeping completes even if the caller that
//! started it goes away; any remaining waiter keeps driving it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};

use murmur_core::clock::Clock;
use murmur_core::error::{MurmurError, Result};

use super::events::{
    Details, EventContext, SecurityEvent, SecurityEventKind, SecurityEventLog, SecurityStats,
};
use super::provider::AttestationProvider;

type TokenRequest = Shared<BoxFuture<'static, Result<String>>>;

/// Cache/TTL settings for [`AttestationMiddleware`].
#[derive(Debug, Clone)]
pub struct AttestationSettings {
    pub cache_key: String,
    pub token_ttl_ms: u64,
    pub context: EventContext,
}

impl Default for AttestationSettings {
    fn default() -> Self {
        Self {
            cache_key: "default".into(),
            token_ttl_ms: 5 * 60 * 1000,
            context: EventContext::default(),
        }
    }
}

/// A memoized attestation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub expires_at_ms: u64,
}

#[derive(Clone)]
pub struct AttestationMiddleware {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn AttestationProvider>,
    clock: Arc<dyn Clock>,
    settings: AttestationSettings,
    cache: DashMap<String, CachedToken>,
    in_flight: Mutex<HashMap<String, TokenRequest>>,
    log: SecurityEventLog,
}

impl AttestationMiddleware {
    pub fn new(
        provider: Arc<dyn AttestationProvider>,
        clock: Arc<dyn Clock>,
        settings: AttestationSettings,
        log: SecurityEventLog,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                clock,
                settings,
                cache: DashMap::new(),
                in_flight: Mutex::new(HashMap::new()),
                log,
            }),
        }
    }

    /// Return the cached token for the default key, or fetch a fresh one.
    ///
    /// `force_refresh` bypasses the cache but still joins a request that is
    /// already in flight. A failed request leaves the cache untouched.
    pub async fn get_valid_token(&self, force_refresh: bool) -> Result<String> {
        let key = self.inner.settings.cache_key.clone();

        if !force_refresh {
            if let Some(token) = self.inner.cache_hit(&key) {
                return Ok(token);
            }
        }

        let request = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .map_err(|_| MurmurError::Internal("token request table poisoned".into()))?;

            match in_flight.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    // A request may have completed between the fast-path check and here.
                    if !force_refresh {
                        if let Some(token) = self.inner.cache_hit(&key) {
                            return Ok(token);
                        }
                    }
                    let request = Inner::request(Arc::clone(&self.inner), key.clone())
                        .boxed()
                        .shared();
                    in_flight.insert(key, request.clone());
                    request
                }
            }
        };

        request.await
    }

    /// Structural check only: non-empty, exactly three non-empty
    /// `.`-separated segments. Cryptographic verification belongs to the
    /// provider at the server boundary.
    pub fn validate_token(&self, token: &str) -> bool {
        if token.is_empty() {
            self.inner.emit(
                SecurityEventKind::ValidationFailed,
                details([("reason", json!("no_token"))]),
            );
            return false;
        }
        if !is_well_formed(token) {
            self.inner.emit(
                SecurityEventKind::ValidationFailed,
                details([("reason", json!("invalid_format"))]),
            );
            return false;
        }
        self.inner
            .emit(SecurityEventKind::ValidationSuccess, Details::new());
        true
    }

    /// Single choke point before a privileged write: obtain a token, check
    /// its shape, and hand it back for the caller to attach. Fails closed.
    pub async fn enforce(&self, operation: &str) -> Result<String> {
        self.inner.emit(
            SecurityEventKind::EnforcementStart,
            details([("operation", json!(operation))]),
        );

        let outcome = match self.get_valid_token(false).await {
            Ok(token) if self.validate_token(&token) => Ok(token),
            Ok(_) => Err(MurmurError::TokenValidationFailed(
                "invalid attestation token".into(),
            )),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(token) => {
                self.inner.emit(
                    SecurityEventKind::EnforcementSuccess,
                    details([("operation", json!(operation))]),
                );
                Ok(token)
            }
            Err(e) => {
                let reason = e.to_string();
                self.inner.emit(
                    SecurityEventKind::EnforcementFailed,
                    details([("operation", json!(operation)), ("error", json!(reason))]),
                );
                Err(MurmurError::EnforcementFailed {
                    operation: operation.to_string(),
                    reason,
                })
            }
        }
    }

    /// Drop every cached token. The event log is kept.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner
            .emit(SecurityEventKind::CacheCleared, Details::new());
    }

    pub fn cached_token(&self) -> Option<CachedToken> {
        self.inner
            .cache
            .get(&self.inner.settings.cache_key)
            .map(|e| e.value().clone())
    }

    pub fn security_stats(&self) -> SecurityStats {
        self.inner.log.stats()
    }

    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.inner.log.snapshot()
    }

    pub fn clear_security_events(&self) {
        self.inner.log.clear();
    }
}

impl Inner {
    fn cache_hit(&self, key: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let token = self
            .cache
            .get(key)
            .filter(|c| c.expires_at_ms > now)
            .map(|c| c.value.clone())?;
        self.emit(
            SecurityEventKind::CacheHit,
            details([("cached", json!(true))]),
        );
        Some(token)
    }

    async fn request(self: Arc<Self>, key: String) -> Result<String> {
        self.emit(SecurityEventKind::RequestStart, Details::new());
        let requested_at = self.clock.now_ms();

        let res = self.provider.issue_token().await;

        let out = match res {
            Ok(token) => {
                self.cache.insert(
                    key.clone(),
                    CachedToken {
                        value: token.clone(),
                        expires_at_ms: requested_at.saturating_add(self.settings.token_ttl_ms),
                    },
                );
                self.emit(
                    SecurityEventKind::RequestSuccess,
                    details([("token_length", json!(token.len())), ("cached", json!(false))]),
                );
                Ok(token)
            }
            Err(e) => {
                let msg = e.to_string();
                self.emit(
                    SecurityEventKind::RequestFailed,
                    details([("error", json!(msg))]),
                );
                Err(MurmurError::TokenRequestFailed(msg))
            }
        };

        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&key);
        }
        out
    }

    fn emit(&self, event: SecurityEventKind, details: Details) {
        self.log.push(SecurityEvent {
            timestamp_ms: self.clock.now_ms(),
            event,
            details,
            context: self.settings.context.clone(),
        });
    }
}

fn is_well_formed(token: &str) -> bool {
    let mut segments = 0;
    for part in token.split('.') {
        if part.is_empty() || part.chars().any(char::is_whitespace) {
            return false;
        }
        segments += 1;
    }
    segments == 3
}

fn details<const N: usize>(pairs: [(&str, Value); N]) -> Details {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
