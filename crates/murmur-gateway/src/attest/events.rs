//! Security event log.
//!
//! A capped ring buffer of attestation events, optionally mirrored to a JSON
//! file so it can be inspected after a restart. The log only describes past
//! decisions; nothing on the admission path reads it.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

/// Every state transition of the token cache and enforcement middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityEventKind {
    #[serde(rename = "token_cache_hit")]
    CacheHit,
    #[serde(rename = "token_request_start")]
    RequestStart,
    #[serde(rename = "token_request_success")]
    RequestSuccess,
    #[serde(rename = "token_request_failed")]
    RequestFailed,
    #[serde(rename = "token_validation_success")]
    ValidationSuccess,
    #[serde(rename = "token_validation_failed")]
    ValidationFailed,
    #[serde(rename = "app_check_enforcement")]
    EnforcementStart,
    #[serde(rename = "app_check_success")]
    EnforcementSuccess,
    #[serde(rename = "app_check_failed")]
    EnforcementFailed,
    #[serde(rename = "token_cache_cleared")]
    CacheCleared,
}

impl SecurityEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEventKind::CacheHit => "token_cache_hit",
            SecurityEventKind::RequestStart => "token_request_start",
            SecurityEventKind::RequestSuccess => "token_request_success",
            SecurityEventKind::RequestFailed => "token_request_failed",
            SecurityEventKind::ValidationSuccess => "token_validation_success",
            SecurityEventKind::ValidationFailed => "token_validation_failed",
            SecurityEventKind::EnforcementStart => "app_check_enforcement",
            SecurityEventKind::EnforcementSuccess => "app_check_success",
            SecurityEventKind::EnforcementFailed => "app_check_failed",
            SecurityEventKind::CacheCleared => "token_cache_cleared",
        }
    }
}

/// Who emitted an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub client: String,
    pub origin: String,
}

pub type Details = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp_ms: u64,
    pub event: SecurityEventKind,
    #[serde(default)]
    pub details: Details,
    #[serde(default)]
    pub context: EventContext,
}

/// Aggregates derived from the log contents alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SecurityStats {
    pub total_events: u64,
    pub token_requests: u64,
    pub token_successes: u64,
    pub token_failures: u64,
    pub validation_failures: u64,
    pub enforcement_attempts: u64,
    pub enforcement_successes: u64,
    pub enforcement_failures: u64,
    pub cache_hits: u64,
}

impl SecurityStats {
    pub fn tally<'a>(events: impl IntoIterator<Item = &'a SecurityEvent>) -> Self {
        let mut s = SecurityStats::default();
        for e in events {
            s.total_events += 1;
            match e.event {
                SecurityEventKind::RequestStart => s.token_requests += 1,
                SecurityEventKind::RequestSuccess => s.token_successes += 1,
                SecurityEventKind::RequestFailed => s.token_failures += 1,
                SecurityEventKind::ValidationFailed => s.validation_failures += 1,
                SecurityEventKind::EnforcementStart => s.enforcement_attempts += 1,
                SecurityEventKind::EnforcementSuccess => s.enforcement_successes += 1,
                SecurityEventKind::EnforcementFailed => s.enforcement_failures += 1,
                SecurityEventKind::CacheHit => s.cache_hits += 1,
                SecurityEventKind::ValidationSuccess | SecurityEventKind::CacheCleared => {}
            }
        }
        s
    }
}

/// Capped, append-only event log (oldest evicted first).
///
/// Appends stay synchronous and in memory. When the log is persistent, each
/// append only marks it dirty; a [`LogWriter`] task does the file I/O.
#[derive(Debug)]
pub struct SecurityEventLog {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<SecurityEvent>>>,
    dirty: Option<watch::Sender<()>>,
}

impl SecurityEventLog {
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.max(1)))),
            dirty: None,
        }
    }

    /// Log mirrored to `path` by the returned writer, which the caller must
    /// spawn. Entries already in the file are loaded (up to `capacity`); an
    /// unreadable file starts an empty log.
    pub fn persistent(capacity: usize, path: impl Into<PathBuf>) -> (Self, LogWriter) {
        let path = path.into();
        let mut log = Self::in_memory(capacity);

        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<SecurityEvent>>(&bytes) {
                Ok(loaded) => {
                    let skip = loaded.len().saturating_sub(log.capacity);
                    log.entries = Arc::new(Mutex::new(loaded.into_iter().skip(skip).collect()));
                }
                Err(e) => {
                    tracing::warn!(path=%path.display(), error=%e, "security log unreadable, starting empty");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path=%path.display(), error=%e, "security log open failed, starting empty");
            }
        }

        let (tx, rx) = watch::channel(());
        log.dirty = Some(tx);
        let writer = LogWriter {
            path,
            entries: Arc::clone(&log.entries),
            dirty: rx,
        };
        (log, writer)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, event: SecurityEvent) {
        tracing::info!(
            target: "murmur::security",
            event = event.event.as_str(),
            details = ?event.details,
            client = %event.context.client,
            "security event"
        );

        {
            let mut entries = lock(&self.entries);
            entries.push_back(event);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
        self.mark_dirty();
    }

    pub fn snapshot(&self) -> Vec<SecurityEvent> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn stats(&self) -> SecurityStats {
        SecurityStats::tally(lock(&self.entries).iter())
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
        self.mark_dirty();
    }

    fn mark_dirty(&self) {
        if let Some(dirty) = &self.dirty {
            dirty.send_replace(());
        }
    }
}

/// Background task mirroring a persistent [`SecurityEventLog`] to its file.
///
/// Appends made while a write is in progress collapse into one follow-up
/// write. The task flushes once more and ends when the log is dropped.
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    entries: Arc<Mutex<VecDeque<SecurityEvent>>>,
    dirty: watch::Receiver<()>,
}

impl LogWriter {
    pub async fn run(mut self) {
        while self.dirty.changed().await.is_ok() {
            self.flush().await;
        }
    }

    async fn flush(&self) {
        let encoded = serde_json::to_vec(&*lock(&self.entries));
        let res = match encoded {
            Ok(bytes) => tokio::fs::write(&self.path, bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = res {
            tracing::warn!(path=%self.path.display(), error=%e, "security log persist failed");
        }
    }
}

fn lock(entries: &Mutex<VecDeque<SecurityEvent>>) -> MutexGuard<'_, VecDeque<SecurityEvent>> {
    // A poisoned log is still a valid ring buffer; keep recording.
    entries.lock().unwrap_or_else(|p| p.into_inner())
}
