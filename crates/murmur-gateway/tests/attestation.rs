#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use murmur_core::clock::ManualClock;
use murmur_core::error::{MurmurError, Result};
use murmur_gateway::attest::{
    AttestationMiddleware, AttestationProvider, AttestationSettings, DevAttestationProvider,
    SecurityEventKind, SecurityEventLog,
};

const T0: u64 = 1_700_000_000_000;

/// Counts upstream calls; sleeps so concurrent callers overlap; the first
/// `fail_first` calls fail.
#[derive(Default)]
struct SlowProvider {
    calls: AtomicU64,
    fail_first: u64,
    token: Option<&'static str>,
}

impl SlowProvider {
    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttestationProvider for SlowProvider {
    async fn issue_token(&self) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        if n <= self.fail_first {
            return Err(MurmurError::Internal("provider unavailable".into()));
        }
        Ok(self
            .token
            .map(str::to_string)
            .unwrap_or_else(|| format!("hdr.payload{n}.sig")))
    }
}

fn middleware(
    provider: Arc<dyn AttestationProvider>,
    clock: &ManualClock,
    log: SecurityEventLog,
) -> AttestationMiddleware {
    AttestationMiddleware::new(
        provider,
        Arc::new(clock.clone()),
        AttestationSettings::default(),
        log,
    )
}

fn kinds(mw: &AttestationMiddleware) -> Vec<SecurityEventKind> {
    mw.security_events().iter().map(|e| e.event).collect()
}

#[tokio::test]
async fn cached_token_is_reused_until_expiry() {
    let clock = ManualClock::new(T0);
    let provider = Arc::new(DevAttestationProvider::new());
    let mw = middleware(provider.clone(), &clock, SecurityEventLog::in_memory(100));

    let first = mw.get_valid_token(false).await.unwrap();
    clock.advance_ms(299_999);
    let second = mw.get_valid_token(false).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(provider.issued(), 1);
    assert_eq!(mw.cached_token().unwrap().expires_at_ms, T0 + 300_000);

    clock.advance_ms(1);
    let third = mw.get_valid_token(false).await.unwrap();
    assert_ne!(first, third);
    assert_eq!(provider.issued(), 2);

    let stats = mw.security_stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.token_requests, 2);
    assert_eq!(stats.token_successes, 2);
}

#[tokio::test]
async fn concurrent_misses_share_one_request() {
    let clock = ManualClock::new(T0);
    let provider = Arc::new(SlowProvider::default());
    let mw = middleware(provider.clone(), &clock, SecurityEventLog::in_memory(100));

    let (a, b, c) = tokio::join!(
        mw.get_valid_token(false),
        mw.get_valid_token(false),
        mw.get_valid_token(false)
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(provider.calls(), 1);
    assert_eq!(mw.security_stats().token_requests, 1);
}

#[tokio::test]
async fn coalesced_failure_reaches_every_waiter_and_is_not_cached() {
    let clock = ManualClock::new(T0);
    let provider = Arc::new(SlowProvider {
        fail_first: 1,
        ..Default::default()
    });
    let mw = middleware(provider.clone(), &clock, SecurityEventLog::in_memory(100));

    let (a, b) = tokio::join!(mw.get_valid_token(false), mw.get_valid_token(false));
    assert_eq!(a.unwrap_err().reason(), "token_request_failed");
    assert_eq!(b.unwrap_err().reason(), "token_request_failed");
    assert_eq!(provider.calls(), 1);
    assert!(mw.cached_token().is_none());

    // The failed request left no in-flight entry behind.
    let token = mw.get_valid_token(false).await.unwrap();
    assert_eq!(token, "hdr.payload2.sig");
    assert_eq!(provider.calls(), 2);
    assert_eq!(mw.security_stats().token_failures, 1);
}

#[tokio::test]
async fn force_refresh_bypasses_cache() {
    let clock = ManualClock::new(T0);
    let provider = Arc::new(DevAttestationProvider::new());
    let mw = middleware(provider.clone(), &clock, SecurityEventLog::in_memory(100));

    let first = mw.get_valid_token(false).await.unwrap();
    let forced = mw.get_valid_token(true).await.unwrap();
    assert_ne!(first, forced);
    assert_eq!(mw.cached_token().unwrap().value, forced);
    assert_eq!(provider.issued(), 2);
}

#[tokio::test]
async fn enforce_records_the_full_sequence() {
    let clock = ManualClock::new(T0);
    let mw = middleware(
        Arc::new(DevAttestationProvider::new()),
        &clock,
        SecurityEventLog::in_memory(100),
    );

    let token = mw.enforce("send_message").await.unwrap();
    assert_eq!(token.split('.').count(), 3);
    assert_eq!(
        kinds(&mw),
        vec![
            SecurityEventKind::EnforcementStart,
            SecurityEventKind::RequestStart,
            SecurityEventKind::RequestSuccess,
            SecurityEventKind::ValidationSuccess,
            SecurityEventKind::EnforcementSuccess,
        ]
    );

    let events = mw.security_events();
    assert_eq!(events[0].details["operation"], "send_message");
    assert_eq!(events[2].details["cached"], false);
    assert_eq!(events[0].context.client, "");

    let stats = mw.security_stats();
    assert_eq!(stats.total_events, 5);
    assert_eq!(stats.enforcement_attempts, 1);
    assert_eq!(stats.enforcement_successes, 1);
    assert_eq!(stats.enforcement_failures, 0);
}

#[tokio::test]
async fn malformed_token_fails_closed() {
    let clock = ManualClock::new(T0);
    let provider = Arc::new(SlowProvider {
        token: Some("bad"),
        ..Default::default()
    });
    let mw = middleware(provider, &clock, SecurityEventLog::in_memory(100));

    let err = mw.enforce("send_message").await.unwrap_err();
    assert!(err.is_attestation());
    assert_eq!(err.reason(), "app_check_enforcement_failed");

    let events = mw.security_events();
    let failed = events
        .iter()
        .find(|e| e.event == SecurityEventKind::ValidationFailed)
        .unwrap();
    assert_eq!(failed.details["reason"], "invalid_format");
    assert_eq!(events.last().unwrap().event, SecurityEventKind::EnforcementFailed);
    assert_eq!(events.last().unwrap().details["operation"], "send_message");
    assert_eq!(mw.security_stats().validation_failures, 1);
}

#[tokio::test]
async fn empty_token_is_reported_as_missing() {
    let clock = ManualClock::new(T0);
    let mw = middleware(
        Arc::new(DevAttestationProvider::new()),
        &clock,
        SecurityEventLog::in_memory(100),
    );

    assert!(!mw.validate_token(""));
    assert_eq!(mw.security_events()[0].details["reason"], "no_token");
    assert!(mw.validate_token("a.b.c"));
}

#[tokio::test]
async fn log_evicts_oldest_past_capacity() {
    let clock = ManualClock::new(T0);
    let mw = middleware(
        Arc::new(DevAttestationProvider::new()),
        &clock,
        SecurityEventLog::in_memory(3),
    );

    mw.enforce("send_message").await.unwrap();
    assert_eq!(
        kinds(&mw),
        vec![
            SecurityEventKind::RequestSuccess,
            SecurityEventKind::ValidationSuccess,
            SecurityEventKind::EnforcementSuccess,
        ]
    );
    assert_eq!(mw.security_stats().total_events, 3);
}

#[tokio::test]
async fn clear_cache_keeps_the_log() {
    let clock = ManualClock::new(T0);
    let provider = Arc::new(DevAttestationProvider::new());
    let mw = middleware(provider.clone(), &clock, SecurityEventLog::in_memory(100));

    mw.get_valid_token(false).await.unwrap();
    mw.clear_cache();
    assert!(mw.cached_token().is_none());
    assert_eq!(kinds(&mw).last(), Some(&SecurityEventKind::CacheCleared));

    mw.get_valid_token(false).await.unwrap();
    assert_eq!(provider.issued(), 2);

    mw.clear_security_events();
    assert!(mw.security_events().is_empty());
    assert!(mw.cached_token().is_some());
}

fn temp_log(tag: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "murmur-security-{tag}-{}.json",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test]
async fn persistent_log_survives_reload() {
    let path = temp_log("reload");

    let clock = ManualClock::new(T0);
    let (log, writer) = SecurityEventLog::persistent(4, &path);
    let flushed = tokio::spawn(writer.run());
    let mw = middleware(Arc::new(DevAttestationProvider::new()), &clock, log);
    mw.enforce("report_message").await.unwrap();
    let before = mw.security_events();
    assert_eq!(before.len(), 4);

    // Dropping the log lets the writer finish its last flush and stop.
    drop(mw);
    flushed.await.unwrap();

    let (reloaded, _) = SecurityEventLog::persistent(4, &path);
    assert_eq!(reloaded.snapshot(), before);

    let (smaller, _) = SecurityEventLog::persistent(2, &path);
    assert_eq!(smaller.snapshot(), before[2..].to_vec());

    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn appends_never_touch_the_file_themselves() {
    let path = temp_log("deferred");

    let clock = ManualClock::new(T0);
    let (log, writer) = SecurityEventLog::persistent(100, &path);
    let mw = middleware(Arc::new(DevAttestationProvider::new()), &clock, log);
    mw.enforce("send_message").await.unwrap();
    mw.enforce("send_message").await.unwrap();
    assert!(!path.exists());

    // Every append so far collapses into the writer's pending flush.
    let flushed = tokio::spawn(writer.run());
    let expected = mw.security_events();
    drop(mw);
    flushed.await.unwrap();

    let (reloaded, _) = SecurityEventLog::persistent(100, &path);
    assert_eq!(reloaded.snapshot(), expected);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn unreadable_log_starts_empty() {
    let path = temp_log("garbage");
    std::fs::write(&path, b"not json").unwrap();
    let (log, _) = SecurityEventLog::persistent(10, &path);
    assert!(log.snapshot().is_empty());
    std::fs::remove_file(&path).unwrap();
}
