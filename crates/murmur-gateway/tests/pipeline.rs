#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use murmur_core::clock::ManualClock;
use murmur_core::error::{MurmurError, Result};
use murmur_core::ratelimit::RateLimitState;
use murmur_core::record::{CounterField, FlagField, MessageRecord, NewRecord};
use murmur_gateway::attest::{
    AttestationMiddleware, AttestationProvider, AttestationSettings, DevAttestationProvider,
    SecurityEventLog,
};
use murmur_gateway::config::GatewayConfig;
use murmur_gateway::obs::GatewayMetrics;
use murmur_gateway::pipeline::{Composer, Draft};
use murmur_gateway::store::{InMemoryStore, MessageStore};

const T0: u64 = 1_700_000_000_000;
const LONG: &str = "the quick brown fox jumps over the lazy dog while the cat watches from the window sill";

struct Harness {
    composer: Composer,
    store: InMemoryStore,
    clock: ManualClock,
    metrics: Arc<GatewayMetrics>,
}

fn harness() -> Harness {
    harness_with(
        GatewayConfig::default(),
        Arc::new(DevAttestationProvider::new()),
        None,
    )
}

fn harness_with(
    cfg: GatewayConfig,
    provider: Arc<dyn AttestationProvider>,
    store_override: Option<Arc<dyn MessageStore>>,
) -> Harness {
    let clock = ManualClock::new(T0);
    let store = InMemoryStore::new();
    let metrics = Arc::new(GatewayMetrics::default());
    let attestation = AttestationMiddleware::new(
        provider,
        Arc::new(clock.clone()),
        AttestationSettings::default(),
        SecurityEventLog::in_memory(100),
    );
    let composer = Composer::new(
        &cfg,
        attestation,
        store_override.unwrap_or_else(|| Arc::new(store.clone())),
        Arc::new(clock.clone()),
        Arc::clone(&metrics),
    )
    .unwrap();
    Harness {
        composer,
        store,
        clock,
        metrics,
    }
}

fn draft(content: &str) -> Draft {
    Draft {
        channel: "lobby".into(),
        username: "ghost".into(),
        content: content.into(),
        reply_to: None,
    }
}

struct BadTokenProvider;

#[async_trait]
impl AttestationProvider for BadTokenProvider {
    async fn issue_token(&self) -> Result<String> {
        Ok("bad".into())
    }
}

/// Accepts nothing on append; everything else goes to the inner store.
struct ReadOnlyStore(InMemoryStore);

#[async_trait]
impl MessageStore for ReadOnlyStore {
    async fn append_record(&self, _record: NewRecord) -> Result<String> {
        Err(MurmurError::Storage("write rejected".into()))
    }
    async fn increment_counter_field(&self, id: &str, field: CounterField) -> Result<u64> {
        self.0.increment_counter_field(id, field).await
    }
    async fn set_flag(&self, id: &str, field: FlagField, value: bool) -> Result<()> {
        self.0.set_flag(id, field, value).await
    }
    async fn get(&self, id: &str) -> Result<Option<MessageRecord>> {
        self.0.get(id).await
    }
    async fn list_channel(&self, channel: &str) -> Result<Vec<MessageRecord>> {
        self.0.list_channel(channel).await
    }
    fn subscribe(&self, channel: &str) -> BoxStream<'static, Vec<MessageRecord>> {
        self.0.subscribe(channel)
    }
}

#[tokio::test]
async fn accepted_message_is_stored_normalized() {
    let h = harness();
    let mut state = RateLimitState::default();

    let sent = h
        .composer
        .send(&mut state, draft("  hello there\n\n\n\nfriend  "))
        .await
        .unwrap();
    assert_eq!(sent.content, "hello there\n\nfriend");
    assert_eq!(sent.expire_at_ms, T0 + 86_400_000);
    assert_eq!(state.count_in_window, 1);
    assert_eq!(state.last_submit_ms, T0);

    let history = h.composer.history("lobby").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent.id);
    assert_eq!(history[0].content, "hello there\n\nfriend");
    assert_eq!(history[0].username, "ghost");
    assert!(!history[0].reported);
    assert_eq!(
        h.metrics
            .admissions
            .get(&[("stage", "accepted"), ("reason", "ok")]),
        1
    );
}

#[tokio::test]
async fn fourth_send_in_window_arms_cooldown() {
    let h = harness();
    let mut state = RateLimitState::default();

    for _ in 0..3 {
        h.composer.send(&mut state, draft("hello world")).await.unwrap();
        h.clock.advance_ms(1_000);
    }

    let err = h
        .composer
        .send(&mut state, draft("hello world"))
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::RateLimited { retry_after_secs: 30 }));
    assert_eq!(state.cooldown_until_ms, T0 + 3_000 + 30_000);
    assert_eq!(h.store.len(), 3);

    h.clock.advance_ms(20_000);
    let err = h
        .composer
        .send(&mut state, draft("hello world"))
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::RateLimited { retry_after_secs: 10 }));

    h.clock.advance_ms(10_000);
    h.composer.send(&mut state, draft("hello world")).await.unwrap();
    assert_eq!(h.store.len(), 4);
}

#[tokio::test]
async fn rejected_content_does_not_count() {
    let h = harness();
    let mut state = RateLimitState::default();

    let err = h.composer.send(&mut state, draft("hi")).await.unwrap_err();
    assert_eq!(err.reason(), "too_short");
    assert_eq!(err.to_string(), "Message must be at least 5 characters.");
    assert_eq!(state, RateLimitState::default());

    for _ in 0..3 {
        h.composer.send(&mut state, draft("hello world")).await.unwrap();
    }
    assert_eq!(
        h.metrics
            .admissions
            .get(&[("stage", "content"), ("reason", "too_short")]),
        1
    );
}

#[tokio::test]
async fn markup_is_stripped_before_validation() {
    let h = harness();
    let mut state = RateLimitState::default();

    let sent = h
        .composer
        .send(&mut state, draft("<b>hello</b> world"))
        .await
        .unwrap();
    assert_eq!(sent.content, "hello world");

    let err = h
        .composer
        .send(&mut state, draft("<script>alert(1)</script>"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "invalid_content");
}

#[tokio::test]
async fn attestation_failure_blocks_the_write() {
    let h = harness_with(GatewayConfig::default(), Arc::new(BadTokenProvider), None);
    let mut state = RateLimitState::default();

    let err = h
        .composer
        .send(&mut state, draft("hello world"))
        .await
        .unwrap_err();
    assert!(err.is_attestation());
    assert_eq!(err.reason(), "app_check_enforcement_failed");
    assert!(h.store.is_empty());
    assert_eq!(state, RateLimitState::default());
    assert_eq!(
        h.composer.attestation().security_stats().enforcement_failures,
        1
    );
}

#[tokio::test]
async fn enforcement_can_be_disabled() {
    let mut cfg = GatewayConfig::default();
    cfg.attestation.enforce = false;
    let h = harness_with(cfg, Arc::new(BadTokenProvider), None);
    let mut state = RateLimitState::default();

    h.composer.send(&mut state, draft("hello world")).await.unwrap();
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.composer.attestation().security_stats().total_events, 0);
}

#[tokio::test]
async fn storage_failure_surfaces_as_retryable() {
    let backing = InMemoryStore::new();
    let h = harness_with(
        GatewayConfig::default(),
        Arc::new(DevAttestationProvider::new()),
        Some(Arc::new(ReadOnlyStore(backing.clone()))),
    );
    let mut state = RateLimitState::default();

    let err = h
        .composer
        .send(&mut state, draft("hello world"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "storage_failed");
    assert_eq!(err.to_string(), "failed to send, please retry");
    assert!(backing.is_empty());
    // The attempt was counted before the write.
    assert_eq!(state.count_in_window, 1);
}

#[tokio::test]
async fn reports_flag_at_threshold() {
    let h = harness();
    let mut state = RateLimitState::default();
    let sent = h.composer.send(&mut state, draft("hello world")).await.unwrap();

    let first = h.composer.report(&sent.id).await.unwrap();
    assert_eq!(first.report_count, 1);
    assert!(!first.reported);

    let second = h.composer.report(&sent.id).await.unwrap();
    assert_eq!(second.report_count, 2);
    assert!(second.reported);

    let stored = h.store.get(&sent.id).await.unwrap().unwrap();
    assert!(stored.reported);
    assert_eq!(stored.report_count, 2);

    let err = h.composer.report("m999999999999").await.unwrap_err();
    assert_eq!(err.reason(), "not_found");
    assert_eq!(h.metrics.reports.get(&[("outcome", "flagged")]), 1);
    assert_eq!(h.metrics.reports.get(&[("outcome", "failed")]), 1);
}

#[tokio::test]
async fn reply_carries_a_truncated_preview() {
    let h = harness();
    let mut state = RateLimitState::default();
    let original = h.composer.send(&mut state, draft(LONG)).await.unwrap();

    let mut reply = draft("agreed, nice one");
    reply.reply_to = Some(original.id.clone());
    let sent = h.composer.send(&mut state, reply).await.unwrap();

    let stored = h.store.get(&sent.id).await.unwrap().unwrap();
    let quoted = stored.reply_to.unwrap();
    assert_eq!(quoted.message_id, original.id);
    assert_eq!(quoted.username, "ghost");
    assert_eq!(quoted.content, format!("{}...", &LONG[..80]));
}

#[tokio::test]
async fn reply_target_must_exist_in_the_same_channel() {
    let h = harness();
    let mut state = RateLimitState::default();

    let mut missing = draft("hello world");
    missing.reply_to = Some("m000000000404".into());
    let err = h.composer.send(&mut state, missing).await.unwrap_err();
    assert_eq!(err.reason(), "not_found");
    assert_eq!(state, RateLimitState::default());

    let original = h.composer.send(&mut state, draft("hello world")).await.unwrap();
    let mut elsewhere = draft("hello again");
    elsewhere.channel = "other".into();
    elsewhere.reply_to = Some(original.id);
    let err = h.composer.send(&mut state, elsewhere).await.unwrap_err();
    assert_eq!(err.reason(), "not_found");
    assert_eq!(
        h.metrics
            .admissions
            .get(&[("stage", "reply"), ("reason", "not_found")]),
        2
    );
}

#[tokio::test]
async fn expired_messages_drop_out_of_history() {
    let h = harness();
    let mut state = RateLimitState::default();
    h.composer.send(&mut state, draft("hello world")).await.unwrap();

    h.clock.advance_ms(86_400_000 - 1);
    assert_eq!(h.composer.history("lobby").await.unwrap().len(), 1);

    h.clock.advance_ms(1);
    assert!(h.composer.history("lobby").await.unwrap().is_empty());
    assert_eq!(h.store.len(), 1);

    assert_eq!(h.store.sweep_expired(T0 + 86_400_000), 1);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn feed_pushes_a_snapshot_per_change() {
    let h = harness();
    let mut state = RateLimitState::default();
    let mut feed = h.composer.feed("lobby").unwrap();

    let first = feed.next().await.unwrap();
    assert!(first.is_empty());

    let sent = h.composer.send(&mut state, draft("hello world")).await.unwrap();
    let next = tokio::time::timeout(Duration::from_secs(1), feed.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, sent.id);
}

#[tokio::test]
async fn malformed_identity_is_a_bad_request() {
    let h = harness();
    let mut state = RateLimitState::default();

    let mut bad_channel = draft("hello world");
    bad_channel.channel = "Lobby!".into();
    let err = h.composer.send(&mut state, bad_channel).await.unwrap_err();
    assert_eq!(err.reason(), "bad_request");

    let mut bad_user = draft("hello world");
    bad_user.username = "<img>".into();
    let err = h.composer.send(&mut state, bad_user).await.unwrap_err();
    assert_eq!(err.reason(), "bad_request");
    assert!(h.store.is_empty());
}
