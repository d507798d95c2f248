use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use murmur_core::clock::Clock;
use murmur_core::content::{admit, ValidationOptions};
use murmur_core::error::{MurmurError, Result};
use murmur_core::ratelimit::{RateLimitState, RateLimiter};
use murmur_core::record::{
    self, CounterField, FlagField, MessageRecord, NewRecord, ReplyRef, ReportPolicy,
};

use crate::attest::AttestationMiddleware;
use crate::config::{GatewayConfig, MessagesSection};
use crate::obs::GatewayMetrics;
use crate::store::MessageStore;

pub const SEND_OPERATION: &str = "send_message";
pub const REPORT_OPERATION: &str = "report_message";

const MAX_USERNAME_CHARS: usize = 40;
const MAX_CHANNEL_LEN: usize = 32;

/// One outbound message as typed by the user.
#[derive(Debug, Clone)]
pub struct Draft {
    pub channel: String,
    pub username: String,
    pub content: String,
    /// Id of the message being replied to.
    pub reply_to: Option<String>,
}

/// An accepted, stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub id: String,
    /// The normalized text that was actually stored.
    pub content: String,
    pub expire_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reported {
    pub report_count: u64,
    pub reported: bool,
}

pub struct Composer {
    content: ValidationOptions,
    limiter: RateLimiter,
    attestation: AttestationMiddleware,
    enforce: bool,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    messages: MessagesSection,
    metrics: Arc<GatewayMetrics>,
}

impl Composer {
    pub fn new(
        cfg: &GatewayConfig,
        attestation: AttestationMiddleware,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<GatewayMetrics>,
    ) -> Result<Self> {
        cfg.content.validate()?;
        Ok(Self {
            content: cfg.content.clone(),
            limiter: RateLimiter::new(cfg.rate_limit)?,
            attestation,
            enforce: cfg.attestation.enforce,
            store,
            clock,
            messages: cfg.messages.clone(),
            metrics,
        })
    }

    pub fn attestation(&self) -> &AttestationMiddleware {
        &self.attestation
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Run one send attempt for the session owning `state`.
    ///
    /// Order: cooldown gate, content admission, burst accounting,
    /// attestation, storage. `state` only changes when the attempt passes
    /// content admission: either the cooldown is armed, or the attempt is
    /// counted just before the write.
    pub async fn send(&self, state: &mut RateLimitState, draft: Draft) -> Result<Sent> {
        validate_channel(&draft.channel)?;
        validate_username(&draft.username)?;

        let now = self.clock.now_ms();

        if let Err(e) = self.limiter.gate(state, now).into_result() {
            return Err(self.rejected("rate", e));
        }

        let content = match admit(&draft.content, &self.content).into_result() {
            Ok(c) => c,
            Err(e) => return Err(self.rejected("content", e)),
        };

        let reply_to = match &draft.reply_to {
            Some(id) => match self.reply_ref(&draft.channel, id, now).await {
                Ok(r) => Some(r),
                Err(e) => return Err(self.rejected("reply", e)),
            },
            None => None,
        };

        let (next, decision) = self.limiter.transition(state, now);
        if let Err(e) = decision.into_result() {
            // the attempt that trips the burst limit arms the cooldown
            *state = next;
            return Err(self.rejected("rate", e));
        }

        if self.enforce {
            if let Err(e) = self.attestation.enforce(SEND_OPERATION).await {
                return Err(self.rejected("attestation", e));
            }
        }

        *state = next;

        let created_at_ms = self.clock.now_ms();
        let expire_at_ms = created_at_ms.saturating_add(self.messages.ttl_ms);
        let new = NewRecord {
            channel: draft.channel,
            username: draft.username,
            content: content.clone(),
            created_at_ms,
            expire_at_ms: Some(expire_at_ms),
            reply_to,
        };

        match self.store.append_record(new).await {
            Ok(id) => {
                self.metrics.admission("accepted", "ok");
                tracing::debug!(%id, "message stored");
                Ok(Sent {
                    id,
                    content,
                    expire_at_ms,
                })
            }
            Err(e) => {
                tracing::warn!(error=?e, "message write failed");
                Err(self.rejected("storage", storage_error(e)))
            }
        }
    }

    /// Count a report against `record_id`; the message is flagged once the
    /// count reaches the configured threshold.
    pub async fn report(&self, record_id: &str) -> Result<Reported> {
        if self.enforce {
            if let Err(e) = self.attestation.enforce(REPORT_OPERATION).await {
                self.metrics.reports.inc(&[("outcome", "failed")]);
                return Err(e);
            }
        }

        let policy = ReportPolicy {
            threshold: self.messages.report_threshold,
        };

        let outcome = async {
            let count = self
                .store
                .increment_counter_field(record_id, CounterField::ReportCount)
                .await?;
            let flag = policy.should_flag(count);
            if flag {
                self.store
                    .set_flag(record_id, FlagField::Reported, true)
                    .await?;
            }
            Ok::<_, MurmurError>(Reported {
                report_count: count,
                reported: flag,
            })
        }
        .await
        .map_err(storage_error);

        let label = match &outcome {
            Ok(r) if r.reported => "flagged",
            Ok(_) => "counted",
            Err(_) => "failed",
        };
        self.metrics.reports.inc(&[("outcome", label)]);
        outcome
    }

    /// Non-expired records of `channel`, oldest first.
    pub async fn history(&self, channel: &str) -> Result<Vec<MessageRecord>> {
        validate_channel(channel)?;
        let records = self
            .store
            .list_channel(channel)
            .await
            .map_err(storage_error)?;
        Ok(record::visible(records, self.clock.now_ms()))
    }

    /// Live, expiry-filtered snapshots of `channel`.
    pub fn feed(&self, channel: &str) -> Result<BoxStream<'static, Vec<MessageRecord>>> {
        validate_channel(channel)?;
        let clock = Arc::clone(&self.clock);
        Ok(self
            .store
            .subscribe(channel)
            .map(move |snapshot| record::visible(snapshot, clock.now_ms()))
            .boxed())
    }

    async fn reply_ref(&self, channel: &str, id: &str, now_ms: u64) -> Result<ReplyRef> {
        let original = self
            .store
            .get(id)
            .await
            .map_err(storage_error)?
            .filter(|r| r.channel == channel && !r.is_expired(now_ms))
            .ok_or_else(|| MurmurError::NotFound(format!("reply target {id}")))?;

        Ok(ReplyRef {
            message_id: original.id,
            content: original.content,
            username: original.username,
        }
        .with_preview(self.messages.reply_preview_chars))
    }

    fn rejected(&self, stage: &str, e: MurmurError) -> MurmurError {
        self.metrics.admission(stage, e.reason());
        if e.is_attestation() {
            tracing::warn!(stage, reason = e.reason(), error=%e, "send blocked");
        } else {
            tracing::debug!(stage, reason = e.reason(), "send rejected");
        }
        e
    }
}

fn storage_error(e: MurmurError) -> MurmurError {
    match e {
        MurmurError::NotFound(_) | MurmurError::Storage(_) => e,
        other => MurmurError::Storage(other.to_string()),
    }
}

fn validate_channel(channel: &str) -> Result<()> {
    let ok = !channel.is_empty()
        && channel.len() <= MAX_CHANNEL_LEN
        && channel
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if !ok {
        return Err(MurmurError::BadRequest(format!(
            "channel must be 1-{MAX_CHANNEL_LEN} characters of [a-z0-9_-]"
        )));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    let ok = username.trim() == username
        && (1..=MAX_USERNAME_CHARS).contains(&len)
        && !username.chars().any(|c| c.is_control() || c == '<' || c == '>');
    if !ok {
        return Err(MurmurError::BadRequest(format!(
            "username must be 1-{MAX_USERNAME_CHARS} printable characters without markup"
        )));
    }
    Ok(())
}
