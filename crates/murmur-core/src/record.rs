//! Chat message records as exchanged with the storage collaborator.

use serde::{Deserialize, Serialize};

/// Quoted message a reply refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyRef {
    pub message_id: String,
    pub content: String,
    pub username: String,
}

impl ReplyRef {
    /// Copy of this reference whose quoted content is cut to `max_chars`
    /// characters plus `...`.
    pub fn with_preview(&self, max_chars: usize) -> ReplyRef {
        ReplyRef {
            message_id: self.message_id.clone(),
            content: preview(&self.content, max_chars),
            username: self.username.clone(),
        }
    }
}

/// Fields of a record about to be appended. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub channel: String,
    pub username: String,
    pub content: String,
    pub created_at_ms: u64,
    pub expire_at_ms: Option<u64>,
    pub reply_to: Option<ReplyRef>,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub channel: String,
    pub username: String,
    pub content: String,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at_ms: Option<u64>,
    pub reported: bool,
    pub report_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
}

impl MessageRecord {
    pub fn from_new(id: String, new: NewRecord) -> Self {
        Self {
            id,
            channel: new.channel,
            username: new.username,
            content: new.content,
            created_at_ms: new.created_at_ms,
            expire_at_ms: new.expire_at_ms,
            reported: false,
            report_count: 0,
            reply_to: new.reply_to,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expire_at_ms, Some(at) if at <= now_ms)
    }
}

/// Counter fields a store can increment atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    ReportCount,
}

/// Boolean flags a store can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagField {
    Reported,
}

/// Drop expired records and order the rest oldest first (ties by id).
///
/// The store's own TTL sweep is lazy, so readers must apply this before
/// display.
pub fn visible(records: impl IntoIterator<Item = MessageRecord>, now_ms: u64) -> Vec<MessageRecord> {
    let mut out: Vec<MessageRecord> = records
        .into_iter()
        .filter(|r| !r.is_expired(now_ms))
        .collect();
    out.sort_by(|a, b| {
        a.created_at_ms
            .cmp(&b.created_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}

/// When a reported message gets flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPolicy {
    pub threshold: u64,
}

impl ReportPolicy {
    pub fn should_flag(&self, report_count: u64) -> bool {
        report_count >= self.threshold.max(1)
    }
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut out: String = content.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
