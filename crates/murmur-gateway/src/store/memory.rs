use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use murmur_core::error::{MurmurError, Result};
use murmur_core::record::{CounterField, FlagField, MessageRecord, NewRecord};

use super::MessageStore;

const CHANGE_QUEUE: usize = 256;

/// Process-local reference store: records in a `DashMap`, change
/// notifications over a broadcast channel carrying the channel key.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    records: DashMap<String, MessageRecord>,
    seq: AtomicU64,
    changes: broadcast::Sender<String>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_QUEUE);
        Self {
            inner: Arc::new(StoreInner {
                records: DashMap::new(),
                seq: AtomicU64::new(1),
                changes,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Delete records whose `expire_at` has passed (the TTL sweep a hosted
    /// store runs on its own). Returns how many were removed.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut touched: Vec<String> = Vec::new();
        self.inner.records.retain(|_, r| {
            let keep = !r.is_expired(now_ms);
            if !keep {
                touched.push(r.channel.clone());
            }
            keep
        });
        let removed = touched.len();
        touched.sort();
        touched.dedup();
        for ch in touched {
            self.inner.notify(ch);
        }
        removed
    }
}

impl StoreInner {
    fn snapshot(&self, channel: &str) -> Vec<MessageRecord> {
        let mut out: Vec<MessageRecord> = self
            .records
            .iter()
            .filter(|r| r.value().channel == channel)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    fn notify(&self, channel: String) {
        // No subscribers is not an error.
        let _ = self.changes.send(channel);
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append_record(&self, record: NewRecord) -> Result<String> {
        let n = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("m{n:012}");
        let channel = record.channel.clone();
        self.inner
            .records
            .insert(id.clone(), MessageRecord::from_new(id.clone(), record));
        self.inner.notify(channel);
        Ok(id)
    }

    async fn increment_counter_field(&self, record_id: &str, field: CounterField) -> Result<u64> {
        let (value, channel) = {
            let mut rec = self
                .inner
                .records
                .get_mut(record_id)
                .ok_or_else(|| MurmurError::NotFound(format!("message {record_id}")))?;
            let value = match field {
                CounterField::ReportCount => {
                    rec.report_count = rec.report_count.saturating_add(1);
                    rec.report_count
                }
            };
            (value, rec.channel.clone())
        };
        self.inner.notify(channel);
        Ok(value)
    }

    async fn set_flag(&self, record_id: &str, field: FlagField, value: bool) -> Result<()> {
        let channel = {
            let mut rec = self
                .inner
                .records
                .get_mut(record_id)
                .ok_or_else(|| MurmurError::NotFound(format!("message {record_id}")))?;
            match field {
                FlagField::Reported => rec.reported = value,
            }
            rec.channel.clone()
        };
        self.inner.notify(channel);
        Ok(())
    }

    async fn get(&self, record_id: &str) -> Result<Option<MessageRecord>> {
        Ok(self.inner.records.get(record_id).map(|r| r.value().clone()))
    }

    async fn list_channel(&self, channel: &str) -> Result<Vec<MessageRecord>> {
        Ok(self.inner.snapshot(channel))
    }

    fn subscribe(&self, channel: &str) -> BoxStream<'static, Vec<MessageRecord>> {
        let inner = Arc::clone(&self.inner);
        let rx = inner.changes.subscribe();
        let channel = channel.to_string();
        let first = inner.snapshot(&channel);

        let updates = stream::unfold((inner, rx, channel), |(inner, mut rx, channel)| async move {
            loop {
                match rx.recv().await {
                    Ok(changed) if changed == channel => break,
                    Ok(_) => continue,
                    // Missed notifications: resend the full snapshot.
                    Err(RecvError::Lagged(_)) => break,
                    Err(RecvError::Closed) => return None,
                }
            }
            let snap = inner.snapshot(&channel);
            Some((snap, (inner, rx, channel)))
        });

        stream::once(async move { first }).chain(updates).boxed()
    }
}
