//! Storage collaborator port.
//!
//! The real-time document store is external; murmur only appends records,
//! bumps counters, flips flags and subscribes to a channel. Durability and
//! the expiry sweep are the store's job.

pub mod memory;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use murmur_core::error::Result;
use murmur_core::record::{CounterField, FlagField, MessageRecord, NewRecord};

pub use memory::InMemoryStore;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a record; returns the id the store assigned.
    async fn append_record(&self, record: NewRecord) -> Result<String>;

    /// Atomically add one to a counter field; returns the new value.
    async fn increment_counter_field(&self, record_id: &str, field: CounterField) -> Result<u64>;

    async fn set_flag(&self, record_id: &str, field: FlagField, value: bool) -> Result<()>;

    async fn get(&self, record_id: &str) -> Result<Option<MessageRecord>>;

    /// Records of one channel, oldest first, expired ones included.
    async fn list_channel(&self, channel: &str) -> Result<Vec<MessageRecord>>;

    /// Live view of one channel: the current snapshot first, then a fresh
    /// snapshot after every change in that channel. Snapshots are ordered
    /// oldest first but NOT filtered for expiry.
    fn subscribe(&self, channel: &str) -> BoxStream<'static, Vec<MessageRecord>>;
}
