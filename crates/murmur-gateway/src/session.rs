//! Per-session rate-limit state.
//!
//! Each session id owns one `RateLimitState` behind an async mutex. The
//! composer holds that mutex for the whole send, so attempts from one
//! session are evaluated strictly in order even when requests race.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use murmur_core::error::{MurmurError, Result};
use murmur_core::ratelimit::RateLimitState;

pub type SessionSlot = Arc<Mutex<RateLimitState>>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionSlot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Slot for `session_id`, created in the Open state on first use.
    pub fn slot(&self, session_id: &str) -> Result<SessionSlot> {
        validate_session_id(session_id)?;
        let slot = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RateLimitState::default())));
        Ok(Arc::clone(slot.value()))
    }

    /// Current state without waiting; `None` if unknown or mid-send.
    pub fn peek(&self, session_id: &str) -> Option<RateLimitState> {
        let slot = self.sessions.get(session_id)?.value().clone();
        let state = slot.try_lock().ok().map(|g| *g);
        state
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Forget sessions idle for longer than `idle_ms` and not cooling down.
    /// Sessions with a send in progress are kept, including one whose slot
    /// was handed out by [`slot`](Self::slot) but not locked yet.
    pub fn evict_idle(&self, now_ms: u64, idle_ms: u64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            // The shard write lock excludes `slot()`, so this count is stable here.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => {
                    state.in_cooldown(now_ms)
                        || now_ms.saturating_sub(state.last_submit_ms) <= idle_ms
                }
                Err(_) => true,
            }
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::debug!(evicted, "idle sessions evicted");
        }
        evicted
    }
}

fn validate_session_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !ok {
        return Err(MurmurError::BadRequest(
            "session id must be 1-64 characters of [A-Za-z0-9_-]".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slot_is_shared_per_session() {
        let reg = SessionRegistry::new();
        let a = reg.slot("tab-1").unwrap();
        a.lock().await.count_in_window = 2;

        let again = reg.slot("tab-1").unwrap();
        assert_eq!(again.lock().await.count_in_window, 2);
        assert_eq!(reg.slot("tab-2").unwrap().lock().await.count_in_window, 0);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn rejects_odd_session_ids() {
        let reg = SessionRegistry::new();
        assert!(reg.slot("").is_err());
        assert!(reg.slot("has space").is_err());
        assert!(reg.slot(&"x".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn evicts_only_idle_sessions() {
        let reg = SessionRegistry::new();
        reg.slot("idle").unwrap().lock().await.last_submit_ms = 1_000;
        reg.slot("fresh").unwrap().lock().await.last_submit_ms = 99_000;
        {
            let cooling = reg.slot("cooling").unwrap();
            let mut s = cooling.lock().await;
            s.last_submit_ms = 1_000;
            s.cooldown_until_ms = 200_000;
        }

        assert_eq!(reg.evict_idle(100_000, 10_000), 1);
        assert!(reg.peek("idle").is_none());
        assert!(reg.peek("fresh").is_some());
        assert!(reg.peek("cooling").is_some());
    }

    #[tokio::test]
    async fn handed_out_slot_survives_eviction() {
        let reg = SessionRegistry::new();
        let held = reg.slot("tab").unwrap();

        assert_eq!(reg.evict_idle(1_000_000, 10_000), 0);
        let again = reg.slot("tab").unwrap();
        assert!(Arc::ptr_eq(&held, &again));

        let guard = held.lock().await;
        assert!(again.try_lock().is_err());
        drop(again);
        drop(guard);
        drop(held);

        assert_eq!(reg.evict_idle(1_000_000, 10_000), 1);
        assert!(reg.is_empty());
    }
}
