//! Per-session submission rate limiter.
//!
//! Modeled as a pure transition `(state, now) -> (state', decision)`; the
//! owner of the session keeps the state and supplies the clock. Three
//! effective states:
//! - Open: no submission inside the burst window
//! - Bursting: `count_in_window` submissions recorded, at most `max_per_window`
//! - Cooldown: `now < cooldown_until`, every attempt is throttled
//!
//! This limiter is advisory. It shapes honest clients; it is not a security
//! boundary.

use serde::{Deserialize, Serialize};

use crate::error::{MurmurError, Result};

/// Limiter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitParams {
    #[serde(default = "default_burst_window_ms")]
    pub burst_window_ms: u64,
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for RateLimitParams {
    fn default() -> Self {
        Self {
            burst_window_ms: default_burst_window_ms(),
            max_per_window: default_max_per_window(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_burst_window_ms() -> u64 {
    120_000
}
fn default_max_per_window() -> u32 {
    3
}
fn default_cooldown_ms() -> u64 {
    30_000
}

/// Session-scoped limiter state (epoch milliseconds). Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    pub last_submit_ms: u64,
    pub count_in_window: u32,
    /// 0 when no cooldown was ever armed.
    pub cooldown_until_ms: u64,
}

impl RateLimitState {
    pub fn in_cooldown(&self, now_ms: u64) -> bool {
        now_ms < self.cooldown_until_ms
    }

    /// Whole seconds left in the cooldown, rounded up; 0 when not cooling down.
    pub fn remaining_cooldown_secs(&self, now_ms: u64) -> u64 {
        let left = self.cooldown_until_ms.saturating_sub(now_ms);
        left.div_ceil(1000)
    }
}

/// Decision for one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    /// `cooldown_armed` is true when this very attempt tripped the burst limit.
    Throttled {
        retry_after_secs: u64,
        cooldown_armed: bool,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            RateDecision::Allow => Ok(()),
            RateDecision::Throttled {
                retry_after_secs, ..
            } => Err(MurmurError::RateLimited { retry_after_secs }),
        }
    }
}

/// Stateless limiter: holds parameters only.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiter {
    params: RateLimitParams,
}

impl RateLimiter {
    pub fn new(params: RateLimitParams) -> Result<Self> {
        if params.max_per_window == 0 {
            return Err(MurmurError::BadRequest(
                "rate_limit.max_per_window must be at least 1".into(),
            ));
        }
        if params.cooldown_ms == 0 || params.burst_window_ms == 0 {
            return Err(MurmurError::BadRequest(
                "rate_limit.cooldown_ms and burst_window_ms must be positive".into(),
            ));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &RateLimitParams {
        &self.params
    }

    /// Cooldown check only. Never mutates.
    pub fn gate(&self, state: &RateLimitState, now_ms: u64) -> RateDecision {
        if state.in_cooldown(now_ms) {
            return RateDecision::Throttled {
                retry_after_secs: state.remaining_cooldown_secs(now_ms),
                cooldown_armed: false,
            };
        }
        RateDecision::Allow
    }

    /// Full transition for one attempt at `now_ms`.
    ///
    /// A throttled attempt during cooldown returns `state` unchanged. The
    /// attempt that would be the `(max + 1)`-th in the window is itself
    /// throttled and arms the cooldown.
    pub fn transition(
        &self,
        state: &RateLimitState,
        now_ms: u64,
    ) -> (RateLimitState, RateDecision) {
        if let throttled @ RateDecision::Throttled { .. } = self.gate(state, now_ms) {
            return (*state, throttled);
        }

        let count = if now_ms.saturating_sub(state.last_submit_ms) > self.params.burst_window_ms {
            1
        } else {
            state.count_in_window.saturating_add(1)
        };

        if count > self.params.max_per_window {
            let next = RateLimitState {
                last_submit_ms: state.last_submit_ms,
                count_in_window: 0,
                cooldown_until_ms: now_ms.saturating_add(self.params.cooldown_ms),
            };
            tracing::debug!(
                until_ms = next.cooldown_until_ms,
                "burst limit exceeded, cooldown armed"
            );
            return (
                next,
                RateDecision::Throttled {
                    retry_after_secs: next.remaining_cooldown_secs(now_ms),
                    cooldown_armed: true,
                },
            );
        }

        let next = RateLimitState {
            last_submit_ms: now_ms,
            count_in_window: count,
            cooldown_until_ms: state.cooldown_until_ms,
        };
        (next, RateDecision::Allow)
    }
}
