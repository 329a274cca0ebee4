//! Per-user, per-kind submission throttle.
//!
//! Sliding window: each `(user, kind)` pair keeps the timestamps of its
//! accepted submissions inside the last `window`. A submission is refused
//! once the window holds `limit_for(kind)` entries. Refused submissions are
//! not recorded, so a throttled user recovers as soon as the oldest entry
//! ages out.

use arx_core::OperationKind;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Throttle configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    /// Cap for kinds without an entry in `limits`.
    pub default_limit: usize,
    pub limits: HashMap<OperationKind, usize>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let limits = HashMap::from([
            (OperationKind::Insert, 10),
            (OperationKind::Update, 50),
            (OperationKind::Delete, 5),
            (OperationKind::Move, 30),
            (OperationKind::Resize, 30),
        ]);
        Self {
            window: Duration::from_secs(60),
            default_limit: 20,
            limits,
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, kind: OperationKind) -> usize {
        self.limits.get(&kind).copied().unwrap_or(self.default_limit)
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A refusal, with how long until the next slot frees up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttled {
    pub limit: usize,
    pub retry_after_ms: u64,
}

/// Sliding-window counters for one session.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<(String, OperationKind), VecDeque<u64>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission at `now`, or refuse it if the window is full.
    pub fn check(
        &mut self,
        user_id: &str,
        kind: OperationKind,
        now: u64,
        config: &RateLimitConfig,
    ) -> Result<(), Throttled> {
        let window_ms = config.window_ms();
        let limit = config.limit_for(kind);
        let stamps = self.windows.entry((user_id.to_string(), kind)).or_default();

        while stamps.front().is_some_and(|t| now.saturating_sub(*t) >= window_ms) {
            stamps.pop_front();
        }

        if stamps.len() >= limit {
            let retry_after_ms = stamps
                .front()
                .map_or(window_ms, |oldest| oldest.saturating_add(window_ms).saturating_sub(now));
            return Err(Throttled { limit, retry_after_ms });
        }

        stamps.push_back(now);
        Ok(())
    }

    /// Drop windows with nothing left inside them. Returns how many went.
    pub fn prune(&mut self, now: u64, config: &RateLimitConfig) -> usize {
        let window_ms = config.window_ms();
        let before = self.windows.len();
        self.windows
            .retain(|_, stamps| stamps.back().is_some_and(|t| now.saturating_sub(*t) < window_ms));
        before - self.windows.len()
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
