use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request-start limiter shared by every fetch attempt of a run.
///
/// Burst is fixed at one cell and the replenish period at `1s / rate`, so admissions
/// are spaced at least one period apart and no rolling one-second window admits more
/// than `rate` attempts.
pub struct RateLimiter {
    inner: DirectLimiter,
    per_second: NonZeroU32,
}

impl RateLimiter {
    pub fn per_second(per_second: NonZeroU32) -> Self {
        let period = Duration::from_secs(1) / per_second.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(per_second))
            .allow_burst(NonZeroU32::MIN);
        Self {
            inner: governor::RateLimiter::direct(quota),
            per_second,
        }
    }

    /// Wait until one attempt may start.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    pub fn rate(&self) -> u32 {
        self.per_second.get()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("per_second", &self.per_second)
            .finish()
    }
}
