use std::time::Duration;

use rand::Rng;

/// Source of campaign wait times under contention.
///
/// `failures` counts the campaigns lost in the current streak, starting at
/// zero for the first loss. The streak restarts whenever leadership is
/// acquired.
pub trait Backoff: Send + Sync {
    /// Wait before the next campaign.
    fn next(&self, failures: u32) -> Duration;

    /// Return to the base interval.
    fn reset(&self) {}
}

/// Same delay each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    /// Create a fixed backoff.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for FixedBackoff {
    fn next(&self, _failures: u32) -> Duration {
        self.delay
    }
}

/// Delay doubles with every lost campaign, up to a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    /// Create an exponential backoff starting at `base`, never exceeding `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Starting delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound.
    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Backoff for ExponentialBackoff {
    fn next(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Adds up to 50% random extra delay on top of another strategy, so
/// contenders that lost together do not retry together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jittered<B> {
    inner: B,
}

impl<B: Backoff> Jittered<B> {
    /// Wrap a strategy.
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

impl<B: Backoff> Backoff for Jittered<B> {
    fn next(&self, failures: u32) -> Duration {
        let delay = self.inner.next(failures);
        let spread = (delay.as_millis() / 2) as u64;
        if spread == 0 {
            return delay;
        }

        let jitter = rand::rng().random_range(0..=spread);
        delay + Duration::from_millis(jitter)
    }

    fn reset(&self) {
        self.inner.reset();
    }
}
