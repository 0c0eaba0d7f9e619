// Retry strategies for transient store failures during a sweep

use rand::Rng;
use std::time::Duration;

/// Default ceiling on retry attempts
pub const MAX_RETRIES: u32 = 5;

/// Strategy for spacing retry attempts
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt, `None` once retries are exhausted
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries()
    }

    fn max_retries(&self) -> u32 {
        MAX_RETRIES
    }
}

/// Exponential backoff with jitter.
///
/// Sequence without jitter: 2s, 4s, 8s, 16s, ... capped at `max_delay_secs`.
/// Jitter spreads concurrent sweepers so they do not hammer a recovering
/// store in lockstep.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_secs: u64,
    max_delay_secs: u64,
    /// 0.0 to 1.0, fraction of the base delay added as random jitter
    jitter_factor: f64,
    max_retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_secs: 2,
            max_delay_secs: 300,
            jitter_factor: 0.1,
            max_retries: MAX_RETRIES,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(
        base_delay_secs: u64,
        max_delay_secs: u64,
        jitter_factor: f64,
        max_retries: u32,
    ) -> Self {
        Self {
            base_delay_secs,
            max_delay_secs,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_retries,
        }
    }

    fn base_delay(&self, attempt: u32) -> u64 {
        let delay = self
            .base_delay_secs
            .saturating_mul(2_u64.saturating_pow(attempt));
        delay.min(self.max_delay_secs)
    }

    fn with_jitter_ms(&self, base_delay_secs: u64) -> u64 {
        let base_ms = base_delay_secs * 1000;
        let jitter_range_ms = (base_ms as f64 * self.jitter_factor) as u64;
        if jitter_range_ms == 0 {
            return base_ms;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=jitter_range_ms);
        base_ms + jitter_ms
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(Duration::from_millis(
            self.with_jitter_ms(self.base_delay(attempt)),
        ))
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Fixed delay between attempts, mostly for per-post retries and tests
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_retries: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: MAX_RETRIES,
        }
    }

    pub fn with_max_retries(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(self.delay)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
