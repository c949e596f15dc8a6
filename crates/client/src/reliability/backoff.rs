//! Exponential backoff supplier

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Computes the next retry delay from the previous one
///
/// `next = clamp(previous * factor, min, max)`, then a uniform jitter of
/// `± next * jitter_factor` is applied and the result rounded to whole
/// milliseconds. Feeding the output back in yields a sequence that grows from
/// `min_delay` and saturates at `max_delay`.
///
/// # Example
///
/// ```
/// use jobflow_client::reliability::ExponentialBackoff;
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .min_delay(Duration::from_millis(50))
///     .max_delay(Duration::from_secs(1))
///     .backoff_factor(1.6)
///     .jitter_factor(0.0)
///     .build();
///
/// assert_eq!(backoff.next_delay(Duration::ZERO), Duration::from_millis(50));
/// assert_eq!(backoff.next_delay(Duration::from_millis(50)), Duration::from_millis(80));
/// ```
#[derive(Debug)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter_factor: f64,
    rng: Mutex<StdRng>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExponentialBackoff {
    /// Create a builder with the default settings
    ///
    /// - 50ms minimum delay
    /// - 5 second maximum delay
    /// - 1.6x backoff factor
    /// - 10% jitter
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Compute the delay that follows `previous`
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let min = self.min_delay.as_secs_f64() * 1000.0;
        let max = self.max_delay.as_secs_f64() * 1000.0;
        let previous = previous.as_secs_f64() * 1000.0;

        let raw = (previous * self.backoff_factor).clamp(min, max);
        let window = raw * self.jitter_factor;

        let jitter = if window > 0.0 {
            self.rng.lock().gen_range(-window..=window)
        } else {
            0.0
        };

        let millis = (raw + jitter).max(0.0).round();
        Duration::from_millis(millis as u64)
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

/// Builder for [`ExponentialBackoff`]
#[derive(Debug)]
pub struct ExponentialBackoffBuilder {
    min_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter_factor: f64,
    rng: Option<StdRng>,
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_factor: 1.6,
            jitter_factor: 0.1,
            rng: None,
        }
    }
}

impl ExponentialBackoffBuilder {
    /// Set the smallest delay ever returned (before jitter)
    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Set the largest delay ever returned (before jitter)
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor applied to the previous delay
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(1.0);
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Use a specific random source, e.g. a seeded one in tests
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            min_delay: self.min_delay,
            max_delay: self.max_delay.max(self.min_delay),
            backoff_factor: self.backoff_factor,
            jitter_factor: self.jitter_factor,
            rng: Mutex::new(self.rng.unwrap_or_else(StdRng::from_entropy)),
        }
    }
}
