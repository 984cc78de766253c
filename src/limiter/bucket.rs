use std::time::Duration;
use tokio::time::Instant;

/// Slowest refill rate a bucket will use, in tokens per second
pub const MIN_RATE_PER_SECOND: f64 = 0.001;

/// Token bucket guarding one logical endpoint
///
/// Tokens refill lazily on every access, so the bucket never needs a
/// background task. The token count always stays within `[0, capacity]`.
#[derive(Debug, Clone)]
pub struct RateBucket {
    /// Logical endpoint this bucket guards
    pub endpoint_key: String,

    /// Tokens added per second
    pub rate_per_second: f64,

    /// Maximum number of tokens held
    pub capacity: f64,

    current_tokens: f64,
    last_refill: Instant,
}

impl RateBucket {
    /// Creates a full bucket
    ///
    /// A rate that is not a positive number is raised to
    /// [`MIN_RATE_PER_SECOND`]; an unusable capacity becomes one token.
    pub fn new(endpoint_key: impl Into<String>, rate_per_second: f64, capacity: f64, now: Instant) -> Self {
        let rate_per_second = if rate_per_second.is_finite() && rate_per_second > 0.0 {
            rate_per_second.max(MIN_RATE_PER_SECOND)
        } else {
            MIN_RATE_PER_SECOND
        };
        let capacity = if capacity.is_finite() && capacity > 0.0 { capacity } else { 1.0 };

        Self {
            endpoint_key: endpoint_key.into(),
            rate_per_second,
            capacity,
            current_tokens: capacity,
            last_refill: now,
        }
    }

    /// Adds the tokens accrued since the last refill, capped at capacity
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.current_tokens = (self.current_tokens + elapsed * self.rate_per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempts to debit `tokens` from the bucket
    ///
    /// # Arguments
    ///
    /// * `tokens` - Number of tokens to debit; must not exceed capacity
    /// * `now` - The current instant
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The tokens were debited
    /// * `Err(Duration)` - Time until enough tokens will have accrued
    pub fn try_acquire(&mut self, tokens: f64, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.current_tokens >= tokens {
            self.current_tokens -= tokens;
            return Ok(());
        }

        let missing = tokens - self.current_tokens;
        let wait = Duration::try_from_secs_f64(missing / self.rate_per_second).unwrap_or(Duration::MAX);
        Err(wait.max(Duration::from_nanos(1)))
    }

    /// Returns the token count as of the last refill
    pub fn current_tokens(&self) -> f64 {
        self.current_tokens
    }

    /// Returns the token count as of `now` without debiting anything
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.current_tokens
    }
}
