use std::time::Duration;

/// Status codes that are worth another attempt
pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// How a failure should be treated by the retrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Another attempt may succeed.
    ///
    /// `retry_after` carries a server-provided wait hint when one exists.
    Retryable { retry_after: Option<Duration> },

    /// The failure is final; stop immediately.
    Fatal,
}

impl Classification {
    pub fn retryable() -> Self {
        Self::Retryable { retry_after: None }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Errors that know whether retrying them makes sense
pub trait Classify {
    fn classify(&self) -> Classification;
}

/// Successful results that may still carry an HTTP-style status code
pub trait ResponseStatus {
    fn status_code(&self) -> Option<u16>;
}

/// Classifies a response status code
///
/// # Returns
///
/// * `None` - The status is not an error
/// * `Some(Retryable)` - One of [`RETRYABLE_STATUS_CODES`]
/// * `Some(Fatal)` - Any other 4xx or 5xx status
pub fn classify_status(status: u16) -> Option<Classification> {
    if RETRYABLE_STATUS_CODES.contains(&status) {
        Some(Classification::retryable())
    } else if status >= 400 {
        Some(Classification::Fatal)
    } else {
        None
    }
}

/// Exponential backoff parameters for one retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        // A shrinking or undefined factor degrades to a constant delay
        let backoff_multiplier = if backoff_multiplier.is_finite() && backoff_multiplier >= 1.0 {
            backoff_multiplier
        } else {
            1.0
        };

        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay to wait after the failed attempt with zero-based index `attempt`
    ///
    /// Computed as `min(initial_delay * backoff_multiplier^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
        }
    }

    /// Delay actually slept, honouring a server hint but never exceeding `max_delay`
    pub fn sleep_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        match retry_after {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(1), Duration::from_secs(60), 2.0)
    }
}
