//! Bounded exponential backoff for polling a claim that is still pending.
//!
//! Unlike an open-ended retry loop, a [`BackoffPolicy`] has a total wait
//! budget: the delays it schedules never add up to more than
//! [`BackoffPolicy::budget`]. The coordinator requires that budget to be
//! strictly shorter than the claim TTL.
//!
//! # Example
//!
//! ```rust
//! use table_orders_runtime::backoff::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::builder()
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(1))
//!     .multiplier(2.0)
//!     .budget(Duration::from_secs(3))
//!     .build();
//!
//! let total: Duration = policy.schedule().sum();
//! assert_eq!(total, Duration::from_secs(3));
//! ```

use std::time::Duration;

/// Backoff configuration for waiting on a pending claim.
///
/// # Default Values
///
/// - `initial_delay`: 50ms
/// - `max_delay`: 1 second
/// - `multiplier`: 2.0 (delay doubles each poll)
/// - `budget`: 10 seconds of total waiting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the second poll
    pub initial_delay: Duration,
    /// Maximum delay between polls (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Total time spent sleeping before giving up on the claim
    pub budget: Duration,
}

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_BUDGET: Duration = Duration::from_secs(10);

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackoffPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> BackoffPolicyBuilder {
        BackoffPolicyBuilder {
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            budget: None,
        }
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = initial_delay * (multiplier ^ attempt)
    /// Capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.multiplier.powi(attempt.min(64) as i32);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    /// The sequence of sleeps this policy allows, last one trimmed to the
    /// remaining budget.
    #[must_use]
    pub const fn schedule(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
            slept: Duration::ZERO,
        }
    }
}

/// Builder for [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct BackoffPolicyBuilder {
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    budget: Option<Duration>,
}

impl BackoffPolicyBuilder {
    /// Set delay before the second poll.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff. Values below 1.0 are raised to 1.0.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the total waiting budget.
    #[must_use]
    pub const fn budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Build the [`BackoffPolicy`].
    #[must_use]
    pub fn build(self) -> BackoffPolicy {
        let multiplier = self.multiplier.unwrap_or(DEFAULT_MULTIPLIER);
        BackoffPolicy {
            initial_delay: self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY),
            max_delay: self.max_delay.unwrap_or(DEFAULT_MAX_DELAY),
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { DEFAULT_MULTIPLIER },
            budget: self.budget.unwrap_or(DEFAULT_BUDGET),
        }
    }
}

/// Iterator over the sleeps of one wait, produced by [`BackoffPolicy::schedule`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    slept: Duration,
}

impl Backoff {
    /// Time already handed out by this schedule.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.slept
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let remaining = self.policy.budget.saturating_sub(self.slept);
        if remaining.is_zero() {
            return None;
        }

        let delay = self.policy.delay_for_attempt(self.attempt).min(remaining);
        if delay.is_zero() {
            return None;
        }

        self.attempt = self.attempt.saturating_add(1);
        self.slept += delay;
        Some(delay)
    }
}
