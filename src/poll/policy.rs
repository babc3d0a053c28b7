//! Backoff schedule for status polling.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, error::ConfigError};

/// Bounded exponential backoff with proportional jitter.
///
/// The delay before jitter for attempt `k` is `min(base_delay * 2^k, max_delay)`; jitter adds a
/// uniform sample from `[0, delay * jitter_fraction)`. None of the defaults reflect a
/// provider-guaranteed settlement time, so callers should tune them per product.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
	max_attempts: u32,
	base_delay: Duration,
	max_delay: Duration,
	jitter_fraction: f64,
}
impl RetryPolicy {
	/// Default number of pending answers tolerated before giving up.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
	/// Default first-step delay.
	pub const DEFAULT_BASE_DELAY: Duration = Duration::seconds(1);
	/// Default delay cap.
	pub const DEFAULT_MAX_DELAY: Duration = Duration::seconds(30);
	/// Default jitter fraction.
	pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;
	/// Largest accepted delay cap.
	pub const MAX_DELAY_LIMIT: Duration = Duration::hours(24);

	/// Creates a validated policy.
	///
	/// `base_delay` must be positive, `max_delay` must lie between it and
	/// [`MAX_DELAY_LIMIT`](Self::MAX_DELAY_LIMIT), and `jitter_fraction` must lie in `[0, 1]`.
	pub fn new(
		max_attempts: u32,
		base_delay: Duration,
		max_delay: Duration,
		jitter_fraction: f64,
	) -> Result<Self, ConfigError> {
		let invalid = |reason| Err(ConfigError::InvalidRetryPolicy { reason });

		if !base_delay.is_positive() {
			return invalid("base delay must be positive");
		}
		if max_delay < base_delay {
			return invalid("max delay must not be below the base delay");
		}
		if max_delay > Self::MAX_DELAY_LIMIT {
			return invalid("max delay must not exceed 24 hours");
		}
		if !(0.0..=1.0).contains(&jitter_fraction) {
			return invalid("jitter fraction must lie in [0, 1]");
		}

		Ok(Self { max_attempts, base_delay, max_delay, jitter_fraction })
	}

	/// Pending answers tolerated before the poller reports a timeout.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// First-step delay.
	pub fn base_delay(&self) -> Duration {
		self.base_delay
	}

	/// Delay cap.
	pub fn max_delay(&self) -> Duration {
		self.max_delay
	}

	/// Jitter fraction.
	pub fn jitter_fraction(&self) -> f64 {
		self.jitter_fraction
	}

	/// Delay before jitter for `attempt`: `min(base_delay * 2^attempt, max_delay)`.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		1_i32
			.checked_shl(attempt)
			.filter(|factor| factor.is_positive())
			.and_then(|factor| self.base_delay.checked_mul(factor))
			.map_or(self.max_delay, |delay| delay.min(self.max_delay))
	}

	/// Delay for `attempt` plus jitter derived from `sample`, a value in `[0, 1)`.
	pub fn jittered(&self, attempt: u32, sample: f64) -> Duration {
		let delay = self.delay_for(attempt);
		let sample = if sample.is_finite() { sample.clamp(0.0, 1.0) } else { 0.0 };

		delay + delay * (self.jitter_fraction * sample)
	}

	/// Delay for `attempt` with freshly sampled jitter.
	pub fn sample_delay(&self, attempt: u32) -> Duration {
		if self.jitter_fraction == 0.0 {
			return self.delay_for(attempt);
		}

		self.jittered(attempt, rand::rng().random_range(0.0..1.0))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::DEFAULT_MAX_DELAY,
			jitter_fraction: Self::DEFAULT_JITTER_FRACTION,
		}
	}
}
