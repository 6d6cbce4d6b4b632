#![forbid(unsafe_code)]

use std::time::Duration;

/// Exponential reconnect delay: `start * 2^(min(attempt, max_steps) - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
	pub start_delay: Duration,
	pub max_steps: u32,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			start_delay: Duration::from_millis(1000),
			max_steps: 5,
		}
	}
}

impl ReconnectPolicy {
	pub fn new(start_delay: Duration, max_steps: u32) -> Self {
		Self { start_delay, max_steps }
	}

	/// Attempt `0` (a close with no preceding error) waits like attempt `1`.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let step = attempt.min(self.max_steps).max(1) - 1;
		let factor = 1u32.checked_shl(step).unwrap_or(u32::MAX);
		self.start_delay.saturating_mul(factor)
	}

	/// Largest delay the policy produces.
	pub fn max_delay(&self) -> Duration {
		self.delay_for(self.max_steps)
	}
}
