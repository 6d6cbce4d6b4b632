#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{Context as _, anyhow};
use emotesync_domain::Platform;
use url::Url;

use crate::backoff::ReconnectPolicy;

pub const DEFAULT_EVENT_API_URL: &str = "wss://events.7tv.io/v3";

/// Provider connection settings.
#[derive(Debug, Clone)]
pub struct EventClientConfig {
	pub endpoint: String,
	/// Platform named in channel-scoped subscription conditions.
	pub platform: Platform,
	pub reconnect: ReconnectPolicy,
	/// Wait between socket open and the first subscription pass; the provider
	/// rejects subscriptions sent immediately after open.
	pub post_open_settle: Duration,
}

impl Default for EventClientConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_EVENT_API_URL.to_string(),
			platform: Platform::Kick,
			reconnect: ReconnectPolicy::default(),
			post_open_settle: Duration::from_millis(1000),
		}
	}
}

impl EventClientConfig {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			endpoint: endpoint.into(),
			..Self::default()
		}
	}

	/// Parsed endpoint; only `ws://` and `wss://` are accepted.
	pub fn endpoint_url(&self) -> anyhow::Result<Url> {
		validate_endpoint(&self.endpoint)
	}
}

pub fn validate_endpoint(endpoint: &str) -> anyhow::Result<Url> {
	let url = Url::parse(endpoint.trim()).with_context(|| format!("invalid event api endpoint: {endpoint}"))?;
	match url.scheme() {
		"ws" | "wss" => Ok(url),
		other => Err(anyhow!("unsupported event api scheme {other:?} (expected ws or wss)")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_provider_reference_values() {
		let cfg = EventClientConfig::default();
		assert_eq!(cfg.endpoint, DEFAULT_EVENT_API_URL);
		assert_eq!(cfg.platform, Platform::Kick);
		assert_eq!(cfg.post_open_settle, Duration::from_millis(1000));
		assert_eq!(cfg.reconnect.delay_for(1), Duration::from_millis(1000));
		assert!(cfg.endpoint_url().is_ok());
	}

	#[test]
	fn endpoint_scheme_is_checked() {
		assert!(validate_endpoint("ws://127.0.0.1:9000/v3").is_ok());
		assert!(validate_endpoint("https://events.7tv.io/v3").is_err());
		assert!(validate_endpoint("not a url").is_err());
	}
}
