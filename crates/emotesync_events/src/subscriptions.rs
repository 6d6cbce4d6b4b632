#![forbid(unsafe_code)]

use std::collections::HashSet;

use emotesync_domain::ChatroomRegistration;

use crate::protocol::{EventWildcard, SubscriptionKey};

/// Keys already sent upstream during the current connection lifetime.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
	sent: HashSet<SubscriptionKey>,
}

impl SubscriptionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `send` and records `key` unless it was already recorded.
	///
	/// Returns `true` only when `send` ran.
	pub fn ensure_subscribed<F>(&mut self, key: &SubscriptionKey, send: F) -> bool
	where
		F: FnOnce(),
	{
		if self.sent.contains(key) {
			return false;
		}
		send();
		self.sent.insert(key.clone());
		true
	}

	/// Drops `key`, returning whether it was recorded.
	pub fn forget(&mut self, key: &SubscriptionKey) -> bool {
		self.sent.remove(key)
	}

	pub fn contains(&self, key: &SubscriptionKey) -> bool {
		self.sent.contains(key)
	}

	pub fn len(&self) -> usize {
		self.sent.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sent.is_empty()
	}

	/// Forget everything; called on every disconnect.
	pub fn clear(&mut self) {
		self.sent.clear();
	}
}

pub fn user_key(reg: &ChatroomRegistration) -> Option<SubscriptionKey> {
	reg.has_provider_user()
		.then(|| SubscriptionKey::new(EventWildcard::User, reg.provider_user_id.trim()))
}

/// `cosmetic.*` and `entitlement.*` keys scoped to the chatroom's channel.
pub fn channel_keys(reg: &ChatroomRegistration) -> Vec<SubscriptionKey> {
	if !reg.has_channel() {
		return Vec::new();
	}
	let channel_id = reg.channel_id.trim();
	vec![
		SubscriptionKey::new(EventWildcard::Cosmetic, channel_id),
		SubscriptionKey::new(EventWildcard::Entitlement, channel_id),
	]
}

pub fn emote_set_key(reg: &ChatroomRegistration) -> Option<SubscriptionKey> {
	reg.has_emote_set()
		.then(|| SubscriptionKey::new(EventWildcard::EmoteSet, reg.provider_emote_set_id.trim()))
}

/// Every key a registration implies, user key included.
pub fn keys_for(reg: &ChatroomRegistration) -> Vec<SubscriptionKey> {
	let mut keys = Vec::with_capacity(4);
	keys.extend(user_key(reg));
	keys.extend(channel_keys(reg));
	keys.extend(emote_set_key(reg));
	keys
}
