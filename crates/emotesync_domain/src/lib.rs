#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder the provider uses for "no id yet".
pub const UNSET_ID: &str = "0";

/// The provider's null object id (27 zeros). Means "no real id; see `ref_id`".
pub const NULL_OBJECT_ID: &str = "000000000000000000000000000";

/// Host chat platforms a chatroom can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
	Twitch,
	Kick,
	YouTube,
}

impl Platform {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Platform::Twitch => "twitch",
			Platform::Kick => "kick",
			Platform::YouTube => "youtube",
		}
	}

	/// Identifier used in provider subscription conditions.
	pub const fn provider_str(self) -> &'static str {
		match self {
			Platform::Twitch => "TWITCH",
			Platform::Kick => "KICK",
			Platform::YouTube => "YOUTUBE",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown platform: {0}")]
	UnknownPlatform(String),
}

impl FromStr for Platform {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"twitch" => Ok(Platform::Twitch),
			"kick" => Ok(Platform::Kick),
			"youtube" | "you_tube" | "yt" => Ok(Platform::YouTube),
			other => Err(ParseIdError::UnknownPlatform(other.to_string())),
		}
	}
}

/// Caller-supplied chatroom key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatroomId(String);

impl ChatroomId {
	/// Create a non-empty `ChatroomId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for ChatroomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for ChatroomId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ChatroomId::new(s.to_string())
	}
}

/// Host-platform channel id is usable (`"0"` and blank mean unknown).
pub fn is_valid_channel_id(id: &str) -> bool {
	let id = id.trim();
	!id.is_empty() && id != UNSET_ID
}

/// Provider user id is usable.
pub fn is_valid_user_id(id: &str) -> bool {
	let id = id.trim();
	!id.is_empty() && id != UNSET_ID && id != NULL_OBJECT_ID
}

/// Provider emote set id is usable (not `"0"`, not the null object id).
pub fn is_valid_emote_set_id(id: &str) -> bool {
	let id = id.trim();
	!id.is_empty() && id != UNSET_ID && id != NULL_OBJECT_ID
}

/// One logical chatroom sharing the provider connection.
///
/// Ids are fixed at creation. Invalid ids are accepted and only suppress the
/// matching subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatroomRegistration {
	pub chatroom_id: ChatroomId,
	pub channel_id: String,
	pub provider_user_id: String,
	pub provider_emote_set_id: String,
}

impl ChatroomRegistration {
	pub fn new(
		chatroom_id: ChatroomId,
		channel_id: impl Into<String>,
		provider_user_id: impl Into<String>,
		provider_emote_set_id: impl Into<String>,
	) -> Self {
		Self {
			chatroom_id,
			channel_id: channel_id.into(),
			provider_user_id: provider_user_id.into(),
			provider_emote_set_id: provider_emote_set_id.into(),
		}
	}

	pub fn has_channel(&self) -> bool {
		is_valid_channel_id(&self.channel_id)
	}

	pub fn has_provider_user(&self) -> bool {
		is_valid_user_id(&self.provider_user_id)
	}

	pub fn has_emote_set(&self) -> bool {
		is_valid_emote_set_id(&self.provider_emote_set_id)
	}

	/// Holds at least one id the provider could accept.
	pub fn has_provider_identity(&self) -> bool {
		self.has_provider_user() || self.has_emote_set()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reg(channel: &str, user: &str, set: &str) -> ChatroomRegistration {
		ChatroomRegistration::new(ChatroomId::new("room").unwrap(), channel, user, set)
	}

	#[test]
	fn platform_parse_and_display() {
		assert_eq!("kick".parse::<Platform>().unwrap(), Platform::Kick);
		assert_eq!("YT".parse::<Platform>().unwrap(), Platform::YouTube);
		assert_eq!(Platform::Kick.to_string(), "kick");
		assert_eq!(Platform::Kick.provider_str(), "KICK");
		assert!("mixer".parse::<Platform>().is_err());
	}

	#[test]
	fn rejects_empty_chatroom_ids() {
		assert!(ChatroomId::new("").is_err());
		assert!("   ".parse::<ChatroomId>().is_err());
		assert_eq!(ChatroomId::new("abc").unwrap().to_string(), "abc");
	}

	#[test]
	fn null_object_id_is_27_zeros() {
		assert_eq!(NULL_OBJECT_ID.len(), 27);
		assert!(NULL_OBJECT_ID.chars().all(|c| c == '0'));
	}

	#[test]
	fn unset_and_sentinel_ids_are_invalid() {
		let r = reg("0", "0", NULL_OBJECT_ID);
		assert!(!r.has_channel());
		assert!(!r.has_provider_user());
		assert!(!r.has_emote_set());
		assert!(!r.has_provider_identity());

		let r = reg("", "", "0");
		assert!(!r.has_channel());
		assert!(!r.has_emote_set());
	}

	#[test]
	fn any_valid_provider_id_counts_as_identity() {
		assert!(reg("0", "01HUSER", "0").has_provider_identity());
		assert!(reg("0", "0", "01HSET").has_provider_identity());
		assert!(!reg("42", "0", "0").has_provider_identity());
		assert!(reg("42", "0", "0").has_channel());
	}
}
