#![forbid(unsafe_code)]

use std::fmt;

use anyhow::Context as _;
use emotesync_domain::Platform;
use serde::{Deserialize, Serialize};

pub const OP_DISPATCH: u32 = 0;
pub const OP_HELLO: u32 = 1;
pub const OP_HEARTBEAT: u32 = 2;
pub const OP_RECONNECT: u32 = 4;
pub const OP_ERROR: u32 = 6;
pub const OP_SUBSCRIBE: u32 = 35;
pub const OP_UNSUBSCRIBE: u32 = 36;

/// `entitlement.create` body kind for cosmetic entitlements.
pub const ENTITLEMENT_KIND_COSMETIC: i64 = 10;

/// Close code/reason the provider uses for payloads it will never accept.
pub const POLICY_VIOLATION_CODE: u16 = 1008;
pub const INVALID_PAYLOAD_REASON: &str = "Invalid Payload";

/// Event wildcards the client subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventWildcard {
	User,
	Cosmetic,
	Entitlement,
	EmoteSet,
}

impl EventWildcard {
	pub const fn as_str(self) -> &'static str {
		match self {
			EventWildcard::User => "user.*",
			EventWildcard::Cosmetic => "cosmetic.*",
			EventWildcard::Entitlement => "entitlement.*",
			EventWildcard::EmoteSet => "emote_set.*",
		}
	}
}

impl fmt::Display for EventWildcard {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One (wildcard, scope id) pair; rendered as `cosmetic.*:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
	pub wildcard: EventWildcard,
	pub scope_id: String,
}

impl SubscriptionKey {
	pub fn new(wildcard: EventWildcard, scope_id: impl Into<String>) -> Self {
		Self {
			wildcard,
			scope_id: scope_id.into(),
		}
	}
}

impl fmt::Display for SubscriptionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.wildcard, self.scope_id)
	}
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Condition<'a> {
	Object {
		object_id: &'a str,
	},
	Channel {
		platform: &'static str,
		ctx: &'static str,
		id: &'a str,
	},
}

#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
	op: u32,
	t: i64,
	d: SubscribeData<'a>,
}

#[derive(Debug, Serialize)]
struct SubscribeData<'a> {
	#[serde(rename = "type")]
	dispatch_type: &'static str,
	condition: Condition<'a>,
}

fn encode_subscription_op(op: u32, key: &SubscriptionKey, platform: Platform, now_ms: i64) -> anyhow::Result<String> {
	let condition = match key.wildcard {
		EventWildcard::User | EventWildcard::EmoteSet => Condition::Object {
			object_id: &key.scope_id,
		},
		EventWildcard::Cosmetic | EventWildcard::Entitlement => Condition::Channel {
			platform: platform.provider_str(),
			ctx: "channel",
			id: &key.scope_id,
		},
	};

	let payload = SubscribeMessage {
		op,
		t: now_ms,
		d: SubscribeData {
			dispatch_type: key.wildcard.as_str(),
			condition,
		},
	};

	serde_json::to_string(&payload).with_context(|| format!("encode op {op} for {key}"))
}

pub fn encode_subscribe(key: &SubscriptionKey, platform: Platform, now_ms: i64) -> anyhow::Result<String> {
	encode_subscription_op(OP_SUBSCRIBE, key, platform, now_ms)
}

pub fn encode_unsubscribe(key: &SubscriptionKey, platform: Platform, now_ms: i64) -> anyhow::Result<String> {
	encode_subscription_op(OP_UNSUBSCRIBE, key, platform, now_ms)
}

/// Dispatch types the client mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchType {
	#[serde(rename = "user.update")]
	UserUpdate,
	#[serde(rename = "emote_set.update")]
	EmoteSetUpdate,
	#[serde(rename = "cosmetic.create")]
	CosmeticCreate,
	#[serde(rename = "entitlement.create")]
	EntitlementCreate,
	#[serde(other)]
	Unknown,
}

impl DispatchType {
	pub const fn as_str(self) -> &'static str {
		match self {
			DispatchType::UserUpdate => "user.update",
			DispatchType::EmoteSetUpdate => "emote_set.update",
			DispatchType::CosmeticCreate => "cosmetic.create",
			DispatchType::EntitlementCreate => "entitlement.create",
			DispatchType::Unknown => "unknown",
		}
	}
}

impl fmt::Display for DispatchType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A decoded `{type, body}` dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEnvelope {
	pub dispatch_type: DispatchType,
	/// Type string as sent, kept for diagnostics.
	pub raw_type: String,
	pub body: serde_json::Value,
}

/// Inbound frame classified by opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
	Dispatch(DispatchEnvelope),
	Hello,
	Heartbeat,
	ReconnectRequested,
	Error(serde_json::Value),
	/// No body or no type; dropped silently.
	Ignored,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
	#[serde(default)]
	op: Option<u32>,
	#[serde(default)]
	d: Option<InboundData>,
}

#[derive(Debug, Deserialize)]
struct InboundData {
	#[serde(rename = "type", default)]
	dispatch_type: Option<String>,
	#[serde(default)]
	body: Option<serde_json::Value>,
	#[serde(flatten)]
	rest: serde_json::Map<String, serde_json::Value>,
}

/// Decode one text frame. Only malformed JSON is an error.
pub fn decode_inbound(text: &str) -> anyhow::Result<Inbound> {
	let frame: InboundFrame = serde_json::from_str(text).context("parse provider frame")?;

	match frame.op {
		Some(OP_HELLO) => return Ok(Inbound::Hello),
		Some(OP_HEARTBEAT) => return Ok(Inbound::Heartbeat),
		Some(OP_RECONNECT) => return Ok(Inbound::ReconnectRequested),
		Some(OP_ERROR) => {
			let d = frame
				.d
				.map(|d| serde_json::Value::Object(d.rest))
				.unwrap_or(serde_json::Value::Null);
			return Ok(Inbound::Error(d));
		}
		Some(OP_DISPATCH) | None => {}
		Some(_) => return Ok(Inbound::Ignored),
	}

	let Some(InboundData {
		dispatch_type: Some(raw_type),
		body: Some(body),
		..
	}) = frame.d
	else {
		return Ok(Inbound::Ignored);
	};

	if body.is_null() {
		return Ok(Inbound::Ignored);
	}

	let dispatch_type = serde_json::from_value(serde_json::Value::String(raw_type.clone())).unwrap_or(DispatchType::Unknown);

	Ok(Inbound::Dispatch(DispatchEnvelope {
		dispatch_type,
		raw_type,
		body,
	}))
}

#[cfg(test)]
mod tests {
	use serde_json::{Value, json};

	use super::*;

	#[test]
	fn subscription_keys_render_with_wildcard_prefix() {
		let key = SubscriptionKey::new(EventWildcard::Cosmetic, "123");
		assert_eq!(key.to_string(), "cosmetic.*:123");
		assert_eq!(SubscriptionKey::new(EventWildcard::EmoteSet, "s").to_string(), "emote_set.*:s");
	}

	#[test]
	fn channel_subscriptions_use_platform_condition() {
		let key = SubscriptionKey::new(EventWildcard::Entitlement, "668");
		let text = encode_subscribe(&key, Platform::Kick, 1_700_000_000_000).unwrap();
		let v: Value = serde_json::from_str(&text).unwrap();
		assert_eq!(
			v,
			json!({
				"op": 35,
				"t": 1_700_000_000_000i64,
				"d": {
					"type": "entitlement.*",
					"condition": { "platform": "KICK", "ctx": "channel", "id": "668" }
				}
			})
		);
	}

	#[test]
	fn object_subscriptions_use_object_id() {
		let key = SubscriptionKey::new(EventWildcard::User, "01HUSER");
		let v: Value = serde_json::from_str(&encode_subscribe(&key, Platform::Kick, 1).unwrap()).unwrap();
		assert_eq!(v["d"]["type"], "user.*");
		assert_eq!(v["d"]["condition"], json!({ "object_id": "01HUSER" }));

		let v: Value = serde_json::from_str(&encode_unsubscribe(&key, Platform::Kick, 1).unwrap()).unwrap();
		assert_eq!(v["op"], 36);
	}

	#[test]
	fn decodes_dispatch_frames() {
		let inbound = decode_inbound(r#"{"op":0,"d":{"type":"user.update","body":{"id":"u"}}}"#).unwrap();
		let Inbound::Dispatch(env) = inbound else {
			panic!("expected dispatch, got {inbound:?}");
		};
		assert_eq!(env.dispatch_type, DispatchType::UserUpdate);
		assert_eq!(env.body["id"], "u");

		let inbound = decode_inbound(r#"{"d":{"type":"emote.delete","body":{}}}"#).unwrap();
		let Inbound::Dispatch(env) = inbound else {
			panic!("expected dispatch, got {inbound:?}");
		};
		assert_eq!(env.dispatch_type, DispatchType::Unknown);
		assert_eq!(env.raw_type, "emote.delete");
	}

	#[test]
	fn frames_without_body_or_type_are_ignored() {
		assert_eq!(decode_inbound(r#"{"d":{"type":"user.update"}}"#).unwrap(), Inbound::Ignored);
		assert_eq!(decode_inbound(r#"{"d":{"body":{}}}"#).unwrap(), Inbound::Ignored);
		assert_eq!(decode_inbound(r#"{"op":0}"#).unwrap(), Inbound::Ignored);
		assert_eq!(decode_inbound(r#"{"op":5,"d":{"command":"SUBSCRIBE"}}"#).unwrap(), Inbound::Ignored);
	}

	#[test]
	fn control_opcodes_are_classified() {
		assert_eq!(decode_inbound(r#"{"op":1,"d":{"heartbeat_interval":45000}}"#).unwrap(), Inbound::Hello);
		assert_eq!(decode_inbound(r#"{"op":2,"d":{"count":3}}"#).unwrap(), Inbound::Heartbeat);
		assert_eq!(decode_inbound(r#"{"op":4,"d":{}}"#).unwrap(), Inbound::ReconnectRequested);
		assert_eq!(
			decode_inbound(r#"{"op":6,"d":{"message":"bad"}}"#).unwrap(),
			Inbound::Error(json!({ "message": "bad" }))
		);
	}

	#[test]
	fn malformed_json_is_an_error() {
		assert!(decode_inbound("{not json").is_err());
		assert!(decode_inbound(r#""just text""#).is_err());
	}
}
