#![forbid(unsafe_code)]

use emotesync_domain::ChatroomId;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chatrooms::ChatroomRegistry;
use crate::cosmetics::{IngestOutcome, SharedCosmetics};
use crate::protocol::{DispatchEnvelope, DispatchType, ENTITLEMENT_KIND_COSMETIC};

/// A dispatch resolved to its target. `chatroom_id == None` means every chatroom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedEvent {
	#[serde(rename = "type")]
	pub dispatch_type: DispatchType,
	pub body: serde_json::Value,
	#[serde(rename = "chatroomId")]
	pub chatroom_id: Option<ChatroomId>,
}

/// Resolve the target of one dispatch.
///
/// Cosmetic and entitlement events are broadcast: the provider does not scope
/// them reliably, so any `context.id`/`condition.id` is logged and not used.
pub fn route(envelope: DispatchEnvelope, chatrooms: &ChatroomRegistry, cosmetics: &SharedCosmetics) -> Option<RoutedEvent> {
	let DispatchEnvelope {
		dispatch_type,
		raw_type,
		body,
	} = envelope;

	let (body, chatroom_id) = match dispatch_type {
		DispatchType::Unknown => {
			debug!(dispatch_type = %raw_type, "ignoring unsupported dispatch");
			return None;
		}
		DispatchType::UserUpdate => (body, None),
		DispatchType::EmoteSetUpdate => {
			let target = resolve_emote_set(&body, chatrooms);
			(body, target)
		}
		DispatchType::EntitlementCreate => {
			let kind = body.get("kind").and_then(serde_json::Value::as_i64);
			if kind != Some(ENTITLEMENT_KIND_COSMETIC) {
				debug!(?kind, "dropping non-cosmetic entitlement");
				return None;
			}
			log_scope_hint(dispatch_type, &body, chatrooms);
			(body, None)
		}
		DispatchType::CosmeticCreate => {
			match cosmetics.ingest(&body) {
				IngestOutcome::BadgeAdded(id) => debug!(badge_id = %id, "badge cached"),
				IngestOutcome::PaintAdded(id) => debug!(paint_id = %id, "paint cached"),
				IngestOutcome::Duplicate(id) => debug!(cosmetic_id = %id, "cosmetic already cached"),
				IngestOutcome::PersonalEmoteSet(_) | IngestOutcome::UserScoped | IngestOutcome::Unprocessed => {}
			}
			log_scope_hint(dispatch_type, &body, chatrooms);

			let snapshot = match serde_json::to_value(cosmetics.snapshot()) {
				Ok(v) => v,
				Err(err) => {
					warn!(error = %err, "failed to serialize cosmetics snapshot");
					return None;
				}
			};
			(snapshot, None)
		}
	};

	Some(RoutedEvent {
		dispatch_type,
		body,
		chatroom_id,
	})
}

fn resolve_emote_set(body: &serde_json::Value, chatrooms: &ChatroomRegistry) -> Option<ChatroomId> {
	let set_id = body.get("id").and_then(serde_json::Value::as_str)?;
	match chatrooms.find_by_emote_set(set_id) {
		Some(reg) => Some(reg.chatroom_id.clone()),
		None => {
			debug!(emote_set_id = %set_id, "emote set update matches no chatroom; broadcasting");
			None
		}
	}
}

fn scope_hint(body: &serde_json::Value) -> Option<String> {
	["/context/id", "/condition/id"]
		.iter()
		.filter_map(|ptr| body.pointer(ptr))
		.find_map(|v| match v {
			serde_json::Value::String(s) => Some(s.clone()),
			serde_json::Value::Number(n) => Some(n.to_string()),
			_ => None,
		})
}

fn log_scope_hint(dispatch_type: DispatchType, body: &serde_json::Value, chatrooms: &ChatroomRegistry) {
	let Some(hint) = scope_hint(body) else {
		debug!(%dispatch_type, "unscoped dispatch; broadcasting");
		return;
	};
	let matched = chatrooms.list().iter().any(|r| r.channel_id.trim() == hint);
	debug!(%dispatch_type, scope = %hint, matched, "scoped dispatch broadcast to all chatrooms");
}

#[cfg(test)]
mod tests {
	use emotesync_domain::ChatroomRegistration;
	use serde_json::json;

	use super::*;

	fn rooms() -> ChatroomRegistry {
		let mut rooms = ChatroomRegistry::new();
		rooms.insert(ChatroomRegistration::new(ChatroomId::new("a").unwrap(), "1", "01HUSER", "01HSETA"));
		rooms.insert(ChatroomRegistration::new(ChatroomId::new("b").unwrap(), "2", "0", "01HSETB"));
		rooms
	}

	fn envelope(dispatch_type: DispatchType, raw: &str, body: serde_json::Value) -> DispatchEnvelope {
		DispatchEnvelope {
			dispatch_type,
			raw_type: raw.to_string(),
			body,
		}
	}

	#[test]
	fn user_updates_broadcast() {
		let routed = route(
			envelope(DispatchType::UserUpdate, "user.update", json!({ "id": "01HUSER" })),
			&rooms(),
			&SharedCosmetics::new(),
		)
		.unwrap();
		assert_eq!(routed.chatroom_id, None);

		let routed = route(
			envelope(DispatchType::UserUpdate, "user.update", json!({})),
			&ChatroomRegistry::new(),
			&SharedCosmetics::new(),
		)
		.unwrap();
		assert_eq!(routed.chatroom_id, None);
	}

	#[test]
	fn emote_set_updates_route_to_matching_chatroom() {
		let routed = route(
			envelope(DispatchType::EmoteSetUpdate, "emote_set.update", json!({ "id": "01HSETB" })),
			&rooms(),
			&SharedCosmetics::new(),
		)
		.unwrap();
		assert_eq!(routed.chatroom_id, Some(ChatroomId::new("b").unwrap()));

		let routed = route(
			envelope(DispatchType::EmoteSetUpdate, "emote_set.update", json!({ "id": "01HOTHER" })),
			&rooms(),
			&SharedCosmetics::new(),
		)
		.unwrap();
		assert_eq!(routed.chatroom_id, None);
	}

	#[test]
	fn unsupported_types_are_dropped() {
		assert!(
			route(
				envelope(DispatchType::Unknown, "user.delete", json!({})),
				&rooms(),
				&SharedCosmetics::new()
			)
			.is_none()
		);
	}

	#[test]
	fn only_cosmetic_entitlements_are_forwarded() {
		let cosmetics = SharedCosmetics::new();
		assert!(
			route(
				envelope(DispatchType::EntitlementCreate, "entitlement.create", json!({ "kind": 3 })),
				&rooms(),
				&cosmetics
			)
			.is_none()
		);

		let routed = route(
			envelope(
				DispatchType::EntitlementCreate,
				"entitlement.create",
				json!({ "kind": 10, "context": { "id": "1" } }),
			),
			&rooms(),
			&cosmetics,
		)
		.unwrap();
		assert_eq!(routed.chatroom_id, None);
		assert_eq!(routed.body["kind"], 10);
	}

	#[test]
	fn cosmetic_creates_emit_full_snapshot() {
		let cosmetics = SharedCosmetics::new();
		let badge = |id: &str| {
			json!({
				"object": {
					"kind": "BADGE",
					"data": {
						"id": id,
						"tooltip": id,
						"host": { "url": "//cdn/badge", "files": [{ "name": "1x.webp" }] }
					}
				}
			})
		};

		route(
			envelope(DispatchType::CosmeticCreate, "cosmetic.create", badge("one")),
			&rooms(),
			&cosmetics,
		)
		.unwrap();
		let routed = route(
			envelope(DispatchType::CosmeticCreate, "cosmetic.create", badge("two")),
			&rooms(),
			&cosmetics,
		)
		.unwrap();

		assert_eq!(routed.chatroom_id, None);
		assert_eq!(routed.body["badges"].as_array().map(Vec::len), Some(2));
		assert_eq!(routed.body["paints"], json!([]));
	}

	#[test]
	fn scope_hint_reads_context_then_condition() {
		assert_eq!(scope_hint(&json!({ "context": { "id": "9" } })).as_deref(), Some("9"));
		assert_eq!(scope_hint(&json!({ "condition": { "id": 12 } })).as_deref(), Some("12"));
		assert_eq!(scope_hint(&json!({})), None);
	}
}
