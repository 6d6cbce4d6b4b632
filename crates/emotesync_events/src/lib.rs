#![forbid(unsafe_code)]

//! Multiplexed realtime event client for the 7TV event API.
//!
//! One socket serves every registered chatroom. [`ConnectionManager`] holds the
//! lifecycle and subscription bookkeeping without doing I/O; [`EventClient`]
//! drives it from a single tokio task and publishes [`ClientEvent`]s.

pub mod backoff;
pub mod chatrooms;
pub mod client;
pub mod codec;
pub mod config;
pub mod cosmetics;
pub mod manager;
pub mod protocol;
pub mod router;
pub mod subscriptions;
pub mod telemetry;


use emotesync_domain::ChatroomId;
use serde::Serialize;

pub use backoff::ReconnectPolicy;
pub use chatrooms::ChatroomRegistry;
pub use client::EventClient;
pub use config::{DEFAULT_EVENT_API_URL, EventClientConfig};
pub use cosmetics::{CosmeticsSnapshot, SharedCosmetics};
pub use manager::{Action, CLIENT_CLOSE_REASON, CloseInfo, ConnectionManager, ConnectionState};
pub use router::RoutedEvent;
pub use telemetry::{ConnectionTelemetry, MetricsTelemetry};

/// Marker carried by [`ClientEvent::SubscriptionConfirmed`] on the wire.
pub const SUBSCRIBED_MARKER: &str = "SUBSCRIBED";

/// Events published to the owning application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
	/// Post-open subscription pass finished.
	Connected { chatroom_ids: Vec<ChatroomId> },

	/// The chatroom's entitlement subscription is in place for this connection.
	SubscriptionConfirmed { chatroom_id: ChatroomId },

	MessageRouted(RoutedEvent),
}

impl ClientEvent {
	pub fn chatroom_id(&self) -> Option<&ChatroomId> {
		match self {
			ClientEvent::Connected { .. } => None,
			ClientEvent::SubscriptionConfirmed { chatroom_id } => Some(chatroom_id),
			ClientEvent::MessageRouted(routed) => routed.chatroom_id.as_ref(),
		}
	}
}
