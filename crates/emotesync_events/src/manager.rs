#![forbid(unsafe_code)]

//! Connection lifecycle for the shared provider socket.
//!
//! `ConnectionManager` performs no I/O. Every handler returns the [`Action`]s
//! the driver must carry out (open, send, close, arm a timer, emit an event),
//! so the whole state machine runs on whichever single task owns it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use emotesync_domain::{ChatroomId, ChatroomRegistration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ClientEvent;
use crate::chatrooms::ChatroomRegistry;
use crate::config::EventClientConfig;
use crate::cosmetics::SharedCosmetics;
use crate::protocol::{
	EventWildcard, INVALID_PAYLOAD_REASON, Inbound, POLICY_VIOLATION_CODE, SubscriptionKey, decode_inbound,
	encode_subscribe, encode_unsubscribe,
};
use crate::router::route;
use crate::subscriptions::{SubscriptionRegistry, channel_keys, emote_set_key, keys_for, user_key};
use crate::telemetry::ConnectionTelemetry;

/// Telemetry reason for closes requested through `close()`.
pub const CLIENT_CLOSE_REASON: &str = "client close";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

/// Close code and reason as reported by the socket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
	pub code: Option<u16>,
	pub reason: String,
}

impl CloseInfo {
	pub fn new(code: u16, reason: impl Into<String>) -> Self {
		Self {
			code: Some(code),
			reason: reason.into(),
		}
	}

	/// Provider rejected our payload; retrying with the same ids cannot succeed.
	pub fn is_invalid_payload(&self) -> bool {
		self.code == Some(POLICY_VIOLATION_CODE) && self.reason == INVALID_PAYLOAD_REASON
	}
}

/// Side effects requested by the manager.
///
/// `generation` identifies one socket lifetime; the driver drops actions for
/// sockets it no longer holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
	Open { generation: u64, url: String },
	Send { generation: u64, text: String },
	Close { generation: u64 },
	ScheduleSettle { generation: u64, delay: Duration },
	ScheduleReconnect { delay: Duration },
	Emit(ClientEvent),
}

pub struct ConnectionManager {
	cfg: EventClientConfig,
	state: ConnectionState,
	should_reconnect: bool,
	reconnect_attempts: u32,
	generation: u64,
	settled: bool,
	session_id: Option<Uuid>,
	chatrooms: ChatroomRegistry,
	subscriptions: SubscriptionRegistry,
	confirmed: HashSet<ChatroomId>,
	cosmetics: SharedCosmetics,
	telemetry: Option<Arc<dyn ConnectionTelemetry>>,
}

impl ConnectionManager {
	pub fn new(
		cfg: EventClientConfig,
		cosmetics: SharedCosmetics,
		telemetry: Option<Arc<dyn ConnectionTelemetry>>,
	) -> Self {
		Self {
			cfg,
			state: ConnectionState::Disconnected,
			should_reconnect: true,
			reconnect_attempts: 0,
			generation: 0,
			settled: false,
			session_id: None,
			chatrooms: ChatroomRegistry::new(),
			subscriptions: SubscriptionRegistry::new(),
			confirmed: HashSet::new(),
			cosmetics,
			telemetry,
		}
	}

	pub fn state(&self) -> ConnectionState {
		self.state
	}

	pub fn reconnect_attempts(&self) -> u32 {
		self.reconnect_attempts
	}

	pub fn should_reconnect(&self) -> bool {
		self.should_reconnect
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn session_id(&self) -> Option<Uuid> {
		self.session_id
	}

	pub fn chatrooms(&self) -> &ChatroomRegistry {
		&self.chatrooms
	}

	pub fn subscriptions(&self) -> &SubscriptionRegistry {
		&self.subscriptions
	}

	pub fn cosmetics(&self) -> &SharedCosmetics {
		&self.cosmetics
	}

	/// Register (or overwrite) a chatroom.
	///
	/// Once the post-open subscription pass has run, the chatroom is
	/// subscribed right away; before that the pending pass covers it.
	pub fn add_chatroom(&mut self, reg: ChatroomRegistration) -> Vec<Action> {
		let mut actions = Vec::new();
		let chatroom_id = reg.chatroom_id.clone();

		if let Some(previous) = self.chatrooms.insert(reg.clone()) {
			debug!(chatroom_id = %chatroom_id, "chatroom registration replaced");
			self.confirmed.remove(&chatroom_id);
			self.release_orphaned_keys(&previous, &mut actions);
		}

		if self.state == ConnectionState::Connected && self.settled {
			self.subscription_pass(std::slice::from_ref(&reg), &mut actions);
		} else {
			debug!(chatroom_id = %chatroom_id, state = ?self.state, "chatroom registered; subscriptions deferred");
		}

		actions
	}

	/// Unregister a chatroom; removing the last one closes the connection.
	pub fn remove_chatroom(&mut self, chatroom_id: &ChatroomId) -> Vec<Action> {
		let Some(removed) = self.chatrooms.remove(chatroom_id) else {
			debug!(chatroom_id = %chatroom_id, "remove for unknown chatroom");
			return Vec::new();
		};
		self.confirmed.remove(chatroom_id);

		if self.chatrooms.is_empty() {
			info!(chatroom_id = %chatroom_id, "last chatroom removed; closing event api connection");
			if self.state != ConnectionState::Disconnected
				&& let Some(telemetry) = &self.telemetry
			{
				telemetry.record_reconnection(chatroom_id, CLIENT_CLOSE_REASON);
			}
			return self.close();
		}

		let mut actions = Vec::new();
		self.release_orphaned_keys(&removed, &mut actions);

		// The removed chatroom may have owned the single user.* key.
		if self.state == ConnectionState::Connected && self.settled {
			self.subscribe_user(&mut actions);
		}
		actions
	}

	/// Caller-initiated connect. Re-arms reconnection after an earlier `close`.
	pub fn connect(&mut self) -> Vec<Action> {
		self.should_reconnect = true;
		self.open_socket()
	}

	/// Disconnect and stop reconnecting until the next `connect`.
	pub fn close(&mut self) -> Vec<Action> {
		self.should_reconnect = false;
		if self.state == ConnectionState::Disconnected {
			return Vec::new();
		}

		info!(generation = self.generation, "closing event api connection");
		self.record_reconnections(CLIENT_CLOSE_REASON);
		let actions = vec![Action::Close {
			generation: self.generation,
		}];
		self.enter_disconnected();
		actions
	}

	pub fn on_open(&mut self, generation: u64) -> Vec<Action> {
		if generation != self.generation || self.state != ConnectionState::Connecting {
			debug!(generation, current = self.generation, "ignoring open for stale socket");
			return Vec::new();
		}

		self.state = ConnectionState::Connected;
		self.reconnect_attempts = 0;
		let session_id = Uuid::new_v4();
		self.session_id = Some(session_id);
		info!(%session_id, generation, chatrooms = self.chatrooms.count(), "event api connected");

		if let Some(telemetry) = &self.telemetry {
			for reg in self.chatrooms.list() {
				telemetry.record_websocket_connection(&reg.chatroom_id, true);
			}
		}

		vec![Action::ScheduleSettle {
			generation,
			delay: self.cfg.post_open_settle,
		}]
	}

	/// Post-open settle delay elapsed: run the subscription pass.
	pub fn on_settle_elapsed(&mut self, generation: u64) -> Vec<Action> {
		if generation != self.generation || self.state != ConnectionState::Connected {
			debug!(generation, state = ?self.state, "socket not open; skipping subscription pass");
			return Vec::new();
		}

		self.settled = true;
		let mut actions = Vec::new();
		let targets = self.chatrooms.list().to_vec();
		self.subscription_pass(&targets, &mut actions);

		actions.push(Action::Emit(ClientEvent::Connected {
			chatroom_ids: self.chatrooms.ids(),
		}));
		actions
	}

	/// Socket error. A close always follows.
	pub fn on_error(&mut self, generation: u64, error: &str) {
		if generation != self.generation {
			return;
		}

		self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
		warn!(error = %error, attempts = self.reconnect_attempts, "event api socket error");

		if let Some(telemetry) = &self.telemetry {
			for reg in self.chatrooms.list() {
				telemetry.record_connection_error(&reg.chatroom_id, error);
			}
		}
	}

	pub fn on_closed(&mut self, generation: u64, close: CloseInfo) -> Vec<Action> {
		if generation != self.generation || self.state == ConnectionState::Disconnected {
			debug!(generation, current = self.generation, "ignoring close for inactive socket");
			return Vec::new();
		}

		self.enter_disconnected();
		info!(code = ?close.code, reason = %close.reason, "event api socket closed");

		self.record_reconnections(if close.reason.is_empty() { "closed" } else { close.reason.as_str() });

		if !self.should_reconnect {
			debug!("reconnect disabled; staying disconnected");
			return Vec::new();
		}

		if close.is_invalid_payload() && !self.chatrooms.any_provider_identity() {
			warn!(
				chatrooms = self.chatrooms.count(),
				"provider rejected payload and no chatroom holds a provider identity; not reconnecting"
			);
			return Vec::new();
		}

		let delay = self.cfg.reconnect.delay_for(self.reconnect_attempts);
		info!(delay_ms = delay.as_millis() as u64, attempt = self.reconnect_attempts, "scheduling event api reconnect");
		vec![Action::ScheduleReconnect { delay }]
	}

	/// Backoff timer fired.
	pub fn on_reconnect_due(&mut self) -> Vec<Action> {
		if !self.should_reconnect {
			debug!("reconnect timer fired after close; ignoring");
			return Vec::new();
		}
		self.open_socket()
	}

	pub fn on_text(&mut self, generation: u64, text: &str) -> Vec<Action> {
		if generation != self.generation {
			return Vec::new();
		}

		let inbound = match decode_inbound(text) {
			Ok(inbound) => inbound,
			Err(err) => {
				warn!(error = %err, "dropping malformed event api frame");
				return Vec::new();
			}
		};

		match inbound {
			Inbound::Dispatch(envelope) => route(envelope, &self.chatrooms, &self.cosmetics)
				.map(|routed| vec![Action::Emit(ClientEvent::MessageRouted(routed))])
				.unwrap_or_default(),
			Inbound::Hello => {
				debug!("event api hello received");
				Vec::new()
			}
			Inbound::Heartbeat => {
				debug!("event api heartbeat");
				Vec::new()
			}
			Inbound::ReconnectRequested => {
				warn!("event api reconnect requested");
				vec![Action::Close { generation }]
			}
			Inbound::Error(payload) => {
				warn!(%payload, "event api error");
				Vec::new()
			}
			Inbound::Ignored => Vec::new(),
		}
	}

	fn open_socket(&mut self) -> Vec<Action> {
		if !self.should_reconnect {
			debug!("reconnect disabled; not connecting");
			return Vec::new();
		}
		if self.state != ConnectionState::Disconnected {
			debug!(state = ?self.state, "connect ignored; socket already active");
			return Vec::new();
		}

		self.generation += 1;
		self.state = ConnectionState::Connecting;
		self.settled = false;
		info!(url = %self.cfg.endpoint, generation = self.generation, "connecting to event api");

		vec![Action::Open {
			generation: self.generation,
			url: self.cfg.endpoint.clone(),
		}]
	}

	fn record_reconnections(&self, reason: &str) {
		if let Some(telemetry) = &self.telemetry {
			for reg in self.chatrooms.list() {
				telemetry.record_reconnection(&reg.chatroom_id, reason);
			}
		}
	}

	fn enter_disconnected(&mut self) {
		self.state = ConnectionState::Disconnected;
		self.settled = false;
		self.session_id = None;
		self.subscriptions.clear();
		self.confirmed.clear();
	}

	fn subscription_pass(&mut self, targets: &[ChatroomRegistration], actions: &mut Vec<Action>) {
		self.subscribe_user(actions);

		for reg in targets {
			if !reg.has_channel() {
				debug!(chatroom_id = %reg.chatroom_id, "no channel id; skipping cosmetic/entitlement subscriptions");
				continue;
			}
			for key in channel_keys(reg) {
				self.subscribe_key(&key, actions);
			}
		}

		for reg in targets {
			match emote_set_key(reg) {
				Some(key) => {
					self.subscribe_key(&key, actions);
				}
				None => debug!(chatroom_id = %reg.chatroom_id, "no emote set id; skipping emote set subscription"),
			}
		}

		for reg in targets {
			self.confirm_if_covered(reg, actions);
		}
	}

	fn subscribe_user(&mut self, actions: &mut Vec<Action>) {
		let Some(key) = self.chatrooms.list().iter().find_map(user_key) else {
			debug!("no chatroom holds a provider user id; skipping user subscription");
			return;
		};
		self.subscribe_key(&key, actions);
	}

	fn subscribe_key(&mut self, key: &SubscriptionKey, actions: &mut Vec<Action>) -> bool {
		let platform = self.cfg.platform;
		let mut frame = None;
		let sent = self.subscriptions.ensure_subscribed(key, || match encode_subscribe(key, platform, now_ms()) {
			Ok(text) => frame = Some(text),
			Err(err) => warn!(error = %err, key = %key, "failed to encode subscribe frame"),
		});

		if let Some(text) = frame {
			debug!(key = %key, "event api subscribe");
			actions.push(Action::Send {
				generation: self.generation,
				text,
			});
		}
		sent
	}

	fn confirm_if_covered(&mut self, reg: &ChatroomRegistration, actions: &mut Vec<Action>) {
		if !reg.has_channel() {
			return;
		}
		let key = SubscriptionKey::new(EventWildcard::Entitlement, reg.channel_id.trim());
		if self.subscriptions.contains(&key) && self.confirmed.insert(reg.chatroom_id.clone()) {
			actions.push(Action::Emit(ClientEvent::SubscriptionConfirmed {
				chatroom_id: reg.chatroom_id.clone(),
			}));
		}
	}

	/// Forget keys only `previous` needed and, when connected, unsubscribe them.
	fn release_orphaned_keys(&mut self, previous: &ChatroomRegistration, actions: &mut Vec<Action>) {
		let still_needed: HashSet<SubscriptionKey> = self.chatrooms.list().iter().flat_map(keys_for).collect();

		for key in keys_for(previous) {
			if still_needed.contains(&key) || !self.subscriptions.forget(&key) {
				continue;
			}
			if self.state != ConnectionState::Connected {
				continue;
			}
			match encode_unsubscribe(&key, self.cfg.platform, now_ms()) {
				Ok(text) => {
					debug!(key = %key, "event api unsubscribe");
					actions.push(Action::Send {
						generation: self.generation,
						text,
					});
				}
				Err(err) => warn!(error = %err, key = %key, "failed to encode unsubscribe frame"),
			}
		}
	}
}

fn now_ms() -> i64 {
	chrono::Utc::now().timestamp_millis()
}
