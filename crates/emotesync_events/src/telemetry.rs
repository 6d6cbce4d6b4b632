#![forbid(unsafe_code)]

use emotesync_domain::ChatroomId;

/// Optional per-chatroom connection hooks.
///
/// Every method has a no-op default; the client calls them once per affected
/// chatroom and never depends on their outcome.
pub trait ConnectionTelemetry: Send + Sync {
	fn record_websocket_connection(&self, _chatroom_id: &ChatroomId, _connected: bool) {}

	fn record_connection_error(&self, _chatroom_id: &ChatroomId, _error: &str) {}

	/// Fired on every close, including `close()` and removing the last
	/// chatroom (reason `CLIENT_CLOSE_REASON`).
	fn record_reconnection(&self, _chatroom_id: &ChatroomId, _reason: &str) {}
}

/// Counters exported through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsTelemetry;

impl ConnectionTelemetry for MetricsTelemetry {
	fn record_websocket_connection(&self, chatroom_id: &ChatroomId, connected: bool) {
		metrics::counter!(
			"emotesync_ws_connections_total",
			"chatroom" => chatroom_id.to_string(),
			"connected" => connected.to_string()
		)
		.increment(1);
	}

	fn record_connection_error(&self, chatroom_id: &ChatroomId, _error: &str) {
		metrics::counter!("emotesync_ws_connection_errors_total", "chatroom" => chatroom_id.to_string()).increment(1);
	}

	fn record_reconnection(&self, chatroom_id: &ChatroomId, reason: &str) {
		metrics::counter!(
			"emotesync_ws_reconnections_total",
			"chatroom" => chatroom_id.to_string(),
			"reason" => reason.to_string()
		)
		.increment(1);
	}
}
