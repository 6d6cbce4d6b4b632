#![forbid(unsafe_code)]

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use emotesync_events::{
	ClientEvent, ConnectionTelemetry, EventClient, MetricsTelemetry, SUBSCRIBED_MARKER, SharedCosmetics,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: emotesync [--config path/to/config.toml]\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.emotesync/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" | "-c" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_rustls_crypto_provider() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,emotesync_events=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("emotesync");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

/// One JSON line per event. Confirmations carry the `SUBSCRIBED` marker.
fn event_line(event: &ClientEvent) -> anyhow::Result<String> {
	let mut value = serde_json::to_value(event)?;
	if let (ClientEvent::SubscriptionConfirmed { .. }, Some(obj)) = (event, value.as_object_mut()) {
		obj.insert("status".to_string(), serde_json::Value::from(SUBSCRIBED_MARKER));
	}
	Ok(serde_json::to_string(&value)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_rustls_crypto_provider();
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let cfg = crate::config::load_cli_config_from_path(&config_path)?;
	info!(
		path = %config_path.display(),
		endpoint = %cfg.client.endpoint,
		chatrooms = cfg.chatrooms.len(),
		"loaded config (toml + env overrides)"
	);

	init_metrics(cfg.metrics_bind.as_deref());

	if cfg.chatrooms.is_empty() {
		warn!("no [[chatrooms]] configured; the connection will carry no subscriptions");
	}

	let telemetry: Option<Arc<dyn ConnectionTelemetry>> = cfg
		.metrics_bind
		.is_some()
		.then(|| Arc::new(MetricsTelemetry) as Arc<dyn ConnectionTelemetry>);
	let (client, mut events) = EventClient::spawn(cfg.client.clone(), SharedCosmetics::new(), telemetry)?;

	for reg in cfg.chatrooms {
		client.add_chatroom(reg);
	}
	client.connect();

	loop {
		tokio::select! {
			event = events.recv() => {
				let Some(event) = event else {
					info!("event client stopped");
					break;
				};
				match event_line(&event) {
					Ok(line) => println!("{line}"),
					Err(e) => warn!(error = %e, "failed to encode event"),
				}
			}
			res = tokio::signal::ctrl_c() => {
				if let Err(e) = res {
					warn!(error = %e, "ctrl_c handler failed");
				}
				info!("shutting down");
				client.shutdown();
				break;
			}
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use emotesync_domain::ChatroomId;
	use emotesync_events::RoutedEvent;
	use emotesync_events::protocol::DispatchType;
	use serde_json::{Value, json};

	use super::*;

	fn parsed(event: &ClientEvent) -> Value {
		serde_json::from_str(&event_line(event).unwrap()).unwrap()
	}

	#[test]
	fn confirmations_carry_subscribed_marker() {
		let line = parsed(&ClientEvent::SubscriptionConfirmed {
			chatroom_id: ChatroomId::new("a").unwrap(),
		});
		assert_eq!(
			line,
			json!({ "event": "subscription_confirmed", "chatroom_id": "a", "status": "SUBSCRIBED" })
		);
	}

	#[test]
	fn routed_messages_keep_wire_field_names() {
		let line = parsed(&ClientEvent::MessageRouted(RoutedEvent {
			dispatch_type: DispatchType::UserUpdate,
			body: json!({ "id": "u" }),
			chatroom_id: None,
		}));
		assert_eq!(
			line,
			json!({ "event": "message_routed", "type": "user.update", "body": { "id": "u" }, "chatroomId": null })
		);
	}
}
