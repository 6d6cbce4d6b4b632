#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use emotesync_domain::{ChatroomId, ChatroomRegistration, Platform};
use emotesync_events::config::validate_endpoint;
use emotesync_events::{EventClientConfig, ReconnectPolicy};
use serde::Deserialize;
use tracing::{info, warn};

/// Floor for a zero reconnect start delay.
const MIN_RECONNECT_START: Duration = Duration::from_millis(100);

/// Default config path: `~/.emotesync/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".emotesync").join("config.toml"))
}

/// Load the CLI config from TOML and env overrides.
pub fn load_cli_config_from_path(path: &Path) -> anyhow::Result<CliConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = CliConfig::from_file(file_cfg)?;

	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

	validate_endpoint(&cfg.client.endpoint)?;

	Ok(cfg)
}

#[derive(Debug, Clone, Default)]
pub struct CliConfig {
	pub client: EventClientConfig,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	pub chatrooms: Vec<ChatroomRegistration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	client: FileClientSettings,

	metrics_bind: Option<String>,

	#[serde(default)]
	chatrooms: Vec<FileChatroom>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileClientSettings {
	endpoint: Option<String>,
	platform: Option<String>,
	post_open_settle_ms: Option<u64>,
	reconnect_start_ms: Option<u64>,
	reconnect_max_steps: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileChatroom {
	id: String,
	#[serde(default)]
	channel_id: String,
	#[serde(default)]
	provider_user_id: String,
	#[serde(default)]
	provider_emote_set_id: String,
}

impl CliConfig {
	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let defaults = EventClientConfig::default();

		let platform = match file.client.platform.filter(|s| !s.trim().is_empty()) {
			Some(p) => p.trim().parse::<Platform>().with_context(|| format!("client.platform {p:?}"))?,
			None => defaults.platform,
		};

		let client = EventClientConfig {
			endpoint: file
				.client
				.endpoint
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty())
				.unwrap_or(defaults.endpoint),
			platform,
			reconnect: ReconnectPolicy::new(
				file.client
					.reconnect_start_ms
					.map(Duration::from_millis)
					.unwrap_or(defaults.reconnect.start_delay),
				file.client.reconnect_max_steps.unwrap_or(defaults.reconnect.max_steps),
			),
			post_open_settle: file
				.client
				.post_open_settle_ms
				.map(Duration::from_millis)
				.unwrap_or(defaults.post_open_settle),
		};

		let mut chatrooms = Vec::with_capacity(file.chatrooms.len());
		for room in file.chatrooms {
			let Ok(chatroom_id) = ChatroomId::new(room.id.trim()) else {
				warn!("skipping [[chatrooms]] entry with empty id");
				continue;
			};
			chatrooms.push(ChatroomRegistration::new(
				chatroom_id,
				room.channel_id,
				room.provider_user_id,
				room.provider_emote_set_id,
			));
		}

		Ok(Self {
			client,
			metrics_bind: file.metrics_bind.filter(|s| !s.trim().is_empty()),
			chatrooms,
		})
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut CliConfig, var: impl Fn(&str) -> Option<String>) {
	if let Some(v) = var("EMOTESYNC_ENDPOINT") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.client.endpoint = v;
			info!("client config: endpoint overridden by env");
		}
	}

	if let Some(v) = var("EMOTESYNC_SETTLE_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.client.post_open_settle = Duration::from_millis(ms);
		info!(ms, "client config: post_open_settle overridden by env");
	}

	if let Some(v) = var("EMOTESYNC_RECONNECT_START_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.client.reconnect.start_delay = Duration::from_millis(ms);
		info!(ms, "client config: reconnect start delay overridden by env");
	}

	if let Some(v) = var("EMOTESYNC_RECONNECT_MAX_STEPS")
		&& let Ok(steps) = v.trim().parse::<u32>()
	{
		cfg.client.reconnect.max_steps = steps;
		info!(steps, "client config: reconnect max steps overridden by env");
	}

	if let Some(v) = var("EMOTESYNC_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.metrics_bind = Some(v);
			info!("cli config: metrics_bind overridden by env");
		}
	}

	if cfg.client.reconnect.start_delay.is_zero() {
		warn!(
			"client config: reconnect start delay must be positive; using {}ms",
			MIN_RECONNECT_START.as_millis()
		);
		cfg.client.reconnect.start_delay = MIN_RECONNECT_START;
	}

	if cfg.client.reconnect.max_steps == 0 {
		warn!("client config: reconnect max steps must be at least 1; using 1");
		cfg.client.reconnect.max_steps = 1;
	}
}
