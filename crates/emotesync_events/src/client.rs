#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Context as _;
use emotesync_domain::{ChatroomId, ChatroomRegistration};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::ClientEvent;
use crate::config::EventClientConfig;
use crate::cosmetics::SharedCosmetics;
use crate::manager::{Action, CloseInfo, ConnectionManager, ConnectionState};
use crate::telemetry::ConnectionTelemetry;

type EventApiWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to the event client task. Cheap to clone; every call is queued
/// and applied in order by the task.
#[derive(Clone)]
pub struct EventClient {
	command_tx: mpsc::UnboundedSender<Command>,
}

#[derive(Debug)]
enum Command {
	AddChatroom(ChatroomRegistration),
	RemoveChatroom(ChatroomId),
	Connect,
	Close,
	QueryState { resp: oneshot::Sender<ConnectionState> },
	Shutdown,
}

impl EventClient {
	/// Spawn the client task on the current runtime.
	pub fn spawn(
		cfg: EventClientConfig,
		cosmetics: SharedCosmetics,
		telemetry: Option<Arc<dyn ConnectionTelemetry>>,
	) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
		cfg.endpoint_url()?;

		let (command_tx, command_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let driver = Driver {
			manager: ConnectionManager::new(cfg, cosmetics, telemetry),
			events_tx,
			socket: None,
			connecting: None,
			settle_at: None,
			reconnect_at: None,
		};
		tokio::spawn(run_event_client(driver, command_rx));

		Ok((Self { command_tx }, events_rx))
	}

	pub fn add_chatroom(&self, reg: ChatroomRegistration) {
		let _ = self.command_tx.send(Command::AddChatroom(reg));
	}

	pub fn remove_chatroom(&self, chatroom_id: ChatroomId) {
		let _ = self.command_tx.send(Command::RemoveChatroom(chatroom_id));
	}

	pub fn connect(&self) {
		let _ = self.command_tx.send(Command::Connect);
	}

	pub fn close(&self) {
		let _ = self.command_tx.send(Command::Close);
	}

	/// `None` once the task has exited.
	pub async fn state(&self) -> Option<ConnectionState> {
		let (resp, rx) = oneshot::channel();
		self.command_tx.send(Command::QueryState { resp }).ok()?;
		rx.await.ok()
	}

	/// Close the socket and stop the task.
	pub fn shutdown(&self) {
		let _ = self.command_tx.send(Command::Shutdown);
	}
}

struct Driver {
	manager: ConnectionManager,
	events_tx: mpsc::UnboundedSender<ClientEvent>,
	socket: Option<(u64, EventApiWs)>,
	connecting: Option<(u64, BoxFuture<'static, anyhow::Result<EventApiWs>>)>,
	settle_at: Option<(u64, Instant)>,
	reconnect_at: Option<Instant>,
}

async fn run_event_client(mut driver: Driver, mut command_rx: mpsc::UnboundedReceiver<Command>) {
	loop {
		tokio::select! {
			cmd = command_rx.recv() => {
				let Some(cmd) = cmd else {
					info!("event client command channel closed");
					let actions = driver.manager.close();
					driver.apply(actions).await;
					return;
				};
				if !driver.handle_command(cmd).await {
					return;
				}
			}
			(generation, result) = wait_connecting(&mut driver.connecting), if driver.connecting.is_some() => {
				driver.connecting = None;
				driver.handle_connect_result(generation, result).await;
			}
			(generation, msg) = next_message(&mut driver.socket), if driver.socket.is_some() => {
				driver.handle_message(generation, msg).await;
			}
			_ = sleep_until_deadline(driver.settle_at.map(|(_, at)| at)), if driver.settle_at.is_some() => {
				if let Some((generation, _)) = driver.settle_at.take() {
					let actions = driver.manager.on_settle_elapsed(generation);
					driver.apply(actions).await;
				}
			}
			_ = sleep_until_deadline(driver.reconnect_at), if driver.reconnect_at.is_some() => {
				driver.reconnect_at = None;
				let actions = driver.manager.on_reconnect_due();
				driver.apply(actions).await;
			}
		}
	}
}

impl Driver {
	/// Returns `false` when the task should exit.
	async fn handle_command(&mut self, cmd: Command) -> bool {
		let actions = match cmd {
			Command::AddChatroom(reg) => self.manager.add_chatroom(reg),
			Command::RemoveChatroom(chatroom_id) => self.manager.remove_chatroom(&chatroom_id),
			Command::Connect => self.manager.connect(),
			Command::Close => self.manager.close(),
			Command::QueryState { resp } => {
				let _ = resp.send(self.manager.state());
				Vec::new()
			}
			Command::Shutdown => {
				info!("event client shutting down");
				let actions = self.manager.close();
				self.apply(actions).await;
				return false;
			}
		};
		self.apply(actions).await;
		true
	}

	async fn handle_connect_result(&mut self, generation: u64, result: anyhow::Result<EventApiWs>) {
		let actions = match result {
			Ok(ws) => {
				self.socket = Some((generation, ws));
				self.manager.on_open(generation)
			}
			Err(err) => {
				self.manager.on_error(generation, &format!("{err:#}"));
				self.manager.on_closed(generation, CloseInfo::default())
			}
		};
		self.apply(actions).await;
	}

	async fn handle_message(&mut self, generation: u64, msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>) {
		let actions = match msg {
			Some(Ok(Message::Text(text))) => self.manager.on_text(generation, text.as_str()),
			Some(Ok(Message::Close(frame))) => {
				self.socket = None;
				let close = frame
					.map(|f| CloseInfo::new(u16::from(f.code), f.reason.as_str()))
					.unwrap_or_default();
				self.manager.on_closed(generation, close)
			}
			Some(Ok(_)) => Vec::new(),
			Some(Err(err)) => {
				self.socket = None;
				self.manager.on_error(generation, &err.to_string());
				self.manager.on_closed(generation, CloseInfo::default())
			}
			None => {
				self.socket = None;
				self.manager.on_closed(generation, CloseInfo::default())
			}
		};
		self.apply(actions).await;
	}

	async fn apply(&mut self, actions: Vec<Action>) {
		let mut queue: VecDeque<Action> = actions.into();

		while let Some(action) = queue.pop_front() {
			match action {
				Action::Open { generation, url } => {
					self.drop_socket().await;
					self.connecting = Some((generation, Box::pin(connect_event_api(url))));
				}
				Action::Send { generation, text } => match self.socket.as_mut() {
					Some((current, ws)) if *current == generation => {
						if let Err(err) = ws.send(Message::Text(text.into())).await {
							warn!(error = %err, "event api send failed");
						}
					}
					_ => debug!(generation, "socket not open; dropping outbound frame"),
				},
				Action::Close { generation } => {
					if self.connecting.as_ref().is_some_and(|(g, _)| *g == generation) {
						self.connecting = None;
					}
					if self.socket.as_ref().is_some_and(|(g, _)| *g == generation) {
						self.drop_socket().await;
					}
					if self.settle_at.is_some_and(|(g, _)| g == generation) {
						self.settle_at = None;
					}
					queue.extend(self.manager.on_closed(generation, CloseInfo::default()));
				}
				Action::ScheduleSettle { generation, delay } => {
					self.settle_at = Some((generation, Instant::now() + delay));
				}
				Action::ScheduleReconnect { delay } => {
					self.reconnect_at = Some(Instant::now() + delay);
				}
				Action::Emit(event) => {
					if self.events_tx.send(event).is_err() {
						debug!("event receiver dropped");
					}
				}
			}
		}
	}

	async fn drop_socket(&mut self) {
		if let Some((generation, mut ws)) = self.socket.take() {
			if let Err(err) = ws.close(None).await {
				debug!(generation, error = %err, "event api close handshake failed");
			}
		}
	}
}

async fn connect_event_api(url: String) -> anyhow::Result<EventApiWs> {
	let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
		.await
		.with_context(|| format!("connect to event api at {url}"))?;
	Ok(ws)
}

async fn wait_connecting(
	connecting: &mut Option<(u64, BoxFuture<'static, anyhow::Result<EventApiWs>>)>,
) -> (u64, anyhow::Result<EventApiWs>) {
	match connecting.as_mut() {
		Some((generation, fut)) => {
			let generation = *generation;
			(generation, fut.await)
		}
		None => std::future::pending().await,
	}
}

async fn next_message(
	socket: &mut Option<(u64, EventApiWs)>,
) -> (u64, Option<Result<Message, tokio_tungstenite::tungstenite::Error>>) {
	match socket.as_mut() {
		Some((generation, ws)) => {
			let generation = *generation;
			(generation, ws.next().await)
		}
		None => std::future::pending().await,
	}
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
	match deadline {
		Some(at) => sleep_until(at).await,
		None => std::future::pending().await,
	}
}
