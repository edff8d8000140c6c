//! Self-healing realtime push channel.
//!
//! The channel owns one background driver task which walks the connection through its
//! lifecycle: connect, replay the tracked subscriptions, pump frames until the link is
//! lost, then wait out a jittered delay and start over. [`RealtimeChannel::teardown`]
//! is the only thing that stops the loop; a lost link never does.

pub mod dispatch;
pub mod poll;
pub mod subscription;

pub use dispatch::{HandlerError, HandlerGuard, MessageDispatcher, MessageHistory, PushMessage, StoredMessage};
pub use poll::PollFeed;
pub use subscription::SubscriptionRegistry;

// crates.io
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::{
	net::TcpStream,
	sync::{mpsc, watch},
	task::JoinHandle,
};
use tokio_tungstenite::{
	MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	config::{self, SessionConfig},
	credential::CredentialStore,
	obs::{self, FlowOutcome, SessionFlow},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle state observable by the application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
	/// No driver is running.
	#[default]
	Disconnected,
	/// The driver is dialing the server.
	Connecting,
	/// The link is up and subscriptions have been replayed.
	Connected,
	/// The link was lost; the driver is waiting out the reconnect delay.
	Reconnecting,
}
impl ConnectionState {
	/// Stable label used in logs.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Connected => "connected",
			Self::Reconnecting => "reconnecting",
		}
	}
}
impl Display for ConnectionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How one established link ended.
enum LinkOutcome {
	/// [`RealtimeChannel::teardown`] was requested; stop the driver.
	Teardown,
	/// The link dropped; reconnect after the delay.
	Lost,
}

#[derive(Debug)]
struct DriverHandle {
	cancel: CancellationToken,
	task: JoinHandle<()>,
}

struct ChannelInner {
	config: Arc<SessionConfig>,
	credentials: CredentialStore,
	state: watch::Sender<ConnectionState>,
	outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
	subscriptions: SubscriptionRegistry,
	dispatcher: MessageDispatcher,
	history: MessageHistory,
	driver: Mutex<Option<DriverHandle>>,
}

/// Handle to the push channel; cheap to clone.
#[derive(Clone)]
pub struct RealtimeChannel {
	inner: Arc<ChannelInner>,
}
impl RealtimeChannel {
	pub(crate) fn new(config: Arc<SessionConfig>, credentials: CredentialStore) -> Self {
		let history = MessageHistory::new(config.history_capacity);
		let (state, _) = watch::channel(ConnectionState::Disconnected);

		Self {
			inner: Arc::new(ChannelInner {
				config,
				credentials,
				state,
				outbound: Mutex::new(None),
				subscriptions: SubscriptionRegistry::new(),
				dispatcher: MessageDispatcher::new(),
				history,
				driver: Mutex::new(None),
			}),
		}
	}

	/// Returns the current connection state.
	pub fn state(&self) -> ConnectionState {
		*self.inner.state.borrow()
	}

	/// Returns a receiver observing connection state transitions.
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.inner.state.subscribe()
	}

	/// Starts the connection driver if it is not already running.
	pub fn connect(&self) {
		let mut driver = self.inner.driver.lock();

		if driver.is_some() {
			return;
		}

		let inner = self.inner.clone();
		let cancel = CancellationToken::new();
		let task_cancel = cancel.clone();
		let task = tokio::spawn(async move { drive(inner, task_cancel).await });

		*driver = Some(DriverHandle { cancel, task });
	}

	/// Sends a typed message over the live link.
	///
	/// Fails with [`Error::ChannelClosed`] unless the channel is currently
	/// [`ConnectionState::Connected`]; messages are never queued for a future link.
	pub fn send(&self, kind: &str, payload: serde_json::Value) -> Result<()> {
		if self.state() != ConnectionState::Connected {
			return Err(Error::ChannelClosed);
		}

		let frame = serde_json::json!({ "type": kind, "payload": payload }).to_string();
		let outbound = self.inner.outbound.lock();

		outbound
			.as_ref()
			.and_then(|tx| tx.send(WsMessage::text(frame)).ok())
			.ok_or(Error::ChannelClosed)
	}

	/// Tracks a channel and, when the link is up, tells the server about it.
	///
	/// Returns whether the channel was newly tracked. The registry update always
	/// happens; the control frame is skipped while disconnected because the next
	/// (re)connect replays the whole registry anyway.
	pub fn subscribe(&self, channel: &str) -> bool {
		let created = self.inner.subscriptions.insert(channel);

		if created && let Err(error) = self.send("subscribe", serde_json::json!({ "channel": channel })) {
			tracing::debug!(%channel, %error, "subscribe frame deferred until reconnect");
		}

		created
	}

	/// Stops tracking a channel and, when the link is up, tells the server.
	pub fn unsubscribe(&self, channel: &str) -> bool {
		let removed = self.inner.subscriptions.remove(channel);

		if removed
			&& let Err(error) =
				self.send("unsubscribe", serde_json::json!({ "channel": channel }))
		{
			tracing::debug!(%channel, %error, "unsubscribe frame dropped while disconnected");
		}

		removed
	}

	/// Returns the tracked channels.
	pub fn subscribed(&self) -> Vec<String> {
		self.inner.subscriptions.snapshot()
	}

	/// Drops every tracked channel without sending control frames.
	pub fn clear_subscriptions(&self) {
		self.inner.subscriptions.clear();
	}

	/// Registers a handler for incoming messages of the given type.
	pub fn on<F>(&self, kind: impl Into<String>, handler: F) -> HandlerGuard
	where
		F: Fn(&PushMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
	{
		self.inner.dispatcher.on(kind, handler)
	}

	/// Returns the bounded message history.
	pub fn history(&self) -> &MessageHistory {
		&self.inner.history
	}

	/// Routes a message through the dispatcher and records it in the history.
	pub(crate) fn deliver(&self, message: &PushMessage) {
		self.inner.dispatcher.dispatch(message);
		self.inner.history.record(message);
	}

	/// Stops the driver and marks the channel [`ConnectionState::Disconnected`].
	///
	/// Idempotent; a subsequent [`RealtimeChannel::connect`] starts a fresh driver.
	pub fn teardown(&self) {
		if let Some(handle) = self.inner.driver.lock().take() {
			handle.cancel.cancel();
			handle.task.abort();
		}

		*self.inner.outbound.lock() = None;

		self.inner.state.send_replace(ConnectionState::Disconnected);
	}
}
impl Debug for RealtimeChannel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RealtimeChannel")
			.field("state", &self.state())
			.field("subscriptions", &self.inner.subscriptions.len())
			.finish()
	}
}

/// Connection loop: dial, run the link, back off, repeat until cancelled.
async fn drive(inner: Arc<ChannelInner>, cancel: CancellationToken) {
	loop {
		inner.state.send_replace(ConnectionState::Connecting);

		let url = connect_url(&inner).await;

		obs::record_flow_outcome(SessionFlow::Connect, FlowOutcome::Attempt);

		let connected = tokio::select! {
			_ = cancel.cancelled() => break,
			result = connect_async(url.as_str()) => result,
		};

		match connected {
			Ok((stream, _)) => {
				obs::record_flow_outcome(SessionFlow::Connect, FlowOutcome::Success);
				tracing::debug!("push channel link established");

				let outcome = run_connection(&inner, &cancel, stream).await;

				*inner.outbound.lock() = None;

				if matches!(outcome, LinkOutcome::Teardown) {
					break;
				}
			},
			Err(error) => {
				obs::record_flow_outcome(SessionFlow::Connect, FlowOutcome::Failure);
				tracing::warn!(%error, "push channel connect failed");
			},
		}

		inner.state.send_replace(ConnectionState::Reconnecting);

		let delay = reconnect_delay(&inner.config);

		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = tokio::time::sleep(delay) => {},
		}
	}

	inner.state.send_replace(ConnectionState::Disconnected);
}

/// Runs one established link until it drops or teardown is requested.
async fn run_connection(
	inner: &Arc<ChannelInner>,
	cancel: &CancellationToken,
	stream: WsStream,
) -> LinkOutcome {
	let (mut sink, mut source) = stream.split();

	// The server holds no pre-disconnect state, so the registry is replayed before the
	// channel reports Connected; an observer seeing Connected may rely on every tracked
	// subscription being active server-side.
	for channel in inner.subscriptions.snapshot() {
		let frame =
			serde_json::json!({ "type": "subscribe", "payload": { "channel": channel } })
				.to_string();

		if let Err(error) = sink.send(WsMessage::text(frame)).await {
			tracing::warn!(%error, "subscription replay failed");

			return LinkOutcome::Lost;
		}
	}

	let (tx, mut rx) = mpsc::unbounded_channel();

	*inner.outbound.lock() = Some(tx);

	inner.state.send_replace(ConnectionState::Connected);

	loop {
		tokio::select! {
			_ = cancel.cancelled() => return LinkOutcome::Teardown,
			queued = rx.recv() => match queued {
				Some(frame) =>
					if let Err(error) = sink.send(frame).await {
						tracing::warn!(%error, "push channel send failed");

						return LinkOutcome::Lost;
					},
				None => return LinkOutcome::Teardown,
			},
			incoming = source.next() => match incoming {
				Some(Ok(WsMessage::Text(text))) => ingest(inner, text.as_str()),
				Some(Ok(WsMessage::Ping(payload))) =>
					if sink.send(WsMessage::Pong(payload)).await.is_err() {
						return LinkOutcome::Lost;
					},
				Some(Ok(WsMessage::Close(_))) | None => return LinkOutcome::Lost,
				Some(Ok(_)) => {},
				Some(Err(error)) => {
					tracing::warn!(%error, "push channel read failed");

					return LinkOutcome::Lost;
				},
			},
		}
	}
}

/// Parses and delivers one inbound text frame; malformed frames are logged and skipped.
fn ingest(inner: &Arc<ChannelInner>, text: &str) {
	let mut deserializer = serde_json::Deserializer::from_str(text);

	match serde_path_to_error::deserialize::<_, PushMessage>(&mut deserializer) {
		Ok(message) => {
			inner.dispatcher.dispatch(&message);
			inner.history.record(&message);
		},
		Err(error) => {
			tracing::warn!(%error, "skipping malformed push frame");
		},
	}
}

/// Builds the connection URL, attaching the current access token when one exists.
async fn connect_url(inner: &Arc<ChannelInner>) -> Url {
	let mut url = inner.config.realtime_base.clone();

	if let Some(token) = inner.credentials.read().await.access_token {
		url.query_pairs_mut().append_pair("token", token.expose());
	}

	url
}

fn reconnect_delay(config: &SessionConfig) -> std::time::Duration {
	let base = config::std_duration(config.reconnect_delay);
	let jitter_ms = config::std_duration(config.reconnect_jitter).as_millis() as u64;

	if jitter_ms == 0 {
		return base;
	}

	base + std::time::Duration::from_millis(rand::rng().random_range(0..jitter_ms))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn test_channel() -> RealtimeChannel {
		let config = SessionConfig::builder(
			Url::parse("https://api.example.com").expect("API base fixture should parse."),
			Url::parse("ws://127.0.0.1:1/stream").expect("Realtime base fixture should parse."),
		)
		.build()
		.expect("Default configuration should validate.");

		RealtimeChannel::new(Arc::new(config), CredentialStore::new(Arc::new(MemoryStore::default())))
	}

	#[test]
	fn send_fails_while_disconnected() {
		let channel = test_channel();
		let error = channel
			.send("ping", serde_json::json!({}))
			.expect_err("Send must fail without a live link.");

		assert!(matches!(error, Error::ChannelClosed));
	}

	#[test]
	fn subscribe_tracks_even_while_disconnected() {
		let channel = test_channel();

		assert!(channel.subscribe("trades.btc"));
		assert!(!channel.subscribe("trades.btc"));
		assert_eq!(channel.subscribed(), vec!["trades.btc".to_owned()]);
		assert!(channel.unsubscribe("trades.btc"));
		assert!(channel.subscribed().is_empty());
	}

	#[tokio::test]
	async fn teardown_is_idempotent() {
		let channel = test_channel();

		channel.teardown();
		channel.teardown();

		assert_eq!(channel.state(), ConnectionState::Disconnected);
	}

	#[test]
	fn deliver_feeds_dispatcher_and_history() {
		let channel = test_channel();
		let seen = Arc::new(Mutex::new(0_u32));
		let _guard = {
			let seen = seen.clone();

			channel.on("ticker", move |_| {
				*seen.lock() += 1;

				Ok(())
			})
		};

		channel.deliver(&PushMessage::new("ticker", serde_json::json!({ "p": 1 })));

		assert_eq!(*seen.lock(), 1);
		assert_eq!(channel.history().len(), 1);
	}
}
