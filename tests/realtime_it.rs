//! Push channel lifecycle against an in-process WebSocket server.

mod common;

// std
use std::net::SocketAddr;
// crates.io
use futures_util::{SinkExt, StreamExt};
use time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
	WebSocketStream, accept_async,
	tungstenite::{
		Message,
		handshake::server::{Request, Response},
	},
};
use url::Url;
// arb-session
use arb_session::{
	config::SessionConfig,
	realtime::{ConnectionState, PushMessage},
	session::Session,
};

const WAIT: std::time::Duration = std::time::Duration::from_secs(5);

fn realtime_session(ws_addr: SocketAddr) -> Session {
	let config = SessionConfig::builder(
		Url::parse("http://127.0.0.1:9").expect("API base fixture should parse."),
		Url::parse(&format!("ws://{ws_addr}/stream"))
			.expect("Realtime base fixture should parse."),
	)
	.reconnect_delay(Duration::milliseconds(50))
	.reconnect_jitter(Duration::ZERO)
	.build()
	.expect("Test configuration should validate.");

	common::session_with(config)
}

async fn bind() -> (TcpListener, SocketAddr) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Listener should bind.");
	let addr = listener.local_addr().expect("Listener should report its address.");

	(listener, addr)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
	let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
		.await
		.expect("A connection should arrive in time.")
		.expect("The connection should be accepted.");

	accept_async(stream).await.expect("The WebSocket handshake should complete.")
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
	loop {
		let frame = tokio::time::timeout(WAIT, ws.next())
			.await
			.expect("A frame should arrive in time.")
			.expect("The socket should stay open.")
			.expect("The frame should be readable.");

		if let Message::Text(text) = frame {
			return serde_json::from_str(text.as_str()).expect("The frame should be JSON.");
		}
	}
}

async fn wait_for(session: &Session, state: ConnectionState) {
	let mut rx = session.realtime().watch_state();

	tokio::time::timeout(WAIT, rx.wait_for(|current| *current == state))
		.await
		.expect("The state should be reached in time.")
		.expect("The state channel should stay open.");
}

#[tokio::test]
async fn subscriptions_replay_before_the_channel_reports_connected() {
	let (listener, addr) = bind().await;
	let session = realtime_session(addr);

	// Tracked while disconnected; the driver replays them on every (re)connect.
	session.realtime().subscribe("spreads.btc-usd");
	session.realtime().subscribe("trades.eth-usd");
	session.realtime().connect();

	let mut ws = accept(&listener).await;

	for channel in ["spreads.btc-usd", "trades.eth-usd"] {
		let frame = next_json(&mut ws).await;

		assert_eq!(frame["type"], "subscribe");
		assert_eq!(frame["payload"]["channel"], channel);
	}

	wait_for(&session, ConnectionState::Connected).await;

	// Server drops the link; the client backs off and replays on the next accept.
	drop(ws);

	let mut ws = accept(&listener).await;

	for channel in ["spreads.btc-usd", "trades.eth-usd"] {
		let frame = next_json(&mut ws).await;

		assert_eq!(frame["type"], "subscribe");
		assert_eq!(frame["payload"]["channel"], channel);
	}

	wait_for(&session, ConnectionState::Connected).await;
	session.realtime().teardown();
}

#[tokio::test]
async fn incoming_frames_dispatch_and_land_in_history() {
	let (listener, addr) = bind().await;
	let session = realtime_session(addr);
	let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
	let _guard = session.realtime().on("ticker", move |message: &PushMessage| {
		tx.send(message.payload.clone()).map_err(|e| e.to_string().into())
	});

	session.realtime().connect();

	let mut ws = accept(&listener).await;

	wait_for(&session, ConnectionState::Connected).await;

	// A malformed frame is skipped without killing the link.
	ws.send(Message::text("not json")).await.expect("The garbage frame should send.");
	ws.send(Message::text(
		serde_json::json!({ "type": "ticker", "payload": { "pair": "BTC-USD" } }).to_string(),
	))
	.await
	.expect("The ticker frame should send.");

	let payload = tokio::time::timeout(WAIT, rx.recv())
		.await
		.expect("The handler should fire in time.")
		.expect("The handler channel should stay open.");

	assert_eq!(payload["pair"], "BTC-USD");

	let history = session.realtime().history().recent();

	assert_eq!(history.len(), 1);
	assert_eq!(history[0].message.kind, "ticker");

	session.realtime().teardown();
}

#[tokio::test]
async fn send_round_trips_over_a_live_link() {
	let (listener, addr) = bind().await;
	let session = realtime_session(addr);

	session.realtime().connect();

	let mut ws = accept(&listener).await;

	wait_for(&session, ConnectionState::Connected).await;
	session
		.realtime()
		.send("ping", serde_json::json!({ "n": 1 }))
		.expect("Send over a live link should succeed.");

	let frame = next_json(&mut ws).await;

	assert_eq!(frame["type"], "ping");
	assert_eq!(frame["payload"]["n"], 1);

	session.realtime().teardown();
}

#[tokio::test]
async fn connect_url_carries_the_access_token() {
	let (listener, addr) = bind().await;
	let session = realtime_session(addr);

	common::seed(&session, "access-1", "refresh-1").await;
	session.realtime().connect();

	let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
		.await
		.expect("A connection should arrive in time.")
		.expect("The connection should be accepted.");
	let (tx, rx) = tokio::sync::oneshot::channel();
	let _ws = tokio_tungstenite::accept_hdr_async(
		stream,
		move |request: &Request, response: Response| {
			let _ = tx.send(request.uri().to_string());

			Ok(response)
		},
	)
	.await
	.expect("The WebSocket handshake should complete.");
	let uri = rx.await.expect("The handshake callback should report the URI.");

	assert!(uri.contains("token=access-1"), "URI should carry the token, got {uri}.");

	session.realtime().teardown();
}

#[tokio::test]
async fn teardown_stops_the_reconnect_loop() {
	let (listener, addr) = bind().await;
	let session = realtime_session(addr);

	session.realtime().connect();

	let _ws = accept(&listener).await;

	wait_for(&session, ConnectionState::Connected).await;
	session.realtime().teardown();

	assert_eq!(session.realtime().state(), ConnectionState::Disconnected);

	// No further dial attempts arrive once the driver is gone.
	let extra = tokio::time::timeout(
		std::time::Duration::from_millis(300),
		listener.accept(),
	)
	.await;

	assert!(extra.is_err(), "Teardown must stop reconnect attempts.");
}
