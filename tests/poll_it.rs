//! Polling fallback against a mocked API.

mod common;

// crates.io
use httpmock::{Method::GET, MockServer};
use serde_json::json;
use time::Duration;
// arb-session
use arb_session::realtime::PushMessage;

#[tokio::test]
async fn poll_ticks_feed_the_dispatcher_and_history() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/updates");
			then.status(200).json_body(json!([
				{ "type": "ticker", "payload": { "pair": "BTC-USD" } },
				{ "type": "spread", "payload": { "bps": 12 } },
			]));
		})
		.await;
	let session = common::session(&server);
	let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
	let _guard = session.realtime().on("ticker", move |message: &PushMessage| {
		tx.send(message.payload.clone()).map_err(|e| e.to_string().into())
	});
	let feed = session.start_poll_feed("updates", Duration::milliseconds(100));
	let payload = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
		.await
		.expect("The handler should fire in time.")
		.expect("The handler channel should stay open.");

	assert_eq!(payload["pair"], "BTC-USD");
	assert!(mock.hits_async().await >= 1);

	// Both messages from the tick land in the history, handled or not.
	assert!(session.realtime().history().len() >= 2);

	feed.cancel();
}

#[tokio::test]
async fn cancelled_feed_stops_polling() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/updates");
			then.status(200).json_body(json!([]));
		})
		.await;
	let session = common::session(&server);
	let feed = session.start_poll_feed("updates", Duration::milliseconds(50));

	tokio::time::sleep(std::time::Duration::from_millis(150)).await;
	feed.cancel();

	// Let any in-flight tick drain before snapshotting the counter.
	tokio::time::sleep(std::time::Duration::from_millis(100)).await;

	let hits = mock.hits_async().await;

	assert!(hits >= 1);
	tokio::time::sleep(std::time::Duration::from_millis(300)).await;

	assert_eq!(mock.hits_async().await, hits);
}

#[tokio::test]
async fn poll_failures_keep_the_timer_running() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/updates");
			then.status(500);
		})
		.await;
	let session = common::session(&server);
	let feed = session.start_poll_feed("updates", Duration::milliseconds(50));

	tokio::time::sleep(std::time::Duration::from_millis(300)).await;

	// Every failed tick is followed by another attempt.
	assert!(mock.hits_async().await >= 2);
	assert!(session.realtime().history().is_empty());

	feed.cancel();
}
