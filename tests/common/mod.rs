//! Shared fixtures for the integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::MockServer;
use time::{Duration, OffsetDateTime};
use url::Url;
// arb-session
use arb_session::{
	config::{SessionConfig, SessionConfigBuilder},
	session::Session,
	store::MemoryStore,
};

/// Builds a structurally valid JWT whose `exp` claim sits `expires_in` from now.
pub fn encode_token(expires_in: Duration) -> String {
	let exp = (OffsetDateTime::now_utc() + expires_in).unix_timestamp();
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));

	format!("{header}.{payload}.signature")
}

/// Starts a configuration builder pointed at the mock server, with timers short enough
/// for test runs.
pub fn config_builder(server: &MockServer) -> SessionConfigBuilder {
	let api_base =
		Url::parse(&server.base_url()).expect("Mock server base URL should parse.");
	// Port 9 (discard) never accepts, so accidental connection attempts fail fast.
	let realtime_base =
		Url::parse("ws://127.0.0.1:9/stream").expect("Realtime base fixture should parse.");

	SessionConfig::builder(api_base, realtime_base)
		.request_timeout(Duration::seconds(5))
		.reconnect_delay(Duration::milliseconds(50))
		.reconnect_jitter(Duration::ZERO)
}

/// Builds a session over an in-memory store with the default test configuration.
pub fn session(server: &MockServer) -> Session {
	session_with(
		config_builder(server).build().expect("Test configuration should validate."),
	)
}

/// Builds a session over an in-memory store with the provided configuration.
pub fn session_with(config: SessionConfig) -> Session {
	Session::new(config, Arc::new(MemoryStore::default()))
		.expect("Session construction should succeed.")
}

/// Seeds the session's store with a token pair.
pub async fn seed(session: &Session, access: &str, refresh: &str) {
	session
		.credentials()
		.save(access, Some(refresh))
		.await
		.expect("Seeded token pair should persist.");
}
