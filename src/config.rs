//! Session configuration: endpoints, expiry buffers, and timer intervals.
//!
//! Every timing knob the crate consults lives here as a named field with a named
//! default, so the reactive and proactive expiry checks can never drift apart through
//! duplicated magic numbers at the call sites.

// self
use crate::{_prelude::*, error::ConfigError};

/// Validated configuration consumed by [`Session`](crate::session::Session).
#[derive(Clone, Debug)]
pub struct SessionConfig {
	/// Base URL for the REST API (http or https).
	pub api_base: Url,
	/// Base URL for the push channel (ws or wss).
	pub realtime_base: Url,
	/// Default per-request deadline.
	pub request_timeout: Duration,
	/// Expiry buffer used by reactive freshness checks on the request path.
	pub reactive_expiry_buffer: Duration,
	/// Expiry buffer used by the proactive renewal scheduler.
	pub proactive_expiry_buffer: Duration,
	/// Tick interval of the proactive renewal scheduler.
	pub renewal_interval: Duration,
	/// Base delay before a push-channel reconnect attempt.
	pub reconnect_delay: Duration,
	/// Upper bound of the random jitter added to each reconnect delay.
	pub reconnect_jitter: Duration,
	/// Maximum number of retained push messages.
	pub history_capacity: usize,
}
impl SessionConfig {
	/// Default expiry buffer shared by the reactive and proactive checks.
	pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::seconds(300);
	/// Default bound on history retention.
	pub const DEFAULT_HISTORY_CAPACITY: usize = 200;
	/// Default reconnect delay for the push channel.
	pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::seconds(5);
	/// Default reconnect jitter bound.
	pub const DEFAULT_RECONNECT_JITTER: Duration = Duration::seconds(1);
	/// Default proactive scheduler interval.
	pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::seconds(60);
	/// Default per-request deadline.
	pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(30);

	/// Starts a builder for the provided API and realtime base URLs.
	pub fn builder(api_base: Url, realtime_base: Url) -> SessionConfigBuilder {
		SessionConfigBuilder {
			api_base,
			realtime_base,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			reactive_expiry_buffer: Self::DEFAULT_EXPIRY_BUFFER,
			proactive_expiry_buffer: Self::DEFAULT_EXPIRY_BUFFER,
			renewal_interval: Self::DEFAULT_RENEWAL_INTERVAL,
			reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
			reconnect_jitter: Self::DEFAULT_RECONNECT_JITTER,
			history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
		}
	}

	/// Resolves an API endpoint path against the base URL.
	pub(crate) fn endpoint(&self, path: &str) -> Url {
		let mut url = self.api_base.clone();

		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().extend(path.trim_start_matches('/').split('/'));
		}

		url
	}
}

/// Builder validating a [`SessionConfig`] before any component consumes it.
#[derive(Clone, Debug)]
pub struct SessionConfigBuilder {
	api_base: Url,
	realtime_base: Url,
	request_timeout: Duration,
	reactive_expiry_buffer: Duration,
	proactive_expiry_buffer: Duration,
	renewal_interval: Duration,
	reconnect_delay: Duration,
	reconnect_jitter: Duration,
	history_capacity: usize,
}
impl SessionConfigBuilder {
	/// Overrides the per-request deadline.
	pub fn request_timeout(mut self, value: Duration) -> Self {
		self.request_timeout = value;

		self
	}

	/// Overrides the reactive expiry buffer.
	pub fn reactive_expiry_buffer(mut self, value: Duration) -> Self {
		self.reactive_expiry_buffer = value;

		self
	}

	/// Overrides the proactive expiry buffer.
	pub fn proactive_expiry_buffer(mut self, value: Duration) -> Self {
		self.proactive_expiry_buffer = value;

		self
	}

	/// Overrides the proactive scheduler interval.
	pub fn renewal_interval(mut self, value: Duration) -> Self {
		self.renewal_interval = value;

		self
	}

	/// Overrides the push-channel reconnect delay.
	pub fn reconnect_delay(mut self, value: Duration) -> Self {
		self.reconnect_delay = value;

		self
	}

	/// Overrides the reconnect jitter bound; zero disables jitter.
	pub fn reconnect_jitter(mut self, value: Duration) -> Self {
		self.reconnect_jitter = value;

		self
	}

	/// Overrides the history retention bound.
	pub fn history_capacity(mut self, value: usize) -> Self {
		self.history_capacity = value;

		self
	}

	/// Validates and produces the final configuration.
	pub fn build(self) -> Result<SessionConfig, ConfigError> {
		if !matches!(self.api_base.scheme(), "http" | "https") {
			return Err(ConfigError::InvalidApiBase { url: self.api_base.to_string() });
		}
		if !matches!(self.realtime_base.scheme(), "ws" | "wss") {
			return Err(ConfigError::InvalidRealtimeBase { url: self.realtime_base.to_string() });
		}

		for (field, value) in [
			("request_timeout", self.request_timeout),
			("reactive_expiry_buffer", self.reactive_expiry_buffer),
			("proactive_expiry_buffer", self.proactive_expiry_buffer),
			("renewal_interval", self.renewal_interval),
			("reconnect_delay", self.reconnect_delay),
		] {
			if !value.is_positive() {
				return Err(ConfigError::NonPositiveDuration { field });
			}
		}
		if self.reconnect_jitter.is_negative() {
			return Err(ConfigError::NonPositiveDuration { field: "reconnect_jitter" });
		}
		if self.history_capacity == 0 {
			return Err(ConfigError::ZeroHistoryCapacity);
		}

		Ok(SessionConfig {
			api_base: self.api_base,
			realtime_base: self.realtime_base,
			request_timeout: self.request_timeout,
			reactive_expiry_buffer: self.reactive_expiry_buffer,
			proactive_expiry_buffer: self.proactive_expiry_buffer,
			renewal_interval: self.renewal_interval,
			reconnect_delay: self.reconnect_delay,
			reconnect_jitter: self.reconnect_jitter,
			history_capacity: self.history_capacity,
		})
	}
}

/// Converts a validated (non-negative) [`Duration`] into the std form timers expect.
pub(crate) fn std_duration(value: Duration) -> std::time::Duration {
	std::time::Duration::try_from(value).unwrap_or_default()
}
