//! Session-wide error types shared by the transport, renewal, and realtime layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical session error exposed by public APIs.
///
/// The variants mirror the response classes the transport distinguishes: only
/// [`Error::Unauthorized`] feeds the refresh-and-retry path, and only the four
/// transient classes ([`Error::RateLimited`], [`Error::ServerError`],
/// [`Error::Timeout`], [`Error::NetworkUnreachable`]) may be absorbed by a
/// caller-supplied fallback value.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Current access token was rejected by the server.
	#[error("Server rejected the access token: {reason}.")]
	Unauthorized {
		/// Server- or client-supplied reason string.
		reason: String,
	},
	/// Refresh token is missing, expired, or was rejected; the session is over.
	#[error("Token renewal failed: {reason}.")]
	RenewalFailed {
		/// Human-readable failure summary.
		reason: String,
	},
	/// Server signalled throttling.
	#[error("Server is rate limiting requests.")]
	RateLimited {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Server-side (5xx) failure.
	#[error("Server error {status}: {message}.")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Truncated response body, when one was returned.
		message: String,
	},
	/// Request exceeded its deadline.
	#[error("Request timed out.")]
	Timeout,
	/// No response was received at all.
	#[error("Network is unreachable.")]
	NetworkUnreachable {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Push channel is not connected; the send was a detectable no-op.
	#[error("Push channel is not connected.")]
	ChannelClosed,

	/// Server returned a response class outside the taxonomy (e.g. 404).
	#[error("Unexpected response {status}: {message}.")]
	Unexpected {
		/// HTTP status code.
		status: u16,
		/// Truncated response body, when one was returned.
		message: String,
	},
	/// Response body could not be parsed as the expected JSON shape.
	#[error("Response body is malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl Error {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::NetworkUnreachable { source: Box::new(src) }
	}

	/// Builds an [`Error::Unauthorized`] with the provided reason.
	pub fn unauthorized(reason: impl Into<String>) -> Self {
		Self::Unauthorized { reason: reason.into() }
	}

	/// Builds an [`Error::RenewalFailed`] with the provided reason.
	pub fn renewal_failed(reason: impl Into<String>) -> Self {
		Self::RenewalFailed { reason: reason.into() }
	}

	/// Returns whether a caller-supplied fallback value may stand in for this error.
	///
	/// Authorization failures never qualify: continuing with fabricated data while the
	/// token set is dead would mask the one failure the application must react to.
	pub fn absorbs_fallback(&self) -> bool {
		matches!(
			self,
			Self::RateLimited { .. }
				| Self::ServerError { .. }
				| Self::Timeout
				| Self::NetworkUnreachable { .. }
		)
	}
}
impl From<reqwest::Error> for Error {
	fn from(e: reqwest::Error) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}

/// Configuration and validation failures raised while wiring up a session.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// API base URL must use http or https.
	#[error("API base URL must use http(s): {url}.")]
	InvalidApiBase {
		/// URL that failed validation.
		url: String,
	},
	/// Realtime base URL must use ws or wss.
	#[error("Realtime base URL must use ws(s): {url}.")]
	InvalidRealtimeBase {
		/// URL that failed validation.
		url: String,
	},
	/// Timing fields must be positive durations.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Name of the offending configuration field.
		field: &'static str,
	},
	/// Message history must be able to hold at least one entry.
	#[error("Message history capacity must be at least 1.")]
	ZeroHistoryCapacity,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk unavailable"));

		let source = StdError::source(&error)
			.expect("Session error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn only_transient_classes_absorb_fallbacks() {
		assert!(Error::Timeout.absorbs_fallback());
		assert!(Error::RateLimited { retry_after: None }.absorbs_fallback());
		assert!(Error::ServerError { status: 502, message: "bad gateway".into() }
			.absorbs_fallback());
		assert!(!Error::unauthorized("expired").absorbs_fallback());
		assert!(!Error::renewal_failed("rejected").absorbs_fallback());
		assert!(!Error::ChannelClosed.absorbs_fallback());
	}
}
