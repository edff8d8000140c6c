//! Authenticated HTTP transport.
//!
//! Every outbound API request flows through [`Session::execute`]: the current bearer
//! token is attached when one exists, responses are classified into the crate's error
//! taxonomy, and an expired-token rejection triggers exactly one coordinated renewal
//! followed by exactly one retry. Callers that prefer degraded data over a hard error
//! use [`Session::execute_or`] with an explicit fallback value.

// crates.io
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config,
	obs::{self, SessionFlow},
	session::Session,
};

const BODY_SNIPPET_LIMIT: usize = 256;

/// One outbound API request.
///
/// The `retried` flag lives on the request value itself, so the 401 recovery path runs
/// at most once per request no matter how the attempt interleaves with other callers.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the configured API base.
	pub path: String,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Per-request deadline override.
	pub timeout: Option<Duration>,
	pub(crate) retried: bool,
}
impl ApiRequest {
	/// Creates a request with the provided method and relative path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), body: None, timeout: None, retried: false }
	}

	/// Creates a GET request for the provided relative path.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Creates a POST request for the provided relative path.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Creates a DELETE request for the provided relative path.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Attaches a JSON body.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Overrides the default per-request deadline.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

impl Session {
	/// Executes a request and deserializes the JSON response body.
	pub async fn execute<T>(&self, request: ApiRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let (status, bytes) = self.execute_raw(request).await?;

		parse_body(&bytes, status)
	}

	/// Executes a request, discarding any response body.
	pub async fn execute_empty(&self, request: ApiRequest) -> Result<()> {
		self.execute_raw(request).await.map(|_| ())
	}

	/// Executes a request, substituting `fallback` for transient failures.
	///
	/// Only the four transient classes (rate limiting, server errors, timeouts, and
	/// unreachable networks) are absorbed; authorization failures always propagate so
	/// the application can react to a dead session instead of rendering stand-in data.
	pub async fn execute_or<T>(&self, request: ApiRequest, fallback: T) -> Result<T>
	where
		T: DeserializeOwned,
	{
		match self.execute(request).await {
			Ok(value) => Ok(value),
			Err(error) if error.absorbs_fallback() => {
				tracing::debug!(%error, "substituting caller-supplied fallback value");

				Ok(fallback)
			},
			Err(error) => Err(error),
		}
	}

	async fn execute_raw(&self, mut request: ApiRequest) -> Result<(u16, Vec<u8>)> {
		let span = obs::flow_span(SessionFlow::Request, "execute");

		async move {
			let mut renewed: Option<TokenSecret> = None;

			loop {
				// Read the store on every attempt so a renewal settled by some other
				// caller is picked up immediately; a retry after our own renewal uses
				// the token that renewal produced.
				let token = match renewed.take() {
					Some(token) => Some(token),
					None => self.credentials.read().await.access_token,
				};
				let had_token = token.is_some();
				let response = self.send_request(&request, token.as_ref()).await?;
				let status = response.status();

				if status == StatusCode::UNAUTHORIZED && had_token && !request.retried {
					request.retried = true;

					renewed = Some(self.ensure_fresh(true).await?);

					continue;
				}
				if status.is_success() {
					let bytes = response.bytes().await.map_err(Error::from)?;

					return Ok((status.as_u16(), bytes.to_vec()));
				}

				return Err(classify_response(response).await);
			}
		}
		.instrument(span)
		.await
	}

	async fn send_request(
		&self,
		request: &ApiRequest,
		token: Option<&TokenSecret>,
	) -> Result<reqwest::Response> {
		let url = self.config.endpoint(&request.path);
		let mut builder = self.http.request(request.method.clone(), url);

		if let Some(token) = token {
			builder = builder.bearer_auth(token.expose());
		}
		if let Some(body) = &request.body {
			builder = builder.json(body);
		}
		if let Some(timeout) = request.timeout {
			builder = builder.timeout(config::std_duration(timeout));
		}

		builder.send().await.map_err(Error::from)
	}
}

/// Maps a non-success response onto the error taxonomy.
async fn classify_response(response: reqwest::Response) -> Error {
	let status = response.status();
	let retry_after = parse_retry_after(response.headers());
	let message = body_snippet(response).await;

	match status {
		StatusCode::UNAUTHORIZED => Error::unauthorized(message),
		StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { retry_after },
		status if status.is_server_error() =>
			Error::ServerError { status: status.as_u16(), message },
		status => Error::Unexpected { status: status.as_u16(), message },
	}
}

async fn body_snippet(response: reqwest::Response) -> String {
	let text = response.text().await.unwrap_or_default();
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return "no response body".into();
	}

	trimmed.chars().take(BODY_SNIPPET_LIMIT).collect()
}

fn parse_body<T>(bytes: &[u8], status: u16) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::ResponseParse { source, status: Some(status) })
}

/// Parses a `Retry-After` header as either delta-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn request_builders_set_method_and_flags() {
		let request = ApiRequest::post("orders")
			.with_body(serde_json::json!({ "pair": "BTC-USD" }))
			.with_timeout(Duration::seconds(5));

		assert_eq!(request.method, Method::POST);
		assert_eq!(request.path, "orders");
		assert!(request.body.is_some());
		assert!(!request.retried);
	}

	#[test]
	fn retry_after_parses_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "120".parse().expect("Header fixture should parse."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(120)));
	}

	#[test]
	fn retry_after_ignores_garbage() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "soon".parse().expect("Header fixture should parse."));

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn parse_body_reports_malformed_json() {
		let error = parse_body::<serde_json::Value>(b"{not json", 200)
			.expect_err("Malformed body must not parse.");

		assert!(matches!(error, Error::ResponseParse { status: Some(200), .. }));
	}
}
