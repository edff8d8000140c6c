//! Login and logout flows.

// crates.io
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	http::ApiRequest,
	obs::{self, FlowOutcome, SessionFlow},
	session::{Session, SessionPhase},
};

pub(crate) const LOGIN_PATH: &str = "auth/login";
pub(crate) const LOGOUT_PATH: &str = "auth/logout";

/// Login response wire shape.
#[derive(Debug, Deserialize)]
struct LoginResponse {
	access: String,
	refresh: String,
	#[serde(default)]
	user: Option<serde_json::Value>,
}

impl Session {
	/// Exchanges username/password for a token pair and activates the session.
	///
	/// On success the credential store holds the new pair, the proactive renewal
	/// scheduler is running, and the push channel is (re)connecting. Returns the user
	/// profile snapshot when the server includes one.
	pub async fn login(
		&self,
		username: &str,
		password: &str,
	) -> Result<Option<serde_json::Value>> {
		let span = obs::flow_span(SessionFlow::Login, "login");

		obs::record_flow_outcome(SessionFlow::Login, FlowOutcome::Attempt);

		let result = async move {
			let request = ApiRequest::post(LOGIN_PATH).with_body(serde_json::json!({
				"username": username,
				"password": password,
			}));
			let response: LoginResponse = self.execute(request).await?;

			self.credentials.save(&response.access, Some(&response.refresh)).await?;

			if let Some(user) = &response.user {
				self.credentials.save_profile(user).await?;
			}

			self.set_phase(SessionPhase::Authenticated);
			self.start_renewal_scheduler();
			// A session that just became authenticated reopens the push channel if a
			// previous teardown (or never having connected) left it down.
			self.realtime.connect();

			Ok(response.user)
		}
		.instrument(span)
		.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(SessionFlow::Login, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(SessionFlow::Login, FlowOutcome::Failure),
		}

		result
	}

	/// Ends the session locally and, on a best-effort basis, server-side.
	///
	/// The logout endpoint invalidating the refresh token may fail or be unreachable;
	/// local teardown (timers, push channel, subscriptions, stored keys) happens
	/// regardless, and the stored keys are removed in one operation.
	pub async fn logout(&self) -> Result<()> {
		let span = obs::flow_span(SessionFlow::Logout, "logout");

		async move {
			let credential = self.credentials.read().await;

			if let Some(refresh) = credential.refresh_token {
				let request = ApiRequest::post(LOGOUT_PATH).with_body(serde_json::json!({
					"refresh_token": refresh.expose(),
				}));

				if let Err(error) = self.execute_empty(request).await {
					tracing::debug!(%error, "server-side logout failed; continuing locally");
				}
			}

			self.stop_renewal_scheduler();
			self.realtime.teardown();
			self.realtime.clear_subscriptions();
			self.credentials.clear().await?;
			self.set_phase(SessionPhase::Unauthenticated);

			Ok(())
		}
		.instrument(span)
		.await
	}
}
