//! Single-flight token renewal with FIFO caller queuing.
//!
//! The session exposes [`Session::ensure_fresh`] so any caller can demand a usable
//! access token without worrying about concurrent renewals. The first caller to find
//! the coordinator idle performs exactly one renewal request; everyone arriving while
//! that request is in flight parks in an arrival-ordered queue and is settled with the
//! renewal's outcome before any later caller is served. Server-side rejection of the
//! refresh token clears every persisted session key and escalates the phase; transport
//! failures leave credentials in place for a later attempt. A performer dropped
//! mid-renewal settles its queue with a failure instead of wedging the coordinator.

mod metrics;

pub use metrics::RenewalMetrics;

// crates.io
use tokio::sync::oneshot;
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	obs::{self, FlowOutcome, SessionFlow},
	session::Session,
};

pub(crate) const TOKEN_REFRESH_PATH: &str = "auth/token/refresh";

/// Renewal response wire shape.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
	access: String,
}

/// Why a renewal settled without producing a token.
#[derive(Clone, Debug)]
enum RenewalFailure {
	/// No refresh token to renew with; the session was cleared.
	MissingRefreshToken,
	/// Server rejected the refresh token; the session was cleared.
	Rejected { reason: String },
	/// Renewal never completed; credentials were left in place.
	Incomplete { message: String },
}
impl RenewalFailure {
	fn into_error(self) -> Error {
		match self {
			Self::MissingRefreshToken =>
				Error::renewal_failed("no refresh token is available"),
			Self::Rejected { reason } => Error::renewal_failed(reason),
			Self::Incomplete { message } => Error::NetworkUnreachable {
				source: message.into(),
			},
		}
	}
}

type RenewalOutcome = Result<TokenSecret, RenewalFailure>;
type PendingCaller = oneshot::Sender<RenewalOutcome>;

/// How a caller enters the coordinator.
enum Entry {
	/// The stored token is still fresh; use it as-is.
	Fresh(TokenSecret),
	/// This caller owns the renewal request.
	Perform,
	/// A renewal is already in flight; await its outcome.
	Wait(oneshot::Receiver<RenewalOutcome>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum RenewalPhase {
	#[default]
	Idle,
	Refreshing,
}

#[derive(Default)]
struct CoordinatorState {
	phase: RenewalPhase,
	pending: VecDeque<PendingCaller>,
}

/// Explicit single-flight state owned by one session.
///
/// Holding the state in a dedicated object (instead of ambient statics) is what makes
/// the single-flight invariant testable: at most one renewal request is in flight, and
/// every concurrent caller is parked in arrival order.
#[derive(Default)]
pub(crate) struct RefreshCoordinator {
	state: Mutex<CoordinatorState>,
	metrics: RenewalMetrics,
}
impl RefreshCoordinator {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn is_refreshing(&self) -> bool {
		self.state.lock().phase == RenewalPhase::Refreshing
	}

	pub(crate) fn metrics(&self) -> &RenewalMetrics {
		&self.metrics
	}

	/// Admits a caller: reuse a fresh token, become the performer, or park in queue.
	///
	/// `fresh` carries the caller's pre-read token when it considers the stored token
	/// usable; it is honored only while the coordinator is idle, because a renewal in
	/// flight means somebody already found that token wanting.
	fn enter(&self, fresh: Option<TokenSecret>) -> Entry {
		let mut state = self.state.lock();

		match state.phase {
			RenewalPhase::Refreshing => {
				let (tx, rx) = oneshot::channel();

				state.pending.push_back(tx);

				Entry::Wait(rx)
			},
			RenewalPhase::Idle => match fresh {
				Some(token) => Entry::Fresh(token),
				None => {
					state.phase = RenewalPhase::Refreshing;

					Entry::Perform
				},
			},
		}
	}

	/// Settles the in-flight renewal, draining queued callers in arrival order.
	fn settle(&self, outcome: &RenewalOutcome) {
		let drained = {
			let mut state = self.state.lock();

			state.phase = RenewalPhase::Idle;

			std::mem::take(&mut state.pending)
		};

		for caller in drained {
			let _ = caller.send(outcome.clone());
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator").field("refreshing", &self.is_refreshing()).finish()
	}
}

/// Settles the coordinator if the performing future is dropped before completing.
///
/// `ensure_fresh` futures can be dropped at any await point (task aborts, timeouts,
/// `select!` races); an armed guard going down drains the pending queue with an
/// incomplete-renewal failure so the coordinator returns to idle instead of parking
/// every later caller forever. Credentials stay in place, so a later caller performs
/// its own renewal.
struct SettleGuard<'a> {
	coordinator: &'a RefreshCoordinator,
	armed: bool,
}
impl<'a> SettleGuard<'a> {
	fn new(coordinator: &'a RefreshCoordinator) -> Self {
		Self { coordinator, armed: true }
	}

	fn settle(mut self, outcome: &RenewalOutcome) {
		self.armed = false;

		self.coordinator.settle(outcome);
	}
}
impl Drop for SettleGuard<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.coordinator.metrics.record_failure();
			self.coordinator.settle(&Err(RenewalFailure::Incomplete {
				message: "renewal was dropped before settling".into(),
			}));
		}
	}
}

impl Session {
	/// Returns an access token that was fresh when this call settled.
	///
	/// `force` skips the local expiry check; the transport uses it after the server
	/// has independently rejected a token that still looked fresh locally.
	pub async fn ensure_fresh(&self, force: bool) -> Result<TokenSecret> {
		self.ensure_fresh_within(force, self.config.reactive_expiry_buffer).await
	}

	/// Renewal entry point parameterized over the expiry buffer, so the proactive
	/// scheduler can demand a wider freshness window than the reactive request path.
	pub(crate) async fn ensure_fresh_within(
		&self,
		force: bool,
		buffer: Duration,
	) -> Result<TokenSecret> {
		let span = obs::flow_span(SessionFlow::Renewal, "ensure_fresh");

		async move {
			let credential = self.credentials.read().await;
			let fresh = if force
				|| credential.is_expired_at(OffsetDateTime::now_utc(), buffer)
			{
				None
			} else {
				credential.access_token
			};

			match self.coordinator.enter(fresh) {
				Entry::Fresh(token) => Ok(token),
				Entry::Wait(rx) => {
					self.coordinator.metrics.record_coalesced();

					rx.await
						.map_err(|_| {
							Error::renewal_failed("renewal was abandoned before settling")
						})?
						.map_err(RenewalFailure::into_error)
				},
				Entry::Perform => {
					obs::record_flow_outcome(SessionFlow::Renewal, FlowOutcome::Attempt);
					self.coordinator.metrics.record_attempt();

					// The guard settles the queue even if this future is dropped at the
					// await below.
					let guard = SettleGuard::new(&self.coordinator);
					let outcome = self.perform_renewal(force, buffer).await;

					// Queued callers drain before this performer returns, so nobody
					// arriving later can be served ahead of them.
					guard.settle(&outcome);

					match outcome {
						Ok(token) => {
							self.coordinator.metrics.record_success();
							obs::record_flow_outcome(SessionFlow::Renewal, FlowOutcome::Success);

							Ok(token)
						},
						Err(failure) => {
							self.coordinator.metrics.record_failure();
							obs::record_flow_outcome(SessionFlow::Renewal, FlowOutcome::Failure);

							Err(failure.into_error())
						},
					}
				},
			}
		}
		.instrument(span)
		.await
	}

	/// Issues the one renewal request this coordinator cycle is allowed.
	async fn perform_renewal(&self, force: bool, buffer: Duration) -> RenewalOutcome {
		let credential = self.credentials.read().await;

		// Another caller may have settled a renewal between our snapshot and taking
		// the performer slot; skip the network round trip when the store caught up.
		if !force
			&& !credential.is_expired_at(OffsetDateTime::now_utc(), buffer)
			&& let Some(token) = credential.access_token
		{
			return Ok(token);
		}

		let Some(refresh) = credential.refresh_token else {
			self.clear_after_rejection().await;

			return Err(RenewalFailure::MissingRefreshToken);
		};
		let url = self.config.endpoint(TOKEN_REFRESH_PATH);
		let response = match self
			.http
			.post(url)
			.json(&serde_json::json!({ "refresh": refresh.expose() }))
			.send()
			.await
		{
			Ok(response) => response,
			Err(error) => {
				tracing::warn!(%error, "renewal request failed to complete");

				return Err(RenewalFailure::Incomplete { message: error.to_string() });
			},
		};
		let status = response.status();

		if status.is_client_error() {
			self.clear_after_rejection().await;

			return Err(RenewalFailure::Rejected {
				reason: format!("renewal endpoint returned {status}"),
			});
		}
		if !status.is_success() {
			return Err(RenewalFailure::Incomplete {
				message: format!("renewal endpoint returned {status}"),
			});
		}

		let bytes = response.bytes().await.map_err(|error| RenewalFailure::Incomplete {
			message: error.to_string(),
		})?;
		let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
		let parsed: RefreshResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|error| RenewalFailure::Incomplete { message: error.to_string() })?;

		self.credentials
			.save(&parsed.access, None)
			.await
			.map_err(|error| RenewalFailure::Incomplete { message: error.to_string() })?;

		Ok(TokenSecret::new(parsed.access))
	}

	/// Unrecoverable rejection: wipe the session keys and signal re-authentication.
	async fn clear_after_rejection(&self) {
		if let Err(error) = self.credentials.clear().await {
			tracing::warn!(%error, "failed to clear credentials after renewal rejection");
		}

		self.escalate_reauth();
	}
}
