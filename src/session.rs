//! Session aggregate wiring credentials, transport, renewal, and the push channel.

pub mod login;
pub mod refresh;
pub mod scheduler;

pub use refresh::RenewalMetrics;
pub use scheduler::SchedulerHandle;

// self
use crate::{
	_prelude::*,
	config::{self, SessionConfig},
	credential::CredentialStore,
	error::ConfigError,
	realtime::RealtimeChannel,
	session::refresh::RefreshCoordinator,
	store::SessionStore,
};
// crates.io
use tokio::sync::watch;

/// Authentication phase observed by the application shell.
///
/// The phase is the crate's "requires re-authentication" signal: an application
/// watching it redirects to its login surface on [`SessionPhase::ReauthRequired`].
/// Because the phase only escalates out of [`SessionPhase::Authenticated`], a shell
/// already showing the login surface never receives a second redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
	/// No usable credentials are present.
	Unauthenticated,
	/// Valid credentials are present.
	Authenticated,
	/// Renewal failed unrecoverably; the user must log in again.
	ReauthRequired,
}

/// Client session coordinating every other component in this crate.
///
/// Cheap to clone; all state lives behind shared handles, so background tasks hold
/// their own clone instead of borrowing across spawns.
#[derive(Clone)]
pub struct Session {
	pub(crate) config: Arc<SessionConfig>,
	pub(crate) http: ReqwestClient,
	pub(crate) credentials: CredentialStore,
	pub(crate) coordinator: Arc<RefreshCoordinator>,
	pub(crate) realtime: RealtimeChannel,
	pub(crate) phase: Arc<watch::Sender<SessionPhase>>,
	pub(crate) scheduler: Arc<Mutex<Option<SchedulerHandle>>>,
}
impl Session {
	/// Builds a session over the provided configuration and storage backend.
	pub fn new(config: SessionConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
		let http = ReqwestClient::builder()
			.timeout(config::std_duration(config.request_timeout))
			.build()
			.map_err(ConfigError::from)?;
		let config = Arc::new(config);
		let credentials = CredentialStore::new(store);
		let realtime = RealtimeChannel::new(config.clone(), credentials.clone());
		let (phase, _) = watch::channel(SessionPhase::Unauthenticated);

		Ok(Self {
			config,
			http,
			credentials,
			coordinator: Arc::new(RefreshCoordinator::new()),
			realtime,
			phase: Arc::new(phase),
			scheduler: Arc::new(Mutex::new(None)),
		})
	}

	/// Restores persisted credentials at startup.
	///
	/// An access token whose claims no longer decode is discarded outright; a decodable
	/// but already-expired token is renewed through the normal single-flight path (its
	/// failure clears the session exactly like a reactive one). Either way the caller
	/// ends up with a phase that matches what is actually usable.
	pub async fn initialize(&self) -> Result<()> {
		let credential = self.credentials.read().await;

		if !credential.is_authenticated() {
			return Ok(());
		}
		if credential.expires_at.is_none() {
			self.credentials.clear().await?;

			return Ok(());
		}

		self.set_phase(SessionPhase::Authenticated);
		self.start_renewal_scheduler();

		if credential.is_expired_at(OffsetDateTime::now_utc(), Duration::ZERO)
			&& let Err(error) = self.ensure_fresh(false).await
		{
			tracing::warn!(%error, "startup renewal failed");
		}

		Ok(())
	}

	/// Returns a receiver observing phase transitions.
	pub fn phase(&self) -> watch::Receiver<SessionPhase> {
		self.phase.subscribe()
	}

	/// Returns the current phase snapshot.
	pub fn current_phase(&self) -> SessionPhase {
		*self.phase.borrow()
	}

	/// Returns the credential store shared across components.
	pub fn credentials(&self) -> &CredentialStore {
		&self.credentials
	}

	/// Returns the push channel owned by this session.
	pub fn realtime(&self) -> &RealtimeChannel {
		&self.realtime
	}

	/// Returns the renewal counters.
	pub fn renewal_metrics(&self) -> &RenewalMetrics {
		self.coordinator.metrics()
	}

	pub(crate) fn set_phase(&self, phase: SessionPhase) {
		self.phase.send_replace(phase);
	}

	/// Publishes [`SessionPhase::ReauthRequired`], but only out of an authenticated
	/// session so an application already on its login surface is left alone.
	pub(crate) fn escalate_reauth(&self) {
		self.phase.send_if_modified(|phase| {
			if *phase == SessionPhase::Authenticated {
				*phase = SessionPhase::ReauthRequired;

				true
			} else {
				false
			}
		});
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("api_base", &self.config.api_base.as_str())
			.field("realtime_base", &self.config.realtime_base.as_str())
			.field("phase", &self.current_phase())
			.finish()
	}
}
