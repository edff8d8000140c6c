//! Background task that renews the access token before callers can notice expiry.

// crates.io
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, config, session::Session};

/// Handle owning the proactive renewal task.
///
/// Cancelling (or dropping) the handle stops the timer, so nothing keeps renewing
/// credentials after the session has ended.
#[derive(Debug)]
pub struct SchedulerHandle {
	cancel: CancellationToken,
	task: JoinHandle<()>,
}
impl SchedulerHandle {
	/// Stops the renewal timer; idempotent.
	pub fn cancel(&self) {
		self.cancel.cancel();
		self.task.abort();
	}
}
impl Drop for SchedulerHandle {
	fn drop(&mut self) {
		self.cancel();
	}
}

impl Session {
	/// Starts the proactive renewal timer, replacing (and stopping) any previous one.
	///
	/// Each tick checks the stored token against the proactive expiry buffer and calls
	/// [`Session::ensure_fresh`] only when renewal is actually due, so repeated ticks
	/// over a fresh token never touch the network.
	pub fn start_renewal_scheduler(&self) {
		let session = self.clone();
		let cancel = CancellationToken::new();
		let tick_cancel = cancel.clone();
		let interval = config::std_duration(self.config.renewal_interval);
		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = tick_cancel.cancelled() => break,
					_ = ticker.tick() => session.proactive_renewal_tick().await,
				}
			}
		});

		*self.scheduler.lock() = Some(SchedulerHandle { cancel, task });
	}

	/// Stops the proactive renewal timer; idempotent.
	pub fn stop_renewal_scheduler(&self) {
		if let Some(handle) = self.scheduler.lock().take() {
			handle.cancel();
		}
	}

	async fn proactive_renewal_tick(&self) {
		let credential = self.credentials.read().await;

		if !credential.is_authenticated() || self.coordinator.is_refreshing() {
			return;
		}
		if !credential
			.is_expired_at(OffsetDateTime::now_utc(), self.config.proactive_expiry_buffer)
		{
			return;
		}

		// Timer failures are logged only; a genuinely dead session is detected (and
		// cleared) by the next reactive 401, not by this timer.
		if let Err(error) =
			self.ensure_fresh_within(false, self.config.proactive_expiry_buffer).await
		{
			tracing::warn!(%error, "proactive renewal failed");
		}
	}
}
