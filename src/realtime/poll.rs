//! Timer-driven REST polling feeding the same dispatch pipeline as the push channel.
//!
//! Deployments that cannot hold a socket open (restrictive proxies, battery-constrained
//! clients) can route updates through periodic GETs instead; handlers registered on the
//! channel observe the messages identically either way.

// crates.io
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	config,
	http::ApiRequest,
	obs::{self, FlowOutcome, SessionFlow},
	realtime::PushMessage,
	session::Session,
};

/// Handle owning a polling task; cancelling (or dropping) it stops the timer.
#[derive(Debug)]
pub struct PollFeed {
	cancel: CancellationToken,
	task: JoinHandle<()>,
}
impl PollFeed {
	/// Stops the polling timer; idempotent.
	pub fn cancel(&self) {
		self.cancel.cancel();
		self.task.abort();
	}
}
impl Drop for PollFeed {
	fn drop(&mut self) {
		self.cancel();
	}
}

impl Session {
	/// Starts polling `path` every `interval`, delivering each returned message through
	/// the realtime dispatcher and history.
	///
	/// The endpoint is expected to return a JSON array of push-shaped messages. Poll
	/// failures are logged and the timer keeps running; transient outages resolve on a
	/// later tick.
	pub fn start_poll_feed(&self, path: impl Into<String>, interval: Duration) -> PollFeed {
		let session = self.clone();
		let path = path.into();
		let cancel = CancellationToken::new();
		let tick_cancel = cancel.clone();
		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(config::std_duration(interval));

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = tick_cancel.cancelled() => break,
					_ = ticker.tick() => session.poll_tick(&path).await,
				}
			}
		});

		PollFeed { cancel, task }
	}

	async fn poll_tick(&self, path: &str) {
		obs::record_flow_outcome(SessionFlow::Poll, FlowOutcome::Attempt);

		match self.execute::<Vec<PushMessage>>(ApiRequest::get(path)).await {
			Ok(messages) => {
				obs::record_flow_outcome(SessionFlow::Poll, FlowOutcome::Success);

				for message in &messages {
					self.realtime.deliver(message);
				}
			},
			Err(error) => {
				obs::record_flow_outcome(SessionFlow::Poll, FlowOutcome::Failure);
				tracing::debug!(%error, path, "poll tick failed");
			},
		}
	}
}
