//! Tracked channel subscriptions replayed after every reconnect.
//!
//! The server has no memory of pre-disconnect state, so the registry is the client's
//! authoritative record of what it wants pushed: plain set semantics, snapshotted by
//! the connection driver to re-issue `subscribe` control messages on every (re)open.

// self
use crate::_prelude::*;

/// Set of logical channel names the client wants pushed updates for.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionRegistry {
	channels: Arc<RwLock<BTreeSet<String>>>,
}
impl SubscriptionRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a channel; returns whether it was newly inserted.
	pub fn insert(&self, channel: &str) -> bool {
		self.channels.write().insert(channel.to_owned())
	}

	/// Removes a channel; returns whether it was present.
	pub fn remove(&self, channel: &str) -> bool {
		self.channels.write().remove(channel)
	}

	/// Returns whether the channel is currently tracked.
	pub fn contains(&self, channel: &str) -> bool {
		self.channels.read().contains(channel)
	}

	/// Returns the tracked channels as an ordered snapshot.
	pub fn snapshot(&self) -> Vec<String> {
		self.channels.read().iter().cloned().collect()
	}

	/// Drops every tracked channel.
	pub fn clear(&self) {
		self.channels.write().clear();
	}

	/// Returns the number of tracked channels.
	pub fn len(&self) -> usize {
		self.channels.read().len()
	}

	/// Returns whether no channels are tracked.
	pub fn is_empty(&self) -> bool {
		self.channels.read().is_empty()
	}
}
