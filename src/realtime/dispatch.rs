//! Message fan-out and bounded history for the push channel.

// std
use std::sync::{
	Weak,
	atomic::{AtomicU64, Ordering},
};
// self
use crate::_prelude::*;

/// One structured push-channel message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushMessage {
	/// Message type used for handler routing.
	#[serde(rename = "type")]
	pub kind: String,
	/// Message body, opaque to the transport layer.
	#[serde(default)]
	pub payload: serde_json::Value,
	/// Server-assigned timestamp, when present.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<String>,
}
impl PushMessage {
	/// Creates a message with the provided type and payload.
	pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
		Self { kind: kind.into(), payload, timestamp: None }
	}
}

/// Boxed error returned by message handlers.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

type Handler = Arc<dyn Fn(&PushMessage) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Default)]
struct DispatcherInner {
	handlers: RwLock<HashMap<String, Vec<(u64, Handler)>>>,
	next_id: AtomicU64,
}

/// Routes incoming messages to every handler registered for their type.
#[derive(Clone, Default)]
pub struct MessageDispatcher {
	inner: Arc<DispatcherInner>,
}
impl MessageDispatcher {
	/// Creates an empty dispatcher.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a handler for a message type.
	///
	/// The returned guard removes exactly this handler when dropped (or via
	/// [`HandlerGuard::dispose`]); other handlers for the same type are unaffected.
	pub fn on<F>(&self, kind: impl Into<String>, handler: F) -> HandlerGuard
	where
		F: Fn(&PushMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
	{
		let kind = kind.into();
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

		self.inner
			.handlers
			.write()
			.entry(kind.clone())
			.or_default()
			.push((id, Arc::new(handler)));

		HandlerGuard { inner: Arc::downgrade(&self.inner), kind, id }
	}

	/// Invokes every handler registered for the message type, in registration order.
	///
	/// A failing handler is logged and skipped; it can never prevent delivery to the
	/// handlers behind it. This is the one place the crate deliberately suppresses an
	/// error instead of surfacing it.
	pub fn dispatch(&self, message: &PushMessage) {
		let handlers: Vec<Handler> = self
			.inner
			.handlers
			.read()
			.get(&message.kind)
			.map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
			.unwrap_or_default();

		for handler in handlers {
			if let Err(error) = handler(message) {
				tracing::warn!(kind = %message.kind, %error, "push handler failed");
			}
		}
	}

	/// Returns the number of handlers registered for a message type.
	pub fn handler_count(&self, kind: &str) -> usize {
		self.inner.handlers.read().get(kind).map_or(0, Vec::len)
	}
}
impl Debug for MessageDispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MessageDispatcher")
			.field("types", &self.inner.handlers.read().len())
			.finish()
	}
}

/// Disposer removing its handler on drop.
#[must_use = "dropping the guard immediately unregisters the handler"]
pub struct HandlerGuard {
	inner: Weak<DispatcherInner>,
	kind: String,
	id: u64,
}
impl HandlerGuard {
	/// Removes the handler now instead of at drop time.
	pub fn dispose(self) {}

	fn remove(&self) {
		if let Some(inner) = self.inner.upgrade()
			&& let Some(list) = inner.handlers.write().get_mut(&self.kind)
		{
			list.retain(|(id, _)| *id != self.id);
		}
	}
}
impl Drop for HandlerGuard {
	fn drop(&mut self) {
		self.remove();
	}
}
impl Debug for HandlerGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HandlerGuard").field("kind", &self.kind).field("id", &self.id).finish()
	}
}

struct HistoryInner {
	capacity: usize,
	next_id: AtomicU64,
	entries: Mutex<VecDeque<StoredMessage>>,
}

/// Append-only bounded record of received messages, kept for UI inspection only.
#[derive(Clone)]
pub struct MessageHistory {
	inner: Arc<HistoryInner>,
}

/// A history entry stamped at receipt time.
#[derive(Clone, Debug)]
pub struct StoredMessage {
	/// Monotonically increasing client-assigned id.
	pub id: u64,
	/// Client receive instant.
	pub received_at: OffsetDateTime,
	/// The received message.
	pub message: PushMessage,
}

impl MessageHistory {
	/// Creates a history retaining at most `capacity` messages.
	pub fn new(capacity: usize) -> Self {
		Self {
			inner: Arc::new(HistoryInner {
				capacity: capacity.max(1),
				next_id: AtomicU64::new(0),
				entries: Mutex::new(VecDeque::new()),
			}),
		}
	}

	pub(crate) fn record(&self, message: &PushMessage) {
		let entry = StoredMessage {
			id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
			received_at: OffsetDateTime::now_utc(),
			message: message.clone(),
		};
		let mut entries = self.inner.entries.lock();

		if entries.len() == self.inner.capacity {
			entries.pop_front();
		}

		entries.push_back(entry);
	}

	/// Returns the retained messages, oldest first.
	pub fn recent(&self) -> Vec<StoredMessage> {
		self.inner.entries.lock().iter().cloned().collect()
	}

	/// Returns the number of retained messages.
	pub fn len(&self) -> usize {
		self.inner.entries.lock().len()
	}

	/// Returns whether no messages are retained.
	pub fn is_empty(&self) -> bool {
		self.inner.entries.lock().is_empty()
	}
}
impl Debug for MessageHistory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MessageHistory")
			.field("capacity", &self.inner.capacity)
			.field("len", &self.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn message(kind: &str) -> PushMessage {
		PushMessage::new(kind, serde_json::json!({ "n": 1 }))
	}

	#[test]
	fn handlers_fire_in_registration_order() {
		let dispatcher = MessageDispatcher::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let first = {
			let seen = seen.clone();

			dispatcher.on("ticker", move |_| {
				seen.lock().push("first");

				Ok(())
			})
		};
		let second = {
			let seen = seen.clone();

			dispatcher.on("ticker", move |_| {
				seen.lock().push("second");

				Ok(())
			})
		};

		dispatcher.dispatch(&message("ticker"));

		assert_eq!(*seen.lock(), vec!["first", "second"]);

		drop(first);
		drop(second);
	}

	#[test]
	fn failing_handler_does_not_block_delivery() {
		let dispatcher = MessageDispatcher::new();
		let seen = Arc::new(Mutex::new(0_u32));
		let _failing = dispatcher.on("ticker", |_| Err("boom".into()));
		let _counting = {
			let seen = seen.clone();

			dispatcher.on("ticker", move |_| {
				*seen.lock() += 1;

				Ok(())
			})
		};

		dispatcher.dispatch(&message("ticker"));

		assert_eq!(*seen.lock(), 1);
	}

	#[test]
	fn guard_removes_exactly_its_handler() {
		let dispatcher = MessageDispatcher::new();
		let first = dispatcher.on("ticker", |_| Ok(()));
		let _second = dispatcher.on("ticker", |_| Ok(()));

		assert_eq!(dispatcher.handler_count("ticker"), 2);

		first.dispose();

		assert_eq!(dispatcher.handler_count("ticker"), 1);
	}

	#[test]
	fn unknown_type_dispatch_is_a_no_op() {
		let dispatcher = MessageDispatcher::new();

		dispatcher.dispatch(&message("nobody-listens"));

		assert_eq!(dispatcher.handler_count("nobody-listens"), 0);
	}

	#[test]
	fn history_evicts_oldest_at_capacity() {
		let history = MessageHistory::new(2);

		history.record(&message("a"));
		history.record(&message("b"));
		history.record(&message("c"));

		let recent = history.recent();

		assert_eq!(recent.len(), 2);
		assert_eq!(recent[0].message.kind, "b");
		assert_eq!(recent[1].message.kind, "c");
		assert!(recent[0].id < recent[1].id);
	}
}
