//! Thread-safe in-memory [`SessionStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{SessionStore, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend keeping session state in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl SessionStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn put<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), value);

			Ok(())
		})
	}

	fn remove_all<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			// One write guard covers every key, so the removal is all-or-nothing with
			// respect to concurrent readers.
			let mut guard = map.write();

			for key in keys {
				guard.remove(*key);
			}

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn put_get_remove_round_trip() {
		let store = MemoryStore::default();

		store.put("a", "1".into()).await.expect("Put should succeed.");
		store.put("b", "2".into()).await.expect("Put should succeed.");

		assert_eq!(
			store.get("a").await.expect("Get should succeed.").as_deref(),
			Some("1")
		);

		store.remove_all(&["a", "b", "missing"]).await.expect("Removal should succeed.");

		assert_eq!(store.get("a").await.expect("Get should succeed."), None);
		assert_eq!(store.get("b").await.expect("Get should succeed."), None);
	}

	#[tokio::test]
	async fn clones_share_state() {
		let store = MemoryStore::default();
		let alias = store.clone();

		store.put("k", "v".into()).await.expect("Put should succeed.");

		assert_eq!(
			alias.get("k").await.expect("Get through clone should succeed.").as_deref(),
			Some("v")
		);
	}
}
