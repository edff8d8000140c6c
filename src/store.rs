//! Persistence contracts and built-in key-value backends for session state.
//!
//! The client keeps exactly three pieces of durable state (access token, refresh token,
//! and a cached profile snapshot) under independent keys. The contract includes an
//! atomic [`SessionStore::remove_all`] so logout and unrecoverable renewal failures can
//! never leave a partially cleared session behind.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Well-known key holding the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "session.access_token";
/// Well-known key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "session.refresh_token";
/// Well-known key holding the cached user profile snapshot.
pub const USER_PROFILE_KEY: &str = "session.user_profile";

/// Boxed future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key-value persistence contract for client session state.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Persists or replaces the value stored under `key`.
	fn put<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes every listed key in one operation.
	///
	/// Keys absent from the store are ignored; implementations must either remove all
	/// listed keys or none of them.
	fn remove_all<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
