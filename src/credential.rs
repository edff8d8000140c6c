//! Single source of truth for the token pair and cached profile snapshot.
//!
//! Every component reads tokens through [`CredentialStore`] at the moment of use
//! instead of caching copies, so a concurrent renewal can never leave a stale bearer
//! token in circulation.

// self
use crate::{
	_prelude::*,
	auth::{self, TokenSecret},
	store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SessionStore, StoreError, USER_PROFILE_KEY},
};

/// Snapshot of the persisted credential state at one instant.
///
/// `expires_at` is derived from the access token's expiry claim while reading; it is
/// never stored separately. An access token whose claims cannot be decoded yields
/// `expires_at: None` and reads as immediately expired.
#[derive(Clone, Debug, Default)]
pub struct Credential {
	/// Current bearer access token, if any.
	pub access_token: Option<TokenSecret>,
	/// Current refresh token, if any.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry instant derived from the access token claims.
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Returns whether an access token is present at all.
	pub fn is_authenticated(&self) -> bool {
		self.access_token.is_some()
	}

	/// Returns whether the access token is absent, undecodable, or inside `buffer` of
	/// its expiry at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		match (&self.access_token, self.expires_at) {
			(None, _) => true,
			(Some(_), None) => true,
			(Some(_), Some(expires_at)) => expires_at - now < buffer,
		}
	}
}

/// Store-backed credential accessor shared by every session component.
#[derive(Clone)]
pub struct CredentialStore {
	store: Arc<dyn SessionStore>,
}
impl CredentialStore {
	/// Wraps the provided storage backend.
	pub fn new(store: Arc<dyn SessionStore>) -> Self {
		Self { store }
	}

	/// Persists a new access token, optionally rotating the refresh token with it.
	///
	/// Renewal responses carry only a new access token; passing `None` leaves the
	/// existing refresh token untouched.
	pub async fn save(&self, access: &str, refresh: Option<&str>) -> Result<(), StoreError> {
		self.store.put(ACCESS_TOKEN_KEY, access.to_owned()).await?;

		if let Some(refresh) = refresh {
			self.store.put(REFRESH_TOKEN_KEY, refresh.to_owned()).await?;
		}

		Ok(())
	}

	/// Caches the user profile snapshot returned by the login endpoint.
	pub async fn save_profile(&self, profile: &serde_json::Value) -> Result<(), StoreError> {
		let serialized = serde_json::to_string(profile).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize profile snapshot: {e}"),
		})?;

		self.store.put(USER_PROFILE_KEY, serialized).await
	}

	/// Returns the cached profile snapshot, if one is stored and parsable.
	pub async fn profile(&self) -> Option<serde_json::Value> {
		match self.store.get(USER_PROFILE_KEY).await {
			Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
			Ok(None) => None,
			Err(error) => {
				tracing::warn!(%error, "failed to read cached profile snapshot");

				None
			},
		}
	}

	/// Returns the current credential snapshot; never fails.
	///
	/// Storage errors are logged and read as absent tokens, which downstream checks
	/// treat as an expired session.
	pub async fn read(&self) -> Credential {
		let access = self.read_key(ACCESS_TOKEN_KEY).await;
		let refresh = self.read_key(REFRESH_TOKEN_KEY).await;
		let expires_at = access
			.as_deref()
			.and_then(|token| auth::claims::decode(token).ok())
			.map(|claims| claims.expires_at());

		Credential {
			access_token: access.map(TokenSecret::new),
			refresh_token: refresh.map(TokenSecret::new),
			expires_at,
		}
	}

	/// Erases the token pair and the profile snapshot in one operation; idempotent.
	pub async fn clear(&self) -> Result<(), StoreError> {
		self.store.remove_all(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_PROFILE_KEY]).await
	}

	/// Returns whether the stored access token is absent, undecodable, or within
	/// `buffer` of expiry.
	pub async fn is_expired(&self, buffer: Duration) -> bool {
		self.read().await.is_expired_at(OffsetDateTime::now_utc(), buffer)
	}

	async fn read_key(&self, key: &str) -> Option<String> {
		match self.store.get(key).await {
			Ok(value) => value,
			Err(error) => {
				tracing::warn!(key, %error, "credential read failed; treating as absent");

				None
			},
		}
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CredentialStore(..)")
	}
}
