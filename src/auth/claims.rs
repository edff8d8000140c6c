//! Pure decoding of bearer-token claims.
//!
//! Access tokens are JWTs whose payload carries the expiry instant the client needs to
//! schedule renewals. Decoding never verifies the signature (the server does that) and
//! never panics on malformed input: every failure mode is a typed [`ClaimsError`]
//! variant for callers to branch on, so an unparsable token reads as "expired now"
//! instead of raising mid-flow.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Claims extracted from a bearer-token payload.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
	/// Expiry instant as seconds since the Unix epoch.
	pub exp: i64,
	/// Subject identifier, when the server includes one.
	#[serde(default)]
	pub sub: Option<String>,
}
impl TokenClaims {
	/// Returns the expiry claim as an [`OffsetDateTime`].
	///
	/// An out-of-range `exp` collapses to the Unix epoch, which downstream expiry
	/// checks treat as long expired.
	pub fn expires_at(&self) -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
	}
}

/// Failures produced while decoding a bearer-token payload.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClaimsError {
	/// Token does not have the three dot-separated JWT segments.
	#[error("Token is not a three-segment JWT.")]
	MalformedToken,
	/// Payload segment is not valid base64url.
	#[error("Token payload is not valid base64url.")]
	PayloadEncoding,
	/// Payload decoded but is not the expected JSON claim object.
	#[error("Token payload is not a valid claim object.")]
	PayloadJson,
}

/// Decodes the claim set from a JWT access token without verifying its signature.
pub fn decode(token: &str) -> Result<TokenClaims, ClaimsError> {
	let mut segments = token.split('.');
	let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
		(Some(_), Some(payload), Some(_), None) => payload,
		_ => return Err(ClaimsError::MalformedToken),
	};
	let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| ClaimsError::PayloadEncoding)?;

	serde_json::from_slice(&bytes).map_err(|_| ClaimsError::PayloadJson)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn token_with_payload(payload: &str) -> String {
		format!("header.{}.signature", URL_SAFE_NO_PAD.encode(payload))
	}

	#[test]
	fn decodes_expiry_and_subject() {
		let token = token_with_payload(r#"{"exp":1900000000,"sub":"trader-7"}"#);
		let claims = decode(&token).expect("Well-formed token payload should decode.");

		assert_eq!(claims.exp, 1_900_000_000);
		assert_eq!(claims.sub.as_deref(), Some("trader-7"));
		assert_eq!(claims.expires_at().unix_timestamp(), 1_900_000_000);
	}

	#[test]
	fn rejects_wrong_segment_count() {
		assert_eq!(decode("not-a-jwt"), Err(ClaimsError::MalformedToken));
		assert_eq!(decode("one.two"), Err(ClaimsError::MalformedToken));
		assert_eq!(decode("a.b.c.d"), Err(ClaimsError::MalformedToken));
	}

	#[test]
	fn rejects_invalid_base64_payload() {
		assert_eq!(decode("header.!!!.signature"), Err(ClaimsError::PayloadEncoding));
	}

	#[test]
	fn rejects_non_claim_payload() {
		let token = token_with_payload("just text");

		assert_eq!(decode(&token), Err(ClaimsError::PayloadJson));

		let token = token_with_payload(r#"{"sub":"no-expiry"}"#);

		assert_eq!(decode(&token), Err(ClaimsError::PayloadJson));
	}
}
