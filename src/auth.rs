//! Credential primitives: bearer-token claim decoding and secret handling.

pub mod claims;

mod secret;

pub use claims::{ClaimsError, TokenClaims};
pub use secret::TokenSecret;
