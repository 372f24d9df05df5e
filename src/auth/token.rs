//! Token sets returned by the refresh grant and the shapes handed to callers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access/ID token pair minted by the `refresh_token` grant.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
	/// Short-lived access token for API calls.
	pub access_token: TokenSecret,
	/// Identity token carrying tenant/role claims required downstream.
	pub id_token: TokenSecret,
	/// Lifetime reported by the token endpoint.
	pub expires_in: Duration,
}
impl TokenSet {
	/// Lifetime assumed when the token endpoint omits `expires_in`.
	pub const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(3600);
	/// Longest lifetime honored from a token endpoint; larger `expires_in` values are clamped.
	pub const MAX_EXPIRES_IN: Duration = Duration::days(365);

	/// Creates a token set from its parts.
	pub fn new(
		access_token: impl Into<String>,
		id_token: impl Into<String>,
		expires_in: Duration,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			id_token: TokenSecret::new(id_token),
			expires_in,
		}
	}
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("access_token", &"<redacted>")
			.field("id_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// Both tokens, returned for diagnostic and display surfaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayTokens {
	/// Current access token.
	pub access_token: TokenSecret,
	/// Current ID token.
	pub id_token: TokenSecret,
}
impl DisplayTokens {
	/// Decodes the ID token payload without verifying its signature.
	///
	/// Only meant for showing claims (tenant, role, expiry) on diagnostic pages; never use
	/// the result for authorization decisions.
	pub fn unverified_id_claims(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
		// crates.io
		use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

		let payload = self.id_token.expose().split('.').nth(1)?;
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

		serde_json::from_slice(&bytes).ok()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;

	#[test]
	fn token_set_debug_redacts() {
		let set = TokenSet::new("at1", "idt1", TokenSet::DEFAULT_EXPIRES_IN);
		let rendered = format!("{set:?}");

		assert!(!rendered.contains("at1"));
		assert!(!rendered.contains("idt1"));
	}

	#[test]
	fn unverified_claims_read_jwt_payload() {
		let payload = URL_SAFE_NO_PAD.encode(br#"{"custom:tenant_id":"school-7","custom:role":"admin"}"#);
		let tokens = DisplayTokens {
			access_token: TokenSecret::new("at"),
			id_token: TokenSecret::new(format!("eyJhbGciOiJub25lIn0.{payload}.sig")),
		};
		let claims = tokens.unverified_id_claims().expect("Claims should decode.");

		assert_eq!(claims.get("custom:tenant_id").and_then(|v| v.as_str()), Some("school-7"));
		assert_eq!(claims.get("custom:role").and_then(|v| v.as_str()), Some("admin"));
	}

	#[test]
	fn unverified_claims_reject_opaque_tokens() {
		let tokens = DisplayTokens {
			access_token: TokenSecret::new("at"),
			id_token: TokenSecret::new("opaque"),
		};

		assert!(tokens.unverified_id_claims().is_none());
	}
}
