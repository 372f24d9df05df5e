//! Token cache contracts and the built-in in-process implementation.

pub mod memory;

pub use memory::MemoryTokenCache;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{DisplayTokens, TokenSecret, TokenSet},
};

/// Safety margin subtracted from `expires_in` so tokens are refreshed before they lapse.
pub const EARLY_REFRESH_BUFFER: Duration = Duration::seconds(60);

/// Cache contract for exchanged token sets, keyed by refresh credential.
///
/// Implementations are injected per broker, so tests can hand each case a fresh cache.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Returns the entry for `key` when it is still fresh at `now`; never removes entries.
	fn get(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CacheEntry>;

	/// Stores `tokens` issued at `now`, replacing any previous entry, and returns the entry.
	fn set(&self, key: &CacheKey, tokens: &TokenSet, now: OffsetDateTime) -> CacheEntry;

	/// Removes every entry whose expiry is at or before `now`; returns the number removed.
	fn sweep(&self, now: OffsetDateTime) -> usize;

	/// Number of stored entries, fresh or not.
	fn len(&self) -> usize;

	/// Returns `true` when nothing is stored.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Cache key derived from a refresh token.
///
/// Holds the base64 SHA-256 fingerprint of the token rather than the token itself.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);
impl CacheKey {
	/// Fingerprints `refresh_token`.
	pub fn from_refresh_token(refresh_token: &TokenSecret) -> Self {
		let digest = Sha256::digest(refresh_token.expose().as_bytes());

		Self(STANDARD_NO_PAD.encode(digest))
	}

	/// Returns the fingerprint.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("CacheKey").field(&self.0.get(..8).unwrap_or(self.0.as_str())).finish()
	}
}

/// Token set stored with its computed expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheEntry {
	/// Cached access token.
	pub access_token: TokenSecret,
	/// Cached ID token.
	pub id_token: TokenSecret,
	/// Instant after which the entry is stale.
	pub expires_at: OffsetDateTime,
}
impl CacheEntry {
	/// Builds an entry for `tokens` issued at `issued_at`, applying [`EARLY_REFRESH_BUFFER`].
	///
	/// A lifetime that leaves the representable date range yields an entry that is already
	/// stale.
	pub fn new(tokens: &TokenSet, issued_at: OffsetDateTime) -> Self {
		let expires_at = tokens
			.expires_in
			.checked_sub(EARLY_REFRESH_BUFFER)
			.and_then(|lifetime| issued_at.checked_add(lifetime))
			.unwrap_or(issued_at);

		Self {
			access_token: tokens.access_token.clone(),
			id_token: tokens.id_token.clone(),
			expires_at,
		}
	}

	/// Returns `true` while `now` is strictly before the expiry.
	pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
		now < self.expires_at
	}

	/// Both tokens in display form.
	pub fn display_tokens(&self) -> DisplayTokens {
		DisplayTokens { access_token: self.access_token.clone(), id_token: self.id_token.clone() }
	}
}
impl Debug for CacheEntry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheEntry")
			.field("access_token", &self.access_token)
			.field("id_token", &self.id_token)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
