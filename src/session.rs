//! Session cookie extraction: locate, reassemble, decrypt, and read the refresh token.
//!
//! The refresh token never leaves the server. It lives inside the encrypted session cookie
//! written at sign-in and is only read here, immediately before an exchange.

pub mod cookies;
pub mod jwe;

pub use cookies::*;
pub use jwe::*;

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::BrokerConfig,
	error::SessionError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Default session cookie base name.
pub const SESSION_COOKIE_NAME: &str = "next-auth.session-token";

/// Lifetime stamped on sessions minted by [`DecodedSession::with_refresh_token`].
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::days(30);

/// Claims carried inside the decrypted session cookie.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedSession {
	/// Long-lived refresh credential stored at sign-in.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Expiry as Unix seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exp: Option<i64>,
	/// Issue time as Unix seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iat: Option<i64>,
	/// Unique session identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jti: Option<String>,
	/// Remaining claims (name, email, picture, …) kept verbatim.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl DecodedSession {
	/// Creates a fresh session carrying only a refresh token.
	pub fn with_refresh_token(refresh_token: TokenSecret) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			refresh_token: Some(refresh_token),
			exp: Some((now + DEFAULT_SESSION_MAX_AGE).unix_timestamp()),
			iat: Some(now.unix_timestamp()),
			..Default::default()
		}
	}
}
impl Debug for DecodedSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DecodedSession")
			.field("refresh_token", &self.refresh_token)
			.field("exp", &self.exp)
			.field("iat", &self.iat)
			.field("jti", &self.jti)
			.field("extra_claims", &self.extra.len())
			.finish()
	}
}

/// Turns a raw session cookie value into claims.
pub trait SessionDecoder
where
	Self: Send + Sync,
{
	/// Decrypts and validates `raw` as of `now`.
	fn decode(&self, raw: &str, now: OffsetDateTime) -> Result<DecodedSession, SessionError>;
}

/// Reads the refresh credential out of inbound request cookies.
#[derive(Clone)]
pub struct SessionExtractor {
	cookie_name: String,
	decoder: Option<Arc<dyn SessionDecoder>>,
}
impl SessionExtractor {
	/// Creates an extractor with a custom decoder; `None` makes every read fail closed.
	pub fn new(cookie_name: impl Into<String>, decoder: Option<Arc<dyn SessionDecoder>>) -> Self {
		Self { cookie_name: cookie_name.into(), decoder }
	}

	/// Builds the NextAuth extractor described by `config`.
	pub fn from_config(config: &BrokerConfig) -> Self {
		let decoder = config.session_secret.as_ref().map(|secret| {
			Arc::new(NextAuthJweDecoder::new(secret.expose())) as Arc<dyn SessionDecoder>
		});

		Self::new(config.session_cookie_name.clone(), decoder)
	}

	/// Base cookie name this extractor looks for.
	pub fn cookie_name(&self) -> &str {
		&self.cookie_name
	}

	/// Returns the refresh token, or the reason none could be read.
	pub fn try_refresh_token(&self, cookies: &RequestCookies) -> Result<TokenSecret, SessionError> {
		let span = FlowSpan::new(FlowKind::Session, "try_refresh_token");
		let _guard = span.entered();
		let result = self.read(cookies, OffsetDateTime::now_utc());

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Session, FlowOutcome::Success),
			Err(e) => {
				tracing::debug!(
					error = %e,
					cookies = cookies.len(),
					"session refresh token unavailable"
				);
				obs::record_flow_outcome(FlowKind::Session, FlowOutcome::Failure);
			},
		}

		result
	}

	/// Returns the refresh token, or `None` when no valid session is present.
	pub fn refresh_token(&self, cookies: &RequestCookies) -> Option<TokenSecret> {
		self.try_refresh_token(cookies).ok()
	}

	fn read(
		&self,
		cookies: &RequestCookies,
		now: OffsetDateTime,
	) -> Result<TokenSecret, SessionError> {
		let decoder = self.decoder.as_ref().ok_or(SessionError::MissingSecret)?;
		let located =
			locate_session(cookies, &self.cookie_name).ok_or(SessionError::NoSessionCookie)?;

		tracing::trace!(
			source = ?located.source,
			len = located.value.len(),
			"session cookie located"
		);

		decoder
			.decode(&located.value, now)?
			.refresh_token
			.filter(|token| !token.is_empty())
			.ok_or(SessionError::MissingRefreshToken)
	}
}
impl Debug for SessionExtractor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionExtractor")
			.field("cookie_name", &self.cookie_name)
			.field("decoder_configured", &self.decoder.is_some())
			.finish()
	}
}
