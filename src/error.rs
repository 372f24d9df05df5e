//! Broker-level error types shared across discovery, session decoding, exchanges, and caches.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
///
/// The public accessors collapse every variant into `None`; the `try_*` variants surface
/// this type so callers can tell a missing session apart from an unreachable provider.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// OIDC discovery document could not be resolved.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// No usable session credential was presented.
	#[error(transparent)]
	Session(#[from] SessionError),
	/// Token endpoint answered 2xx with an unusable payload.
	#[error(transparent)]
	Exchange(#[from] ExchangeError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Provider rejected the refresh token.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or the client identifier is unknown.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the caller should treat the user as signed out and send them to
	/// the login page.
	pub fn is_unauthenticated(&self) -> bool {
		matches!(self, Self::Session(_) | Self::InvalidGrant { .. })
	}

	/// Returns `true` for failures that may succeed if retried later.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A required setting was not supplied.
	#[error("Missing required setting `{name}`.")]
	MissingSetting {
		/// Setting or environment variable name.
		name: &'static str,
	},
	/// A setting could not be parsed.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting or environment variable name.
		name: &'static str,
		/// Human-readable parse failure.
		reason: String,
	},
	/// Discovery URL must use HTTP(S).
	#[error("The discovery URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// URL that failed validation.
		url: String,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// The refresh grant only returns an ID token when `openid` is requested.
	#[error("Requested scopes must include `openid` so the provider returns an ID token.")]
	MissingOpenIdScope,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while resolving the OIDC discovery document.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// Discovery endpoint answered with a non-success status.
	#[error("Discovery endpoint returned HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// Discovery body is not the expected JSON document.
	#[error("Discovery endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Discovery document does not advertise a token endpoint.
	#[error("Discovery document is missing token_endpoint.")]
	MissingTokenEndpoint,
	/// Advertised token endpoint is not a valid URL.
	#[error("Discovery document advertises an invalid token_endpoint.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Failures raised while extracting the refresh credential from session cookies.
#[derive(Debug, ThisError)]
pub enum SessionError {
	/// No decryption secret is configured; every decode fails closed.
	#[error("Session secret is not configured.")]
	MissingSecret,
	/// Neither chunked nor single session cookies were presented.
	#[error("No session cookie is present.")]
	NoSessionCookie,
	/// Cookie value is not a well-formed encrypted session.
	#[error("Session cookie is malformed: {reason}.")]
	Malformed {
		/// Which structural check failed.
		reason: &'static str,
	},
	/// Authenticated decryption failed (wrong secret or tampered cookie).
	#[error("Session cookie could not be decrypted.")]
	Decrypt,
	/// Decrypted payload is not the expected JSON document.
	#[error("Session payload is not valid JSON.")]
	Payload {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Session passed its `exp` claim.
	#[error("Session expired.")]
	Expired,
	/// Session payload does not carry a refresh token.
	#[error("Session does not carry a refresh token.")]
	MissingRefreshToken,
	/// Session could not be sealed into a cookie value.
	#[error("Session could not be encrypted.")]
	Encode,
}

/// Token endpoint returned 2xx but the payload cannot be used.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
	/// Response omitted `access_token`.
	#[error("Token endpoint response is missing access_token.")]
	MissingAccessToken,
	/// Response omitted `id_token`; usually the `openid` scope was not echoed.
	#[error("Token endpoint response is missing id_token.")]
	MissingIdToken,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Identity provider returned an unexpected response: {message}.")]
	Upstream {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn session_and_grant_failures_mean_unauthenticated() {
		assert!(Error::from(SessionError::NoSessionCookie).is_unauthenticated());
		assert!(Error::InvalidGrant { reason: "refresh token revoked".into() }.is_unauthenticated());
		assert!(!Error::from(DiscoveryError::MissingTokenEndpoint).is_unauthenticated());
	}

	#[test]
	fn transient_failures_are_retryable() {
		let err = Error::from(TransientError::Upstream {
			message: "timed out".into(),
			status: None,
			retry_after: None,
		});

		assert!(err.is_retryable());
		assert!(!Error::from(ExchangeError::MissingIdToken).is_retryable());
	}

	#[test]
	fn nested_errors_render_transparently() {
		let err = Error::from(ExchangeError::MissingIdToken);

		assert_eq!(err.to_string(), "Token endpoint response is missing id_token.");
	}
}
