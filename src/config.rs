//! Broker configuration: discovery URL, client identity, session secret, and tuning knobs.
//!
//! Values are usually loaded from the environment with [`BrokerConfig::from_env`]; tests
//! and embedders can assemble them with [`BrokerConfig::builder`]. Both paths run the same
//! validation so a broker never starts with a scope set that would drop the ID token.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
	session::SESSION_COOKIE_NAME,
};

/// Environment variable naming the OIDC discovery document URL.
pub const ENV_DISCOVERY_URL: &str = "OIDC_DISCOVERY_URL";
/// Environment variable naming the OAuth client identifier.
pub const ENV_CLIENT_ID: &str = "OIDC_CLIENT_ID";
/// Environment variable holding the session decryption secret.
pub const ENV_SESSION_SECRET: &str = "NEXTAUTH_SECRET";
/// Environment variable overriding the requested scopes.
pub const ENV_SCOPES: &str = "OIDC_SCOPES";
/// Environment variable overriding the outbound HTTP timeout, in seconds.
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TOKEN_BROKER_HTTP_TIMEOUT_SECS";
/// Environment variable overriding the session cookie base name.
pub const ENV_SESSION_COOKIE: &str = "NEXTAUTH_SESSION_COOKIE";

/// Validated broker configuration.
#[derive(Clone)]
pub struct BrokerConfig {
	/// OIDC discovery document URL (`.../.well-known/openid-configuration`).
	pub discovery_url: Url,
	/// OAuth client identifier sent with every refresh grant.
	pub client_id: String,
	/// Session decryption secret; `None` makes every session decode fail closed.
	pub session_secret: Option<TokenSecret>,
	/// Scopes echoed on the refresh grant; always contains `openid`.
	pub scopes: ScopeSet,
	/// Timeout applied to every outbound HTTP request.
	pub http_timeout: Duration,
	/// Base name of the session cookie (without the `__Secure-` prefix or chunk suffix).
	pub session_cookie_name: String,
}
impl BrokerConfig {
	/// Default outbound HTTP timeout.
	pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::seconds(10);

	/// Creates an empty builder.
	pub fn builder() -> BrokerConfigBuilder {
		BrokerConfigBuilder::default()
	}

	/// Loads configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_env_with(|key| std::env::var(key).ok())
	}

	/// Loads configuration through a custom lookup, treating empty values as unset.
	pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let read = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
		let discovery_url = read(ENV_DISCOVERY_URL)
			.ok_or(ConfigError::MissingSetting { name: ENV_DISCOVERY_URL })?;
		let discovery_url = Url::parse(&discovery_url).map_err(|e| ConfigError::InvalidSetting {
			name: ENV_DISCOVERY_URL,
			reason: e.to_string(),
		})?;
		let client_id =
			read(ENV_CLIENT_ID).ok_or(ConfigError::MissingSetting { name: ENV_CLIENT_ID })?;
		let mut builder = Self::builder().discovery_url(discovery_url).client_id(client_id);

		if let Some(secret) = read(ENV_SESSION_SECRET) {
			builder = builder.session_secret(secret);
		} else {
			tracing::warn!(
				env = ENV_SESSION_SECRET,
				"session secret is not set; every session decode will fail closed"
			);
		}
		if let Some(scopes) = read(ENV_SCOPES) {
			builder = builder.scopes(ScopeSet::from_str(&scopes)?);
		}
		if let Some(raw) = read(ENV_HTTP_TIMEOUT_SECS) {
			let secs = raw.parse::<u32>().map_err(|e| ConfigError::InvalidSetting {
				name: ENV_HTTP_TIMEOUT_SECS,
				reason: e.to_string(),
			})?;

			builder = builder.http_timeout(Duration::seconds(secs.into()));
		}
		if let Some(name) = read(ENV_SESSION_COOKIE) {
			builder = builder.session_cookie_name(name);
		}

		builder.build()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if !matches!(self.discovery_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: self.discovery_url.to_string() });
		}
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::MissingSetting { name: ENV_CLIENT_ID });
		}
		if !self.scopes.contains(ScopeSet::OPENID) {
			return Err(ConfigError::MissingOpenIdScope);
		}
		if !self.http_timeout.is_positive() {
			return Err(ConfigError::InvalidSetting {
				name: ENV_HTTP_TIMEOUT_SECS,
				reason: "timeout must be positive".into(),
			});
		}
		if self.session_cookie_name.is_empty()
			|| self.session_cookie_name.contains(|c: char| c.is_whitespace() || c == ';' || c == '=')
		{
			return Err(ConfigError::InvalidSetting {
				name: ENV_SESSION_COOKIE,
				reason: "cookie name must be a non-empty token".into(),
			});
		}

		Ok(())
	}
}
impl Debug for BrokerConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrokerConfig")
			.field("discovery_url", &self.discovery_url.as_str())
			.field("client_id", &self.client_id)
			.field("session_secret_set", &self.session_secret.is_some())
			.field("scopes", &self.scopes)
			.field("http_timeout", &self.http_timeout)
			.field("session_cookie_name", &self.session_cookie_name)
			.finish()
	}
}

/// Builder for [`BrokerConfig`] values.
#[derive(Debug, Default)]
pub struct BrokerConfigBuilder {
	discovery_url: Option<Url>,
	client_id: Option<String>,
	session_secret: Option<TokenSecret>,
	scopes: Option<ScopeSet>,
	http_timeout: Option<Duration>,
	session_cookie_name: Option<String>,
}
impl BrokerConfigBuilder {
	/// Sets the discovery document URL.
	pub fn discovery_url(mut self, url: Url) -> Self {
		self.discovery_url = Some(url);

		self
	}

	/// Sets the OAuth client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the session decryption secret.
	pub fn session_secret(mut self, secret: impl Into<String>) -> Self {
		self.session_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Overrides the scopes requested on refresh (must include `openid`).
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Overrides the outbound HTTP timeout.
	pub fn http_timeout(mut self, timeout: Duration) -> Self {
		self.http_timeout = Some(timeout);

		self
	}

	/// Overrides the session cookie base name.
	pub fn session_cookie_name(mut self, name: impl Into<String>) -> Self {
		self.session_cookie_name = Some(name.into());

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<BrokerConfig, ConfigError> {
		let discovery_url =
			self.discovery_url.ok_or(ConfigError::MissingSetting { name: ENV_DISCOVERY_URL })?;
		let client_id = self.client_id.ok_or(ConfigError::MissingSetting { name: ENV_CLIENT_ID })?;
		let config = BrokerConfig {
			discovery_url,
			client_id,
			session_secret: self.session_secret.filter(|secret| !secret.is_empty()),
			scopes: self.scopes.unwrap_or_else(ScopeSet::oidc_default),
			http_timeout: self.http_timeout.unwrap_or(BrokerConfig::DEFAULT_HTTP_TIMEOUT),
			session_cookie_name: self
				.session_cookie_name
				.unwrap_or_else(|| SESSION_COOKIE_NAME.to_owned()),
		};

		config.validate()?;

		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v).to_owned())
	}

	#[test]
	fn from_env_applies_defaults() {
		let config = BrokerConfig::from_env_with(env(&[
			(ENV_DISCOVERY_URL, "https://cognito.example/.well-known/openid-configuration"),
			(ENV_CLIENT_ID, "emis-web"),
			(ENV_SESSION_SECRET, "s3cret"),
		]))
		.expect("Configuration should load.");

		assert_eq!(config.client_id, "emis-web");
		assert_eq!(config.scopes.normalized(), "openid profile email");
		assert_eq!(config.http_timeout, BrokerConfig::DEFAULT_HTTP_TIMEOUT);
		assert_eq!(config.session_cookie_name, "next-auth.session-token");
		assert!(config.session_secret.is_some());
	}

	#[test]
	fn missing_secret_is_allowed_but_unset() {
		let config = BrokerConfig::from_env_with(env(&[
			(ENV_DISCOVERY_URL, "https://cognito.example/.well-known/openid-configuration"),
			(ENV_CLIENT_ID, "emis-web"),
			(ENV_SESSION_SECRET, "   "),
		]))
		.expect("Configuration should load without a secret.");

		assert!(config.session_secret.is_none());
	}

	#[test]
	fn missing_required_settings_are_reported() {
		let err = BrokerConfig::from_env_with(env(&[(ENV_CLIENT_ID, "emis-web")]))
			.expect_err("Discovery URL is required.");

		assert!(matches!(err, ConfigError::MissingSetting { name: ENV_DISCOVERY_URL }));
	}

	#[test]
	fn scopes_without_openid_are_rejected() {
		let err = BrokerConfig::from_env_with(env(&[
			(ENV_DISCOVERY_URL, "https://cognito.example/.well-known/openid-configuration"),
			(ENV_CLIENT_ID, "emis-web"),
			(ENV_SCOPES, "profile email"),
		]))
		.expect_err("Scopes without openid must be rejected.");

		assert!(matches!(err, ConfigError::MissingOpenIdScope));
	}

	#[test]
	fn timeout_must_parse() {
		let err = BrokerConfig::from_env_with(env(&[
			(ENV_DISCOVERY_URL, "https://cognito.example/.well-known/openid-configuration"),
			(ENV_CLIENT_ID, "emis-web"),
			(ENV_HTTP_TIMEOUT_SECS, "soon"),
		]))
		.expect_err("Non-numeric timeout must be rejected.");

		assert!(matches!(err, ConfigError::InvalidSetting { name: ENV_HTTP_TIMEOUT_SECS, .. }));
	}

	#[test]
	fn debug_output_hides_secret() {
		let config = BrokerConfig::builder()
			.discovery_url(
				Url::parse("https://cognito.example/.well-known/openid-configuration")
					.expect("URL should parse."),
			)
			.client_id("emis-web")
			.session_secret("do-not-print")
			.build()
			.expect("Configuration should build.");

		assert!(!format!("{config:?}").contains("do-not-print"));
	}

	#[test]
	fn non_http_schemes_are_rejected() {
		let err = BrokerConfig::builder()
			.discovery_url(Url::parse("ftp://cognito.example/config").expect("URL should parse."))
			.client_id("emis-web")
			.build()
			.expect_err("FTP discovery URLs must be rejected.");

		assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));
	}
}
