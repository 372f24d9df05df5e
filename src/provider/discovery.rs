//! OIDC discovery: resolve the token endpoint once and keep it for the process lifetime.

// crates.io
use async_lock::OnceCell;
// self
use crate::{
	_prelude::*,
	error::DiscoveryError,
	http::{self, TokenHttpClient, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Subset of the OpenID Provider Metadata the broker relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WellKnownConfig {
	/// Token endpoint used for the `refresh_token` grant.
	pub token_endpoint: Url,
	/// Issuer identifier, when advertised.
	pub issuer: Option<String>,
}
impl WellKnownConfig {
	/// Parses and validates a discovery document body.
	pub fn from_slice(body: &[u8]) -> Result<Self, DiscoveryError> {
		#[derive(Deserialize)]
		struct RawDocument {
			#[serde(default)]
			token_endpoint: Option<String>,
			#[serde(default)]
			issuer: Option<String>,
		}

		let mut de = serde_json::Deserializer::from_slice(body);
		let raw = serde_path_to_error::deserialize::<_, RawDocument>(&mut de)
			.map_err(|source| DiscoveryError::Parse { source })?;
		let endpoint = raw
			.token_endpoint
			.filter(|value| !value.trim().is_empty())
			.ok_or(DiscoveryError::MissingTokenEndpoint)?;
		let token_endpoint = Url::parse(endpoint.trim())
			.map_err(|source| DiscoveryError::InvalidTokenEndpoint { source })?;

		Ok(Self { token_endpoint, issuer: raw.issuer })
	}
}

/// Lazily fetches the discovery document and memoizes the first successful result.
///
/// Concurrent first callers share a single fetch. Failures are not memoized, so the next
/// call tries again.
pub struct DiscoveryResolver<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	discovery_url: Url,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	config: OnceCell<WellKnownConfig>,
}
impl<C, M> DiscoveryResolver<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a resolver for `discovery_url`.
	pub fn new(discovery_url: Url, http_client: Arc<C>, transport_mapper: Arc<M>) -> Self {
		Self { discovery_url, http_client, transport_mapper, config: OnceCell::new() }
	}

	/// Discovery document URL.
	pub fn discovery_url(&self) -> &Url {
		&self.discovery_url
	}

	/// Returns the cached document, fetching it on first use.
	pub async fn well_known(&self) -> Result<&WellKnownConfig> {
		if let Some(config) = self.config.get() {
			return Ok(config);
		}

		let span = FlowSpan::new(FlowKind::Discovery, "well_known");

		span.instrument(self.config.get_or_try_init(|| self.fetch())).await
	}

	/// Returns the token endpoint advertised by the provider.
	pub async fn token_endpoint(&self) -> Result<Url> {
		Ok(self.well_known().await?.token_endpoint.clone())
	}

	/// Returns `true` once a document has been cached.
	pub fn is_resolved(&self) -> bool {
		self.config.get().is_some()
	}

	async fn fetch(&self) -> Result<WellKnownConfig> {
		obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Attempt);

		let result = self.fetch_inner().await;

		match &result {
			Ok(config) => {
				tracing::info!(
					token_endpoint_host = config.token_endpoint.host_str().unwrap_or_default(),
					issuer = config.issuer.as_deref().unwrap_or_default(),
					"discovery document resolved"
				);
				obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Success);
			},
			Err(e) => {
				tracing::warn!(error = %e, "discovery document fetch failed");
				obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn fetch_inner(&self) -> Result<WellKnownConfig> {
		let request = http::get_json(&self.discovery_url)?;
		let (response, _) = http::execute(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			FlowKind::Discovery,
			request,
		)
		.await?;
		let status = response.status();

		if !status.is_success() {
			return Err(DiscoveryError::Status { status: status.as_u16() }.into());
		}

		Ok(WellKnownConfig::from_slice(response.body())?)
	}
}
impl<C, M> Debug for DiscoveryResolver<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DiscoveryResolver")
			.field("discovery_url", &self.discovery_url.as_str())
			.field("resolved", &self.is_resolved())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parses_token_endpoint_and_issuer() {
		let config = WellKnownConfig::from_slice(
			br#"{"issuer":"https://auth.example","token_endpoint":"https://auth.example/oauth2/token","jwks_uri":"https://auth.example/jwks"}"#,
		)
		.expect("Discovery document should parse.");

		assert_eq!(config.token_endpoint.as_str(), "https://auth.example/oauth2/token");
		assert_eq!(config.issuer.as_deref(), Some("https://auth.example"));
	}

	#[test]
	fn missing_or_blank_endpoint_is_rejected() {
		for body in [&br#"{"issuer":"https://auth.example"}"#[..], &br#"{"token_endpoint":"  "}"#[..]] {
			let err = WellKnownConfig::from_slice(body).expect_err("Endpoint is required.");

			assert!(matches!(err, DiscoveryError::MissingTokenEndpoint));
		}
	}

	#[test]
	fn invalid_json_and_urls_are_reported() {
		assert!(matches!(
			WellKnownConfig::from_slice(b"<html>"),
			Err(DiscoveryError::Parse { .. })
		));
		assert!(matches!(
			WellKnownConfig::from_slice(br#"{"token_endpoint":"not a url"}"#),
			Err(DiscoveryError::InvalidTokenEndpoint { .. })
		));
	}
}
