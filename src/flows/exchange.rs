//! `refresh_token` grant against the discovered token endpoint.
//!
//! [`Broker::exchange_refresh_token`] always hits the network; caching and singleflight
//! live in the accessors. The grant re-sends the configured scopes so the provider keeps
//! issuing an ID token alongside the access token.

mod metrics;

pub use metrics::ExchangeMetrics;

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, TokenSet},
	error::{ExchangeError, TransientError},
	flows::Broker,
	http::{self, ResponseMetadata, TokenHttpClient, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProviderErrorContext, ProviderErrorKind},
};

#[derive(Deserialize)]
struct TokenResponseBody {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	id_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Default, Deserialize)]
struct ErrorResponseBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges `refresh_token` for a fresh access/ID token pair.
	pub async fn exchange_refresh_token(&self, refresh_token: &TokenSecret) -> Result<TokenSet> {
		const KIND: FlowKind = FlowKind::Exchange;

		let span = FlowSpan::new(KIND, "exchange_refresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.exchange_metrics.record_attempt();

		let result = span.instrument(self.exchange_inner(refresh_token)).await;

		match &result {
			Ok(tokens) => {
				tracing::debug!(expires_in = tokens.expires_in.whole_seconds(), "token exchange succeeded");
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.exchange_metrics.record_success();
			},
			Err(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.exchange_metrics.record_failure();
			},
		}

		result
	}

	/// Form fields sent with the refresh grant, after strategy augmentation.
	pub(crate) fn refresh_form(&self, refresh_token: &TokenSecret) -> BTreeMap<String, String> {
		let mut form = BTreeMap::new();

		form.insert("grant_type".into(), "refresh_token".into());
		form.insert("client_id".into(), self.config.client_id.clone());
		form.insert("refresh_token".into(), refresh_token.expose().to_owned());
		form.insert("scope".into(), self.config.scopes.normalized());

		self.strategy.augment_token_request(&mut form);

		form
	}

	async fn exchange_inner(&self, refresh_token: &TokenSecret) -> Result<TokenSet> {
		let endpoint = self.resolver.token_endpoint().await?;
		let request = http::post_form(&endpoint, &self.refresh_form(refresh_token))?;
		let (response, meta) = http::execute(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			FlowKind::Exchange,
			request,
		)
		.await?;
		let status = response.status().as_u16();

		if !response.status().is_success() {
			return Err(self.map_error_response(status, response.body(), meta.as_ref()));
		}

		parse_token_response(status, response.body())
	}

	fn map_error_response(
		&self,
		status: u16,
		body: &[u8],
		meta: Option<&ResponseMetadata>,
	) -> Error {
		let parsed = serde_json::from_slice::<ErrorResponseBody>(body).unwrap_or_default();
		let mut ctx = ProviderErrorContext::new().with_http_status(status);

		if let Some(error) = parsed.error {
			ctx = ctx.with_oauth_error(error);
		}
		if let Some(description) = parsed.error_description {
			ctx = ctx.with_error_description(description);
		}
		if ctx.oauth_error.is_none() && ctx.error_description.is_none() {
			ctx = ctx.with_body_preview(String::from_utf8_lossy(body));
		}

		let kind = self.strategy.classify_token_error(&ctx);

		tracing::warn!(
			status,
			oauth_error = ctx.oauth_error.as_deref().unwrap_or_default(),
			?kind,
			"token endpoint rejected the refresh grant"
		);

		let reason = ctx.reason();

		match kind {
			ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason },
			ProviderErrorKind::InvalidClient => Error::InvalidClient { reason },
			ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason },
			ProviderErrorKind::Transient => TransientError::Upstream {
				message: reason,
				status: Some(status),
				retry_after: http::meta_retry_after(meta),
			}
			.into(),
		}
	}
}

/// Validates a 2xx token endpoint body.
fn parse_token_response(status: u16, body: &[u8]) -> Result<TokenSet> {
	let mut de = serde_json::Deserializer::from_slice(body);
	let parsed = serde_path_to_error::deserialize::<_, TokenResponseBody>(&mut de)
		.map_err(|source| ExchangeError::Parse { source, status })?;
	let access_token = parsed
		.access_token
		.filter(|token| !token.is_empty())
		.ok_or(ExchangeError::MissingAccessToken)?;
	let Some(id_token) = parsed.id_token.filter(|token| !token.is_empty()) else {
		tracing::error!(
			"token endpoint returned no id_token; the refresh grant must request the openid scope"
		);

		return Err(ExchangeError::MissingIdToken.into());
	};
	let expires_in = match parsed.expires_in {
		None => TokenSet::DEFAULT_EXPIRES_IN,
		Some(secs) if secs > 0 => {
			let max = TokenSet::MAX_EXPIRES_IN.whole_seconds();

			if secs > max {
				tracing::warn!(expires_in = secs, max, "token lifetime clamped");
			}

			Duration::seconds(secs.min(max))
		},
		Some(_) => return Err(ExchangeError::NonPositiveExpiresIn.into()),
	};

	Ok(TokenSet::new(access_token, id_token, expires_in))
}
