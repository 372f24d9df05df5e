//! Public accessors that turn request cookies into tokens for downstream API calls.
//!
//! Each accessor comes in two forms: `try_*` returns a typed [`Result`] so callers can tell
//! "no session" apart from "exchange failed", and the plain form logs the failure and
//! returns `None`.

// self
use crate::{
	_prelude::*,
	auth::{DisplayTokens, TokenSecret},
	cache::{CacheEntry, CacheKey},
	flows::{Broker, common},
	http::{TokenHttpClient, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::RequestCookies,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a valid ID token for the session carried by `cookies`.
	///
	/// The ID token carries the tenant and role claims the API gateway authorizes on, so
	/// this is the accessor to use for API calls.
	pub async fn try_id_token_for_api_call(&self, cookies: &RequestCookies) -> Result<TokenSecret> {
		Ok(self.resolve_tokens(cookies, "id_token_for_api_call").await?.id_token)
	}

	/// Sentinel form of [`Broker::try_id_token_for_api_call`].
	pub async fn id_token_for_api_call(&self, cookies: &RequestCookies) -> Option<TokenSecret> {
		log_failure("id_token_for_api_call", self.try_id_token_for_api_call(cookies).await)
	}

	/// Returns a valid access token for the session carried by `cookies`.
	pub async fn try_access_token_for_api_call(
		&self,
		cookies: &RequestCookies,
	) -> Result<TokenSecret> {
		Ok(self.resolve_tokens(cookies, "access_token_for_api_call").await?.access_token)
	}

	/// Sentinel form of [`Broker::try_access_token_for_api_call`].
	#[deprecated(
		note = "Access tokens lack the tenant and role claims; use `id_token_for_api_call`."
	)]
	pub async fn access_token_for_api_call(&self, cookies: &RequestCookies) -> Option<TokenSecret> {
		log_failure("access_token_for_api_call", self.try_access_token_for_api_call(cookies).await)
	}

	/// Returns both tokens for diagnostic and display surfaces.
	pub async fn try_tokens_for_display(&self, cookies: &RequestCookies) -> Result<DisplayTokens> {
		Ok(self.resolve_tokens(cookies, "tokens_for_display").await?.display_tokens())
	}

	/// Sentinel form of [`Broker::try_tokens_for_display`].
	pub async fn tokens_for_display(&self, cookies: &RequestCookies) -> Option<DisplayTokens> {
		log_failure("tokens_for_display", self.try_tokens_for_display(cookies).await)
	}

	async fn resolve_tokens(
		&self,
		cookies: &RequestCookies,
		stage: &'static str,
	) -> Result<CacheEntry> {
		const KIND: FlowKind = FlowKind::Accessor;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.resolve_tokens_inner(cookies)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn resolve_tokens_inner(&self, cookies: &RequestCookies) -> Result<CacheEntry> {
		let refresh_token = self.session.try_refresh_token(cookies)?;
		let key = CacheKey::from_refresh_token(&refresh_token);

		if let Some(entry) = self.cached_entry(&key) {
			return Ok(entry);
		}

		let guard = common::flow_guard(self, &key);
		let singleflight = guard.lock().await;

		// Another caller may have finished the exchange while we waited.
		if let Some(entry) = self.cached_entry(&key) {
			return Ok(entry);
		}

		let result = self
			.exchange_refresh_token(&refresh_token)
			.await
			.map(|tokens| self.cache.set(&key, &tokens, OffsetDateTime::now_utc()));

		drop(singleflight);
		drop(guard);

		let pruned = common::prune_flow_guards(self);

		if pruned > 0 {
			tracing::debug!(pruned, "idle singleflight guards pruned");
		}

		result
	}

	fn cached_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
		let entry = self.cache.get(key, OffsetDateTime::now_utc())?;

		self.exchange_metrics.record_cache_hit();
		obs::record_flow_outcome(FlowKind::Accessor, FlowOutcome::CacheHit);
		tracing::trace!(expires_at = %entry.expires_at, "token cache hit");

		Some(entry)
	}
}

fn log_failure<T>(accessor: &'static str, result: Result<T>) -> Option<T> {
	match result {
		Ok(value) => Some(value),
		Err(e) => {
			tracing::warn!(
				accessor,
				error = %e,
				unauthenticated = e.is_unauthenticated(),
				"token unavailable"
			);

			None
		},
	}
}
