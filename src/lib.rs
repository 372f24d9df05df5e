//! Server-side session token broker: turn NextAuth session cookies into fresh OIDC ID and
//! access tokens with cached discovery, singleflight refresh, and an in-process token cache.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod provider;
pub mod session;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::TokenSecret,
		cache::{MemoryTokenCache, TokenCache},
		config::BrokerConfig,
		flows::Broker,
		http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
		provider::{DefaultProviderStrategy, ProviderStrategy},
		session::{DecodedSession, NextAuthJweDecoder},
	};

	/// Secret shared by the broker and the session cookies minted in tests.
	pub const TEST_SESSION_SECRET: &str = "test-nextauth-secret-0123456789abcdef";

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a validated configuration pointing at the provided discovery URL.
	pub fn test_config(discovery_url: &str, client_id: &str, secret: Option<&str>) -> BrokerConfig {
		let mut builder = BrokerConfig::builder()
			.discovery_url(
				Url::parse(discovery_url).expect("Test discovery URL should parse successfully."),
			)
			.client_id(client_id);

		if let Some(secret) = secret {
			builder = builder.session_secret(secret);
		}

		builder.build().expect("Test broker configuration should be valid.")
	}

	/// Constructs a [`Broker`] backed by a fresh in-memory cache, default provider strategy, and
	/// the reqwest transport used across integration tests.
	pub fn build_reqwest_test_broker(
		config: BrokerConfig,
	) -> (ReqwestTestBroker, Arc<MemoryTokenCache>) {
		let cache_backend = Arc::new(MemoryTokenCache::default());
		let cache: Arc<dyn TokenCache> = cache_backend.clone();
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
		let broker = Broker::with_http_client(
			config,
			cache,
			strategy,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		);

		(broker, cache_backend)
	}

	/// Mints an encrypted session cookie value carrying the provided refresh token.
	pub fn seal_session(secret: &str, refresh_token: &str) -> String {
		let session = DecodedSession::with_refresh_token(TokenSecret::new(refresh_token));

		NextAuthJweDecoder::new(secret)
			.encode(&session)
			.expect("Test session should encrypt successfully.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
