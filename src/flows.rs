//! Broker facade: session extraction, discovery, refresh exchanges, and cached accessors.

pub mod accessors;
pub mod exchange;

mod common;

pub use exchange::*;

// self
use crate::{
	_prelude::*,
	cache::{CacheKey, TokenCache},
	config::BrokerConfig,
	http::{TokenHttpClient, TransportErrorMapper},
	provider::{DiscoveryResolver, ProviderStrategy},
	session::{SessionDecoder, SessionExtractor},
};
#[cfg(feature = "reqwest")]
use crate::{
	cache::MemoryTokenCache,
	error::ConfigError,
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	provider::DefaultProviderStrategy,
};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Turns inbound session cookies into fresh OIDC tokens.
///
/// Create one broker per process and share it behind an [`Arc`]. The broker owns the HTTP
/// client, the discovery resolver, the token cache, and the per-refresh-token singleflight
/// guards, so concurrent requests for the same session trigger a single exchange.
#[derive(Clone)]
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Validated configuration.
	pub config: BrokerConfig,
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Token cache keyed by refresh-token fingerprint.
	pub cache: Arc<dyn TokenCache>,
	/// Strategy responsible for provider-specific request tweaks and error classification.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Reads the refresh token out of request cookies.
	pub session: SessionExtractor,
	/// Memoized OIDC discovery.
	pub resolver: Arc<DiscoveryResolver<C, M>>,
	/// Shared counters for exchange outcomes.
	pub exchange_metrics: Arc<ExchangeMetrics>,
	flow_guards: Arc<Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: BrokerConfig,
		cache: Arc<dyn TokenCache>,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let http_client = http_client.into();
		let transport_mapper = mapper.into();
		let resolver = Arc::new(DiscoveryResolver::new(
			config.discovery_url.clone(),
			http_client.clone(),
			transport_mapper.clone(),
		));

		Self {
			session: SessionExtractor::from_config(&config),
			config,
			http_client,
			transport_mapper,
			cache,
			strategy,
			resolver,
			exchange_metrics: Default::default(),
			flow_guards: Default::default(),
		}
	}

	/// Replaces the session decoder, e.g. to read a non-NextAuth session format.
	pub fn with_session_decoder(mut self, decoder: Arc<dyn SessionDecoder>) -> Self {
		self.session = SessionExtractor::new(self.config.session_cookie_name.clone(), Some(decoder));

		self
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with the default reqwest transport, in-memory cache, and provider
	/// strategy.
	///
	/// The transport applies `config.http_timeout` to every request and never follows
	/// redirects.
	pub fn new(config: BrokerConfig) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(config.http_timeout)?;

		Ok(Self::with_http_client(
			config,
			Arc::new(MemoryTokenCache::default()),
			Arc::new(DefaultProviderStrategy),
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}

	/// Loads configuration from the environment and builds a default broker.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::new(BrokerConfig::from_env()?)
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("config", &self.config)
			.field("resolver", &self.resolver)
			.field("cached_entries", &self.cache.len())
			.finish()
	}
}
