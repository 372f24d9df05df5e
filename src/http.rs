//! Transport primitives for discovery fetches and token exchanges.
//!
//! The module exposes [`TokenHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can plug in their own HTTP stack without
//! losing the broker's error classification. Implementations call
//! [`ResponseMetadataSlot::take`] before dispatching a request and
//! [`ResponseMetadataSlot::store`] once an HTTP status or retry hint is known, enabling
//! [`TransportErrorMapper`] to classify failures with consistent metadata.

pub use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};

// std
use std::ops::Deref;
// crates.io
use oauth2::http::{
	Method,
	header::{ACCEPT, CONTENT_TYPE},
};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError, TransportError},
	obs::FlowKind,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Abstraction over HTTP transports able to execute discovery and token requests while
/// publishing response metadata to the broker's error mapping.
///
/// The trait is the broker's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so one transport can be shared by every request the broker
/// serves, and the handles they return must own whatever state their request futures need
/// so those futures stay `Send`.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across requests.
	/// - Once an HTTP response (successful or erroneous) provides status headers, save them with
	///   [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		kind: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the upstream, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Discovery and token endpoints return results directly, so clients built here never
/// follow redirects and always carry a request timeout. A custom [`ReqwestClient`] passed
/// to [`ReqwestHttpClient::with_client`] should be configured the same way.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that gives up on any request after `timeout`.
	pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.user_agent(concat!("session-token-broker/", env!("CARGO_PKG_VERSION")))
			.timeout(timeout.unsigned_abs())
			.build()?;

		Ok(Self(client))
	}

	/// Builds an instrumented HTTP client that captures response metadata.
	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

#[cfg(feature = "reqwest")]
/// Instrumented adapter that implements [`AsyncHttpClient`] for reqwest.
pub(crate) struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

#[cfg(feature = "reqwest")]
/// Public handle returned by [`ReqwestHttpClient`] that satisfies [`TokenHttpClient`].
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		kind: FlowKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(kind, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(kind, meta, message),
			_ => map_generic_transport_error(kind, meta, "unknown transport failure"),
		}
	}
}

/// Builds a `GET` request that asks for JSON.
pub(crate) fn get_json(url: &Url) -> Result<HttpRequest> {
	oauth2::http::Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.body(Vec::new())
		.map_err(|e| ConfigError::from(e).into())
}

/// Builds a form-encoded `POST` request from ordered key/value pairs.
pub(crate) fn post_form(url: &Url, form: &BTreeMap<String, String>) -> Result<HttpRequest> {
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(form).finish();

	oauth2::http::Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.body(body.into_bytes())
		.map_err(|e| ConfigError::from(e).into())
}

/// Dispatches `request` through a metadata-instrumented handle, mapping transport failures.
pub(crate) async fn execute<C, M>(
	client: &C,
	mapper: &M,
	kind: FlowKind,
	request: HttpRequest,
) -> Result<(HttpResponse, Option<ResponseMetadata>)>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let slot = ResponseMetadataSlot::default();
	let handle = client.with_metadata(slot.clone());

	match handle.call(request).await {
		Ok(response) => Ok((response, slot.take())),
		Err(err) => Err(mapper.map_transport_error(kind, slot.take().as_ref(), err)),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(kind: FlowKind, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Upstream {
			message: format!("request timed out during {kind}"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn map_generic_transport_error(
	kind: FlowKind,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> Error {
	TransientError::Upstream {
		message: format!("HTTP client error during {kind}: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

pub(crate) fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

pub(crate) fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn post_form_encodes_body_and_headers() {
		let url = Url::parse("https://auth.example/oauth2/token").expect("URL should parse.");
		let mut form = BTreeMap::new();

		form.insert("grant_type".to_owned(), "refresh_token".to_owned());
		form.insert("scope".to_owned(), "openid profile email".to_owned());

		let request = post_form(&url, &form).expect("Form request should build.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(
			request.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some(FORM_CONTENT_TYPE)
		);
		assert_eq!(
			String::from_utf8_lossy(request.body()),
			"grant_type=refresh_token&scope=openid+profile+email"
		);
	}

	#[test]
	fn metadata_slot_take_clears_value() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: None });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(429));
		assert!(slot.take().is_none());
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "30".parse().expect("Header value should parse."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(30)));
	}
}
