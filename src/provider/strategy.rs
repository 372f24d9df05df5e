//! Provider strategy hooks that customize refresh exchanges.
//!
//! Implementations decorate outgoing token requests and normalize error mapping
//! without tying the exchange to any particular HTTP client.

// self
use crate::_prelude::*;

/// Strategy hook that lets providers decorate requests and classify errors.
///
/// Implementors must be `Send + Sync`; the hooks use crate-owned data types so downstream
/// crates never depend on reqwest-specific structures. Only `classify_token_error` is
/// required.
pub trait ProviderStrategy
where
	Self: Send + Sync,
{
	/// Maps a non-success token response into the broker taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Gives providers a chance to add form parameters (audience, resource) before dispatch.
	fn augment_token_request(&self, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the refresh token (revoked, expired, or reused).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the grant covers.
	InsufficientScope,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
///
/// Only primitive data is carried (status code, OAuth fields, body preview) so strategies
/// stay decoupled from the HTTP client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Best human-readable reason available, falling back to the HTTP status.
	pub fn reason(&self) -> String {
		self.error_description
			.clone()
			.or_else(|| self.oauth_error.clone())
			.or_else(|| self.body_preview.clone().filter(|body| !body.trim().is_empty()))
			.or_else(|| self.http_status.map(|status| format!("HTTP {status}")))
			.unwrap_or_else(|| "unknown token endpoint failure".into())
	}
}

/// Default strategy applying RFC 6749 heuristics.
///
/// Structured OAuth fields (`error`, `error_description`) win, then body text hints, and
/// finally the HTTP status code.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut preview =
		body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	preview.push('…');

	preview
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	match value.to_ascii_lowercase().as_str() {
		"invalid_grant" | "access_denied" => Some(ProviderErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" => Some(ProviderErrorKind::InvalidClient),
		"invalid_scope" | "insufficient_scope" => Some(ProviderErrorKind::InsufficientScope),
		"temporarily_unavailable" | "server_error" | "slow_down" =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_field_wins_over_status() {
		let ctx = ProviderErrorContext::new().with_http_status(500).with_oauth_error("invalid_grant");

		assert_eq!(
			DefaultProviderStrategy.classify_token_error(&ctx),
			ProviderErrorKind::InvalidGrant
		);
	}

	#[test]
	fn description_hints_are_used_when_error_is_unknown() {
		let ctx = ProviderErrorContext::new()
			.with_http_status(400)
			.with_oauth_error("custom_error")
			.with_error_description("Scope invalid_scope rejected");

		assert_eq!(
			DefaultProviderStrategy.classify_token_error(&ctx),
			ProviderErrorKind::InsufficientScope
		);
	}

	#[test]
	fn status_fallbacks_cover_common_codes() {
		let classify = |status| {
			DefaultProviderStrategy
				.classify_token_error(&ProviderErrorContext::new().with_http_status(status))
		};

		assert_eq!(classify(400), ProviderErrorKind::InvalidGrant);
		assert_eq!(classify(401), ProviderErrorKind::InvalidClient);
		assert_eq!(classify(403), ProviderErrorKind::InsufficientScope);
		assert_eq!(classify(429), ProviderErrorKind::Transient);
		assert_eq!(classify(503), ProviderErrorKind::Transient);
	}

	#[test]
	fn body_preview_is_truncated() {
		let ctx = ProviderErrorContext::new().with_body_preview("x".repeat(1_000));
		let preview = ctx.body_preview.expect("Preview should be stored.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}

	#[test]
	fn reason_prefers_description_then_status() {
		let described = ProviderErrorContext::new()
			.with_oauth_error("invalid_grant")
			.with_error_description("Refresh Token has been revoked");
		let bare = ProviderErrorContext::new().with_http_status(502);

		assert_eq!(described.reason(), "Refresh Token has been revoked");
		assert_eq!(bare.reason(), "HTTP 502");
	}
}
