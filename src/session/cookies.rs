//! Request cookie store and session cookie reassembly.
//!
//! Browsers cap a single cookie at roughly 4 KiB, so large sessions are written as
//! `name.0`, `name.1`, … and must be stitched back together in numeric order before they can
//! be decrypted.

// crates.io
use cookie::Cookie;
// self
use crate::_prelude::*;

/// Prefix browsers require for cookies set with the `Secure` attribute over HTTPS.
pub const SECURE_COOKIE_PREFIX: &str = "__Secure-";

// Bound parsed chunk indices so crafted headers cannot force huge allocations.
const MAX_CHUNK_INDEX: usize = 63;

/// Cookies presented with a single inbound request, in header order.
#[derive(Clone, Default)]
pub struct RequestCookies {
	pairs: Vec<(String, String)>,
}
impl RequestCookies {
	/// Creates an empty cookie store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a store from `(name, value)` pairs.
	pub fn from_pairs<I, N, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (N, V)>,
		N: Into<String>,
		V: Into<String>,
	{
		Self { pairs: pairs.into_iter().map(|(n, v)| (n.into(), v.into())).collect() }
	}

	/// Parses a raw `Cookie` request header, skipping malformed pairs.
	pub fn parse_header(header: &str) -> Self {
		let mut pairs = Vec::new();

		for cookie in Cookie::split_parse(header) {
			match cookie {
				Ok(cookie) => pairs.push((cookie.name().to_owned(), cookie.value().to_owned())),
				Err(e) => tracing::debug!(error = %e, "ignoring malformed cookie"),
			}
		}

		Self { pairs }
	}

	/// Appends a cookie.
	pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.pairs.push((name.into(), value.into()));
	}

	/// Number of cookies presented.
	pub fn len(&self) -> usize {
		self.pairs.len()
	}

	/// Returns `true` when no cookies were presented.
	pub fn is_empty(&self) -> bool {
		self.pairs.is_empty()
	}

	/// Returns the first cookie value stored under `name`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
	}

	/// Iterates over cookie names, safe to log.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.pairs.iter().map(|(n, _)| n.as_str())
	}

	fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
	}
}
impl Debug for RequestCookies {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestCookies").field("names", &self.names().collect::<Vec<_>>()).finish()
	}
}

/// Where a reassembled session value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCookieSource {
	/// Stitched together from numbered chunks.
	Chunked {
		/// Whether the `__Secure-` variant supplied the chunks.
		secure: bool,
		/// Number of chunks concatenated.
		chunks: usize,
		/// Whether the chunk indices skipped a number.
		gap: bool,
	},
	/// Read from one unchunked cookie.
	Single {
		/// Whether the `__Secure-` variant was used.
		secure: bool,
	},
}

/// Session cookie value reassembled from a [`RequestCookies`] store.
#[derive(Clone)]
pub struct LocatedSession {
	/// Full encrypted session value.
	pub value: String,
	/// Where the value came from.
	pub source: SessionCookieSource,
}
impl Debug for LocatedSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LocatedSession")
			.field("value_len", &self.value.len())
			.field("source", &self.source)
			.finish()
	}
}

/// Finds the session cookie for `base_name`, preferring chunked values over single cookies
/// and the secure variant over the insecure one.
pub fn locate_session(cookies: &RequestCookies, base_name: &str) -> Option<LocatedSession> {
	let secure_name = format!("{SECURE_COOKIE_PREFIX}{base_name}");

	for (name, secure) in [(secure_name.as_str(), true), (base_name, false)] {
		let chunks = collect_chunks(cookies, name);

		if !chunks.is_empty() {
			let (value, gap) = reassemble_chunks(chunks.clone());

			if gap {
				tracing::warn!(
					cookie = name,
					chunks = chunks.len(),
					"session cookie chunk indices are not contiguous"
				);
			}

			return Some(LocatedSession {
				value,
				source: SessionCookieSource::Chunked { secure, chunks: chunks.len(), gap },
			});
		}
	}
	for (name, secure) in [(secure_name.as_str(), true), (base_name, false)] {
		if let Some(value) = cookies.get(name) {
			return Some(LocatedSession {
				value: value.to_owned(),
				source: SessionCookieSource::Single { secure },
			});
		}
	}

	None
}

fn collect_chunks(cookies: &RequestCookies, name: &str) -> Vec<(usize, String)> {
	cookies
		.iter()
		.filter_map(|(cookie_name, value)| {
			let index = cookie_name.strip_prefix(name)?.strip_prefix('.')?;

			if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
				return None;
			}

			let index = index.parse::<usize>().ok()?;

			(index <= MAX_CHUNK_INDEX).then(|| (index, value.to_owned()))
		})
		.collect()
}

/// Concatenates chunks in ascending index order; the flag reports a missing index.
fn reassemble_chunks(mut chunks: Vec<(usize, String)>) -> (String, bool) {
	chunks.sort_by_key(|(index, _)| *index);
	chunks.dedup_by_key(|(index, _)| *index);

	let gap = chunks.iter().enumerate().any(|(expected, (index, _))| expected != *index);
	let value = chunks.into_iter().map(|(_, value)| value).collect::<String>();

	(value, gap)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const NAME: &str = "next-auth.session-token";

	#[test]
	fn chunks_are_joined_in_numeric_order() {
		let cookies = RequestCookies::from_pairs([
			("next-auth.session-token.2", "C"),
			("next-auth.session-token.0", "A"),
			("next-auth.session-token.1", "B"),
		]);
		let located = locate_session(&cookies, NAME).expect("Chunked session should be found.");

		assert_eq!(located.value, "ABC");
		assert_eq!(
			located.source,
			SessionCookieSource::Chunked { secure: false, chunks: 3, gap: false }
		);
	}

	#[test]
	fn numeric_sort_handles_two_digit_indices() {
		let mut pairs = (0..12).rev().map(|i| (format!("{NAME}.{i}"), i.to_string())).collect::<Vec<_>>();

		pairs.push(("unrelated".into(), "x".into()));

		let located = locate_session(&RequestCookies::from_pairs(pairs), NAME)
			.expect("Chunked session should be found.");

		assert_eq!(located.value, "01234567891011");
	}

	#[test]
	fn chunks_take_precedence_over_single_secure_cookie() {
		let cookies = RequestCookies::from_pairs([
			("__Secure-next-auth.session-token", "single"),
			("next-auth.session-token.1", "B"),
			("next-auth.session-token.0", "A"),
		]);
		let located = locate_session(&cookies, NAME).expect("Session should be found.");

		assert_eq!(located.value, "AB");
	}

	#[test]
	fn secure_chunks_win_over_insecure_chunks() {
		let cookies = RequestCookies::from_pairs([
			("next-auth.session-token.0", "insecure"),
			("__Secure-next-auth.session-token.0", "secure"),
		]);
		let located = locate_session(&cookies, NAME).expect("Session should be found.");

		assert_eq!(located.value, "secure");
		assert!(matches!(located.source, SessionCookieSource::Chunked { secure: true, .. }));
	}

	#[test]
	fn single_secure_cookie_beats_insecure_cookie() {
		let cookies = RequestCookies::from_pairs([
			("next-auth.session-token", "insecure"),
			("__Secure-next-auth.session-token", "secure"),
		]);
		let located = locate_session(&cookies, NAME).expect("Session should be found.");

		assert_eq!(located.value, "secure");
		assert_eq!(located.source, SessionCookieSource::Single { secure: true });
	}

	#[test]
	fn gaps_are_flagged_but_still_joined() {
		let cookies = RequestCookies::from_pairs([
			("next-auth.session-token.0", "A"),
			("next-auth.session-token.2", "C"),
		]);
		let located = locate_session(&cookies, NAME).expect("Session should be found.");

		assert_eq!(located.value, "AC");
		assert!(matches!(located.source, SessionCookieSource::Chunked { gap: true, .. }));
	}

	#[test]
	fn lookalike_names_and_oversized_indices_are_ignored() {
		let cookies = RequestCookies::from_pairs([
			("next-auth.session-token-legacy", "x"),
			("next-auth.session-token.+1", "y"),
			("next-auth.session-token.64", "z"),
		]);

		assert!(locate_session(&cookies, NAME).is_none());
	}

	#[test]
	fn parse_header_reads_pairs_in_order() {
		let cookies = RequestCookies::parse_header(
			"theme=dark; next-auth.session-token.1=B; next-auth.session-token.0=A",
		);

		assert_eq!(cookies.len(), 3);
		assert_eq!(cookies.get("theme"), Some("dark"));
		assert_eq!(locate_session(&cookies, NAME).map(|s| s.value), Some("AB".to_owned()));
	}

	#[test]
	fn debug_output_hides_values() {
		let cookies = RequestCookies::from_pairs([("next-auth.session-token", "secret-blob")]);

		assert!(!format!("{cookies:?}").contains("secret-blob"));
	}
}
