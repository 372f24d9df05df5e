//! NextAuth-compatible JWE codec (`alg=dir`, `enc=A256GCM`).

// crates.io
use aes_gcm::{
	Aes256Gcm, Nonce,
	aead::{Aead, KeyInit, Payload},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hkdf::Hkdf;
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::SessionError,
	session::{DecodedSession, SessionDecoder},
};

const KEY_INFO: &[u8] = b"NextAuth.js Generated Encryption Key";
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
/// Clock skew tolerated when checking the session `exp` claim, in seconds.
pub const EXP_LEEWAY_SECS: i64 = 15;

#[derive(Deserialize)]
struct ProtectedHeader {
	alg: String,
	enc: String,
}

/// Decrypts (and for tests, seals) session cookies written by NextAuth.
///
/// The content-encryption key is derived from the shared secret with HKDF-SHA256, exactly as
/// the sign-in application derives it, so both sides read the same cookie.
#[derive(Clone)]
pub struct NextAuthJweDecoder {
	secret: TokenSecret,
}
impl NextAuthJweDecoder {
	/// Creates a codec for the provided shared secret.
	pub fn new(secret: impl Into<String>) -> Self {
		Self { secret: TokenSecret::new(secret) }
	}

	/// Seals a session into a compact JWE string.
	pub fn encode(&self, session: &DecodedSession) -> Result<String, SessionError> {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"dir","enc":"A256GCM"}"#);
		let plaintext = serde_json::to_vec(session).map_err(|_| SessionError::Encode)?;
		let iv = rand::random::<[u8; IV_LEN]>();
		let sealed = self
			.cipher()?
			.encrypt(Nonce::from_slice(&iv), Payload { msg: &plaintext, aad: header.as_bytes() })
			.map_err(|_| SessionError::Encode)?;
		let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

		Ok(format!(
			"{header}..{}.{}.{}",
			URL_SAFE_NO_PAD.encode(iv),
			URL_SAFE_NO_PAD.encode(ciphertext),
			URL_SAFE_NO_PAD.encode(tag)
		))
	}

	fn cipher(&self) -> Result<Aes256Gcm, SessionError> {
		let hk = Hkdf::<Sha256>::new(None, self.secret.expose().as_bytes());
		let mut key = [0_u8; 32];

		hk.expand(KEY_INFO, &mut key).map_err(|_| SessionError::Decrypt)?;

		Aes256Gcm::new_from_slice(&key).map_err(|_| SessionError::Decrypt)
	}
}
impl Debug for NextAuthJweDecoder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NextAuthJweDecoder").finish_non_exhaustive()
	}
}
impl SessionDecoder for NextAuthJweDecoder {
	fn decode(&self, raw: &str, now: OffsetDateTime) -> Result<DecodedSession, SessionError> {
		let segments = raw.split('.').collect::<Vec<_>>();
		let [header_b64, encrypted_key, iv, ciphertext, tag] = segments.as_slice() else {
			return Err(SessionError::Malformed { reason: "expected five compact segments" });
		};
		let header = URL_SAFE_NO_PAD
			.decode(header_b64)
			.map_err(|_| SessionError::Malformed { reason: "header is not base64url" })?;
		let header = serde_json::from_slice::<ProtectedHeader>(&header)
			.map_err(|_| SessionError::Malformed { reason: "header is not a JOSE header" })?;

		if header.alg != "dir" || header.enc != "A256GCM" {
			return Err(SessionError::Malformed { reason: "unsupported alg or enc" });
		}
		if !encrypted_key.is_empty() {
			return Err(SessionError::Malformed { reason: "direct encryption carries no key" });
		}

		let iv = decode_segment(iv, "iv is not base64url")?;
		let mut sealed = decode_segment(ciphertext, "ciphertext is not base64url")?;
		let tag = decode_segment(tag, "tag is not base64url")?;

		if iv.len() != IV_LEN || tag.len() != TAG_LEN {
			return Err(SessionError::Malformed { reason: "iv or tag has the wrong length" });
		}

		sealed.extend_from_slice(&tag);

		let plaintext = self
			.cipher()?
			.decrypt(Nonce::from_slice(&iv), Payload { msg: &sealed, aad: header_b64.as_bytes() })
			.map_err(|_| SessionError::Decrypt)?;
		let mut de = serde_json::Deserializer::from_slice(&plaintext);
		let session = serde_path_to_error::deserialize::<_, DecodedSession>(&mut de)
			.map_err(|source| SessionError::Payload { source })?;

		if let Some(exp) = session.exp {
			if exp.saturating_add(EXP_LEEWAY_SECS) < now.unix_timestamp() {
				return Err(SessionError::Expired);
			}
		}

		Ok(session)
	}
}

fn decode_segment(segment: &str, reason: &'static str) -> Result<Vec<u8>, SessionError> {
	URL_SAFE_NO_PAD.decode(segment).map_err(|_| SessionError::Malformed { reason })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const SECRET: &str = "unit-test-secret";

	#[test]
	fn sealed_sessions_decode_with_the_same_secret() {
		let codec = NextAuthJweDecoder::new(SECRET);
		let session = DecodedSession::with_refresh_token(TokenSecret::new("rt-1"));
		let sealed = codec.encode(&session).expect("Session should seal.");

		assert_eq!(sealed.split('.').count(), 5);
		assert_eq!(sealed.split('.').nth(1), Some(""));

		let decoded = codec.decode(&sealed, OffsetDateTime::now_utc()).expect("Session should open.");

		assert_eq!(decoded.refresh_token.as_ref().map(TokenSecret::expose), Some("rt-1"));
	}

	#[test]
	fn wrong_secret_fails_authentication() {
		let session = DecodedSession::with_refresh_token(TokenSecret::new("rt-1"));
		let sealed = NextAuthJweDecoder::new(SECRET).encode(&session).expect("Session should seal.");
		let err = NextAuthJweDecoder::new("other-secret")
			.decode(&sealed, OffsetDateTime::now_utc())
			.expect_err("A different secret must not open the session.");

		assert!(matches!(err, SessionError::Decrypt));
	}

	#[test]
	fn tampered_header_fails_authentication() {
		let codec = NextAuthJweDecoder::new(SECRET);
		let session = DecodedSession::with_refresh_token(TokenSecret::new("rt-1"));
		let sealed = codec.encode(&session).expect("Session should seal.");
		let (_, rest) = sealed.split_once('.').expect("Compact form has separators.");
		let forged_header = URL_SAFE_NO_PAD.encode(br#"{"enc":"A256GCM","alg":"dir"}"#);
		let err = codec
			.decode(&format!("{forged_header}.{rest}"), OffsetDateTime::now_utc())
			.expect_err("The header is bound as additional data.");

		assert!(matches!(err, SessionError::Decrypt));
	}

	#[test]
	fn expired_sessions_are_rejected_after_leeway() {
		let codec = NextAuthJweDecoder::new(SECRET);
		let now = OffsetDateTime::now_utc();
		let mut session = DecodedSession::with_refresh_token(TokenSecret::new("rt-1"));

		session.exp = Some(now.unix_timestamp() - 10);

		let sealed = codec.encode(&session).expect("Session should seal.");

		assert!(codec.decode(&sealed, now).is_ok(), "Ten seconds late is within leeway.");

		let err = codec
			.decode(&sealed, now + Duration::seconds(EXP_LEEWAY_SECS))
			.expect_err("Past the leeway the session is expired.");

		assert!(matches!(err, SessionError::Expired));
	}

	#[test]
	fn far_future_expiry_is_accepted() {
		let codec = NextAuthJweDecoder::new(SECRET);
		let mut session = DecodedSession::with_refresh_token(TokenSecret::new("rt-1"));

		session.exp = Some(i64::MAX);

		let sealed = codec.encode(&session).expect("Session should seal.");
		let decoded =
			codec.decode(&sealed, OffsetDateTime::now_utc()).expect("Session should open.");

		assert_eq!(decoded.exp, Some(i64::MAX));
	}

	#[test]
	fn structural_problems_are_reported_as_malformed() {
		let codec = NextAuthJweDecoder::new(SECRET);
		let now = OffsetDateTime::now_utc();

		for raw in ["", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.x.y.z.w", "not-base64!..a.b.c"] {
			let err = codec.decode(raw, now).expect_err("Malformed input must be rejected.");

			assert!(matches!(err, SessionError::Malformed { .. }), "{raw:?} gave {err:?}");
		}
	}
}
