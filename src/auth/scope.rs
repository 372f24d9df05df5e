//! Scope list sent with the refresh grant.

// std
use std::slice::Iter;
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Ordered, deduplicated set of OAuth scopes.
///
/// Unlike a sorted set, the order the scopes were declared in is kept so the `scope`
/// parameter echoes exactly what the client originally requested (`openid profile email`).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
}
impl ScopeSet {
	/// Scope that makes the provider return an ID token.
	pub const OPENID: &'static str = "openid";

	/// Creates a scope set from any iterator, dropping duplicates.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut ordered = Vec::<String>::new();

		for scope in scopes {
			let owned: String = scope.into();

			if owned.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if owned.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}
			if !ordered.contains(&owned) {
				ordered.push(owned);
			}
		}

		Ok(Self { scopes: Arc::from(ordered) })
	}

	/// The `openid profile email` set requested at sign-in.
	pub fn oidc_default() -> Self {
		Self { scopes: Arc::from(["openid", "profile", "email"].map(String::from)) }
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.iter().any(|candidate| candidate == scope)
	}

	/// Iterator over scopes in declaration order.
	pub fn iter(&self) -> Iter<'_, String> {
		self.scopes.iter()
	}

	/// Space-delimited representation used for the `scope` form field.
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl TryFrom<Vec<String>> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
