//! Redacting wrappers for bearer tokens and single-use authorization codes.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Single-use authorization code handed back on the OAuth callback.
///
/// The code is the actual secret of the exchange; only its digest is ever persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCode(String);
impl AuthorizationCode {
	/// Wraps a code received from the provider redirect.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw code for the upstream exchange request.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for AuthorizationCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AuthorizationCode").field(&"<redacted>").finish()
	}
}
