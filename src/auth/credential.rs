//! Credential model (opaque bearer token plus expiry) and its builder.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Lifecycle status of a credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Issued-at instant is in the future (issuer clock ahead of ours).
	Pending,
	/// Credential is usable.
	Active,
	/// Credential reached its expiry instant.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the expiry precedes the issued-at instant.
	#[error("Expiry must not precede the issued-at instant.")]
	ExpiryBeforeIssue,
}

/// Opaque bearer token plus the issuer's stated expiry.
///
/// Expiry comparisons trust the issuer; clock skew is not compensated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Scope string granted by the provider, if reported.
	pub scope: Option<String>,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry; `None` for non-expiring (offline) tokens.
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Returns a builder for the provided access token.
	pub fn builder(access_token: impl Into<String>) -> CredentialBuilder {
		CredentialBuilder::new().access_token(access_token)
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		if instant < self.issued_at {
			return CredentialStatus::Pending;
		}
		if self.expires_at.is_some_and(|expiry| instant >= expiry) {
			return CredentialStatus::Expired;
		}

		CredentialStatus::Active
	}

	/// Returns `true` if the credential has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Expired)
	}

	/// Remaining lifetime at `instant`; `None` means the credential never expires.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|expiry| expiry - instant)
	}

	/// Returns `true` when the remaining lifetime is below `low_water`.
	pub fn expires_within(&self, instant: OffsetDateTime, low_water: Duration) -> bool {
		self.remaining_at(instant).is_some_and(|remaining| remaining < low_water)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialBuilder {
	access_token: Option<TokenSecret>,
	scope: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	/// Creates an empty builder.
	pub fn new() -> Self {
		Self::default()
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Records the granted scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Sets the issued-at instant (defaults to the current UTC instant).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(issued_at + delta),
			(None, None) => None,
		};

		if expires_at.is_some_and(|expiry| expiry < issued_at) {
			return Err(CredentialBuilderError::ExpiryBeforeIssue);
		}

		Ok(Credential { access_token, scope: self.scope, issued_at, expires_at })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn status_transitions_cover_all_states() {
		let credential = Credential::builder("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Credential builder should succeed for status transitions.");

		assert_eq!(
			credential.status_at(macros::datetime!(2024-12-31 23:59 UTC)),
			CredentialStatus::Pending
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-01 00:30 UTC)),
			CredentialStatus::Active
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-01 01:00 UTC)),
			CredentialStatus::Expired
		);
	}

	#[test]
	fn relative_expiry_and_low_water_mark() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let credential = Credential::builder("access")
			.issued_at(issued)
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Credential builder should support relative expiry.");

		assert_eq!(credential.expires_at, Some(macros::datetime!(2025-01-01 00:30 UTC)));
		assert!(!credential.expires_within(issued, Duration::seconds(60)));
		assert!(
			credential
				.expires_within(macros::datetime!(2025-01-01 00:29:30 UTC), Duration::seconds(60))
		);
	}

	#[test]
	fn offline_tokens_never_expire() {
		let credential = Credential::builder("offline")
			.scope("read_products,read_orders")
			.build()
			.expect("Credential without expiry should build.");

		assert_eq!(credential.remaining_at(OffsetDateTime::now_utc()), None);
		assert!(!credential.expires_within(OffsetDateTime::now_utc(), Duration::days(365)));
		assert!(!credential.is_expired_at(OffsetDateTime::now_utc() + Duration::days(3650)));
	}

	#[test]
	fn builder_rejects_inverted_lifetimes_and_redacts() {
		let err = Credential::builder("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2024-01-01 00:00 UTC))
			.build()
			.expect_err("Expiry before issue must be rejected.");

		assert_eq!(err, CredentialBuilderError::ExpiryBeforeIssue);
		assert_eq!(
			CredentialBuilder::new().build().expect_err("Missing token must be rejected."),
			CredentialBuilderError::MissingAccessToken
		);

		let credential =
			Credential::builder("very-secret").build().expect("Credential should build.");

		assert!(!format!("{credential:?}").contains("very-secret"));
	}
}
