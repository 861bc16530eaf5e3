//! Crate-level error types shared by the session coordinator, exchange cache, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Durable store failure; exchange lookups fail closed on this.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, malformed payloads, upstream server errors).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// A bounded external call exceeded its deadline.
	#[error(transparent)]
	Timeout(#[from] crate::timeout::Elapsed),

	/// No credential could be obtained after one refresh attempt.
	#[error("No credential is available.")]
	Unavailable,
	/// Provider explicitly rejected the operation (bad, expired, or reused code).
	#[error("Provider rejected the request with `{code}`.")]
	Provider {
		/// Provider error code (OAuth `error` field or a status-derived fallback).
		code: String,
		/// Provider-supplied description, when present.
		description: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl Error {
	/// Returns `true` when the error came from a deadline rather than a hard failure.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}

	/// Returns `true` when the provider rejected the request.
	pub fn is_provider_rejection(&self) -> bool {
		matches!(self, Self::Provider { .. })
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Exchange endpoint could not be built for the shop.
	#[error("Exchange endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Rendered endpoint string.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoint template lacks the `{shop}` placeholder.
	#[error("Endpoint template must contain the `{{shop}}` placeholder.")]
	MissingShopPlaceholder,
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint returned a non-positive `expires_in`.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Query parameters could not be serialized into a fingerprint.
	#[error("Query parameters cannot be fingerprinted.")]
	UnserializableQuery {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, undecodable payloads).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the exchange endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the exchange endpoint.")]
	Io(#[from] std::io::Error),
	/// Endpoint answered with a success status but an undecodable body.
	#[error("Exchange endpoint returned a malformed response (status {status}).")]
	MalformedResponse {
		/// HTTP status code of the response.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint answered with a server error and no explicit rejection.
	#[error("Exchange endpoint returned status {status} without a rejection body.")]
	UpstreamStatus {
		/// HTTP status code of the response.
		status: u16,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a response decoding failure.
	pub fn malformed(status: u16, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::MalformedResponse { status, source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
