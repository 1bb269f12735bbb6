//! Crate-level error types shared across the cache, resolver, refresher, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Authentication-class variants ([`Refresh`](Self::Refresh),
/// [`Authentication`](Self::Authentication), [`CredentialMissing`](Self::CredentialMissing))
/// signal that the caller should prompt re-authentication; everything else is either a local
/// fault or an opaque pass-through from the wrapped operation.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential storage failure.
	#[error("{0}")]
	Store(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Token refresh failed; the resolution attempt is abandoned.
	#[error(transparent)]
	Refresh(#[from] AuthRefreshError),
	/// Service handle construction failed.
	#[error(transparent)]
	Build(#[from] ServiceBuildError),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Credential builder validation failed while assembling a refreshed credential.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),

	/// No stored credential exists for the user; they must authenticate first.
	#[error("No credential is stored for {user}; re-authentication is required.")]
	CredentialMissing {
		/// User the resolution was attempted for.
		user: String,
	},
	/// The wrapped operation kept failing with authentication errors after a cache
	/// invalidation and one retry.
	#[error("Authentication failed after retry: {reason}.")]
	Authentication {
		/// Summary of the final authentication-class failure.
		reason: String,
	},
	/// Non-authentication failure from the wrapped operation, passed through untouched.
	#[error(transparent)]
	Operation(#[from] crate::resolver::OperationError),
}
impl Error {
	/// Returns `true` for authentication-class failures that warrant prompting the user to
	/// re-authenticate, as opposed to operation or infrastructure faults.
	pub fn is_authentication(&self) -> bool {
		matches!(
			self,
			Self::Refresh(_) | Self::Authentication { .. } | Self::CredentialMissing { .. }
		)
	}
}

/// Fatal and transient failures raised while exchanging a refresh token.
#[derive(Debug, ThisError)]
pub enum AuthRefreshError {
	/// The authorization server rejected the refresh token (revoked, expired, or invalid).
	#[error("Authorization server rejected the refresh token: {reason}.")]
	Rejected {
		/// Server-supplied reason string.
		reason: String,
	},
	/// The credential carries no refresh token to exchange.
	#[error("Credential has no refresh token to exchange.")]
	MissingRefreshToken,
	/// The token endpoint did not answer within the configured deadline.
	#[error("Token refresh timed out.")]
	Timeout,
	/// Transport-level failure while calling the token endpoint.
	#[error("Network error occurred while calling the token endpoint.")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint returned an unexpected non-success response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Server- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl AuthRefreshError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Transport { source: Box::new(src) }
	}
}

/// Failure constructing an authenticated service handle.
#[derive(Debug, ThisError)]
#[error("Failed to build the {service} {version} client: {message}.")]
pub struct ServiceBuildError {
	/// Service the handle was requested for.
	pub service: String,
	/// API version the handle was requested for.
	pub version: String,
	/// Human-readable failure summary.
	pub message: String,
	/// Underlying construction failure, when one exists.
	#[source]
	pub source: Option<BoxError>,
}
impl ServiceBuildError {
	/// Creates an error without an underlying source.
	pub fn new(
		service: impl Into<String>,
		version: impl Into<String>,
		message: impl Into<String>,
	) -> Self {
		Self {
			service: service.into(),
			version: version.into(),
			message: message.into(),
			source: None,
		}
	}

	/// Attaches the underlying construction failure.
	pub fn with_source(mut self, src: impl 'static + Send + Sync + StdError) -> Self {
		self.source = Some(Box::new(src));

		self
	}
}
