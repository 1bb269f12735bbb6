//! Token refresh contracts plus the reqwest-backed Google token endpoint client.

// std
#[cfg(feature = "reqwest")] use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, auth::Credential, error::AuthRefreshError};

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, AuthRefreshError>> + 'a + Send>>;

/// Contract for exchanging an expired credential for a fresh one.
///
/// Implementations must not mutate the provided credential; a refreshed credential is a new
/// value the caller persists as a replacement.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Obtains a new access token for the credential or fails with an
	/// [`AuthRefreshError`].
	fn refresh<'a>(&'a self, credential: &'a Credential) -> RefreshFuture<'a>;
}

/// Google's OAuth 2.0 token endpoint.
#[cfg(feature = "reqwest")]
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// [`TokenRefresher`] performing `grant_type=refresh_token` exchanges over HTTPS.
///
/// Requests run under a bounded timeout so a stalled token endpoint cannot wedge a
/// resolution; timeouts surface as [`AuthRefreshError::Timeout`], which callers treat as
/// authentication-class. The client passed via [`with_client`](Self::with_client) should not
/// follow redirects; token endpoints return results directly.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct HttpTokenRefresher {
	client: ReqwestClient,
	token_endpoint: Url,
	client_id: String,
	client_secret: Option<String>,
	timeout: StdDuration,
}
#[cfg(feature = "reqwest")]
impl HttpTokenRefresher {
	/// Default network deadline for a refresh call.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

	/// Creates a refresher for the provided token endpoint and OAuth client identifier.
	pub fn new(token_endpoint: Url, client_id: impl Into<String>) -> Self {
		Self {
			client: ReqwestClient::default(),
			token_endpoint,
			client_id: client_id.into(),
			client_secret: None,
			timeout: Self::DEFAULT_TIMEOUT,
		}
	}

	/// Creates a refresher targeting [`GOOGLE_TOKEN_ENDPOINT`].
	pub fn google(client_id: impl Into<String>) -> Self {
		let endpoint = Url::parse(GOOGLE_TOKEN_ENDPOINT)
			.expect("Bundled Google token endpoint should be a valid URL.");

		Self::new(endpoint, client_id)
	}

	/// Replaces the underlying reqwest client.
	pub fn with_client(mut self, client: ReqwestClient) -> Self {
		self.client = client;

		self
	}

	/// Sets the client secret for confidential OAuth clients.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the per-request network deadline.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	async fn refresh_credential(
		&self,
		credential: &Credential,
	) -> Result<Credential, AuthRefreshError> {
		let refresh_token = credential
			.refresh_token
			.as_ref()
			.ok_or(AuthRefreshError::MissingRefreshToken)?
			.expose()
			.to_owned();
		let mut form = vec![
			("grant_type", "refresh_token".to_owned()),
			("refresh_token", refresh_token.clone()),
			("client_id", self.client_id.clone()),
		];

		if let Some(secret) = self.client_secret.as_ref() {
			form.push(("client_secret", secret.clone()));
		}

		let response = self
			.client
			.post(self.token_endpoint.clone())
			.timeout(self.timeout)
			.form(&form)
			.send()
			.await
			.map_err(map_reqwest_error)?;
		let status = response.status().as_u16();
		let bytes = response.bytes().await.map_err(map_reqwest_error)?;

		if !(200..300).contains(&status) {
			return Err(classify_failure(status, &bytes));
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
		let parsed: TokenEndpointResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| AuthRefreshError::MalformedResponse {
				source,
				status: Some(status),
			})?;

		if parsed.expires_in <= 0 {
			return Err(AuthRefreshError::Endpoint {
				message: "expires_in must be positive".into(),
				status: Some(status),
			});
		}

		let scope = match parsed.scope.as_deref() {
			Some(raw) => raw.parse().map_err(|e| AuthRefreshError::Endpoint {
				message: format!("unparseable scope field: {e}"),
				status: Some(status),
			})?,
			None => credential.scope.clone(),
		};
		let mut builder = Credential::builder(credential.user.clone(), scope)
			.access_token(parsed.access_token)
			.issued_now()
			.expires_in(Duration::seconds(parsed.expires_in));

		// Google omits the refresh token from rotation responses; keep the one we hold.
		builder = builder.refresh_token(parsed.refresh_token.unwrap_or(refresh_token));

		builder.build().map_err(|e| AuthRefreshError::Endpoint {
			message: format!("refreshed credential is invalid: {e}"),
			status: Some(status),
		})
	}
}
#[cfg(feature = "reqwest")]
impl TokenRefresher for HttpTokenRefresher {
	fn refresh<'a>(&'a self, credential: &'a Credential) -> RefreshFuture<'a> {
		Box::pin(self.refresh_credential(credential))
	}
}
#[cfg(feature = "reqwest")]
impl Debug for HttpTokenRefresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpTokenRefresher")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("timeout", &self.timeout)
			.finish()
	}
}

#[cfg(feature = "reqwest")]
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	expires_in: i64,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	scope: Option<String>,
}

#[cfg(feature = "reqwest")]
#[derive(Debug, Default, Deserialize)]
struct TokenEndpointErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(e: ReqwestError) -> AuthRefreshError {
	if e.is_timeout() {
		AuthRefreshError::Timeout
	} else {
		AuthRefreshError::transport(e)
	}
}

#[cfg(feature = "reqwest")]
fn classify_failure(status: u16, bytes: &[u8]) -> AuthRefreshError {
	let body: TokenEndpointErrorBody = serde_json::from_slice(bytes).unwrap_or_default();
	let code = body.error.unwrap_or_else(|| "unknown_error".into());
	let reason = match body.error_description {
		Some(description) => format!("{code}: {description}"),
		None => code.clone(),
	};

	// invalid_grant covers revoked, expired, and malformed refresh tokens.
	if matches!(code.as_str(), "invalid_grant" | "unauthorized_client") {
		AuthRefreshError::Rejected { reason }
	} else {
		AuthRefreshError::Endpoint { message: reason, status: Some(status) }
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;

	#[test]
	fn revoked_refresh_tokens_classify_as_rejected() {
		let body = br#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#;
		let err = classify_failure(400, body);

		assert!(matches!(err, AuthRefreshError::Rejected { .. }));
		assert!(err.to_string().contains("Token has been revoked."));
	}

	#[test]
	fn other_failures_classify_as_endpoint_errors() {
		assert!(matches!(
			classify_failure(500, b"not json at all"),
			AuthRefreshError::Endpoint { status: Some(500), .. }
		));
		assert!(matches!(
			classify_failure(429, br#"{"error":"rate_limit_exceeded"}"#),
			AuthRefreshError::Endpoint { status: Some(429), .. }
		));
	}
}
