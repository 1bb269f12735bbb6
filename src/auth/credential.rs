//! Per-user OAuth credential records with redacted secrets and lifecycle helpers.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, UserId},
};

/// Redacted secret wrapper keeping token material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSecret(String);
impl AuthSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for AuthSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for AuthSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AuthSecret").field(&"<redacted>").finish()
	}
}
impl Display for AuthSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Lifecycle status of a credential's access token at some instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Access token is not yet valid because the issued-at instant is in the future.
	Pending,
	/// Access token is currently usable.
	Active,
	/// Access token exceeded its expiry instant and needs a refresh.
	Expired,
	/// Credential was revoked (locally after a fatal refresh failure, or upstream).
	Revoked,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// One user's OAuth state: access token, optional refresh token, expiry, and granted scopes.
///
/// Credentials are replaced, never mutated in place, when the token refresher rotates them;
/// the only in-place transition is [`revoke`](Self::revoke) after a fatal refresh failure.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// User this credential belongs to.
	pub user: UserId,
	/// Scopes granted to the access token.
	pub scope: ScopeSet,
	/// Access token secret.
	pub access_token: AuthSecret,
	/// Refresh token secret, if one was granted.
	pub refresh_token: Option<AuthSecret>,
	/// Instant the access token was issued.
	pub issued_at: OffsetDateTime,
	/// Instant the access token expires.
	pub expires_at: OffsetDateTime,
	/// Revocation instant, if the credential has been revoked.
	pub revoked_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Returns a builder for the provided user and scope set.
	pub fn builder(user: UserId, scope: ScopeSet) -> CredentialBuilder {
		CredentialBuilder::new(user, scope)
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		if self.revoked_at.is_some() {
			return CredentialStatus::Revoked;
		}
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}
		if instant < self.issued_at {
			return CredentialStatus::Pending;
		}

		CredentialStatus::Active
	}

	/// Returns `true` if the access token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Expired)
	}

	/// Returns `true` if the credential has been revoked.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Returns `true` if the access token expires within `window` of `instant`.
	///
	/// Used to refresh slightly early so a freshly built handle does not start life with a
	/// token about to lapse.
	pub fn expires_within(&self, instant: OffsetDateTime, window: Duration) -> bool {
		self.expires_at - instant <= window
	}

	/// Marks the credential as revoked.
	pub fn revoke(&mut self, instant: OffsetDateTime) {
		self.revoked_at = Some(instant);
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("user", &self.user)
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("revoked_at", &self.revoked_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	user: UserId,
	scope: ScopeSet,
	access_token: Option<AuthSecret>,
	refresh_token: Option<AuthSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(user: UserId, scope: ScopeSet) -> Self {
		Self {
			user,
			scope,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(AuthSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(AuthSecret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
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
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		Ok(Credential {
			user: self.user,
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			revoked_at: None,
		})
	}
}
