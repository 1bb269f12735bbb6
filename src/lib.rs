//! Authenticated-service cache and resolver for Google Workspace tool servers - per-user
//! credential refresh, TTL-bound client handle caching, and invalidate-and-retry auth recovery
//! in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod error;
pub mod obs;
pub mod refresh;
pub mod resolver;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience fixtures and test doubles for integration tests; enabled via `cfg(test)` or
	//! the `test` crate feature.

	// std
	use std::sync::atomic::{AtomicU64, Ordering};

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{ApiVersion, Credential, ScopeSet, ServiceName, UserId},
		error::AuthRefreshError,
		refresh::{RefreshFuture, TokenRefresher},
		resolver::{BuildFuture, ClientBuilder},
	};

	/// Builds the user identifier shared by most test fixtures.
	pub fn test_user() -> UserId {
		UserId::new("user@example.com").expect("Test user identifier should be valid.")
	}

	/// Builds the service name shared by most test fixtures.
	pub fn test_service() -> ServiceName {
		ServiceName::new("drive").expect("Test service name should be valid.")
	}

	/// Builds the API version shared by most test fixtures.
	pub fn test_version() -> ApiVersion {
		ApiVersion::new("v3").expect("Test API version should be valid.")
	}

	/// Builds the scope set shared by most test fixtures.
	pub fn test_scope() -> ScopeSet {
		ScopeSet::new(["drive.file", "drive.readonly"]).expect("Test scope set should be valid.")
	}

	/// Credential whose access token remains valid for another hour.
	pub fn active_credential(user: &UserId, scope: &ScopeSet) -> Credential {
		Credential::builder(user.clone(), scope.clone())
			.access_token("access-active")
			.refresh_token("refresh-active")
			.issued_now()
			.expires_in(Duration::hours(1))
			.build()
			.expect("Active credential fixture should build successfully.")
	}

	/// Credential whose access token expired five minutes ago.
	pub fn expired_credential(user: &UserId, scope: &ScopeSet) -> Credential {
		let issued = OffsetDateTime::now_utc() - Duration::hours(1);

		Credential::builder(user.clone(), scope.clone())
			.access_token("access-stale")
			.refresh_token("refresh-stale")
			.issued_at(issued)
			.expires_at(issued + Duration::minutes(55))
			.build()
			.expect("Expired credential fixture should build successfully.")
	}

	/// Opaque service handle produced by [`CountingBuilder`].
	#[derive(Clone, Debug)]
	pub struct FakeHandle {
		/// Access token the handle was bound to at construction time.
		pub access_token: String,
		/// Service the handle claims to talk to.
		pub service: String,
	}

	/// [`ClientBuilder`] double that counts invocations and binds handles to the credential it
	/// saw.
	#[derive(Debug, Default)]
	pub struct CountingBuilder {
		builds: AtomicU64,
	}
	impl CountingBuilder {
		/// Number of handles constructed so far.
		pub fn builds(&self) -> u64 {
			self.builds.load(Ordering::SeqCst)
		}
	}
	impl ClientBuilder for CountingBuilder {
		type Handle = FakeHandle;

		fn build<'a>(
			&'a self,
			credential: &'a Credential,
			service: &'a ServiceName,
			_version: &'a ApiVersion,
			_scope: &'a ScopeSet,
		) -> BuildFuture<'a, Self::Handle> {
			self.builds.fetch_add(1, Ordering::SeqCst);

			let handle = FakeHandle {
				access_token: credential.access_token.expose().to_owned(),
				service: service.to_string(),
			};

			Box::pin(async move { Ok(handle) })
		}
	}

	/// [`TokenRefresher`] double that mints one-hour credentials and counts calls.
	#[derive(Debug, Default)]
	pub struct RenewingRefresher {
		refreshes: AtomicU64,
	}
	impl RenewingRefresher {
		/// Number of refresh calls performed so far.
		pub fn refreshes(&self) -> u64 {
			self.refreshes.load(Ordering::SeqCst)
		}
	}
	impl TokenRefresher for RenewingRefresher {
		fn refresh<'a>(&'a self, credential: &'a Credential) -> RefreshFuture<'a> {
			let serial = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
			let mut builder = Credential::builder(credential.user.clone(), credential.scope.clone())
				.access_token(format!("access-renewed-{serial}"))
				.issued_now()
				.expires_in(Duration::hours(1));

			if let Some(refresh) = credential.refresh_token.as_ref() {
				builder = builder.refresh_token(refresh.expose());
			}

			let renewed =
				builder.build().expect("Renewed credential fixture should build successfully.");

			Box::pin(async move { Ok(renewed) })
		}
	}

	/// [`TokenRefresher`] double that always reports a revoked refresh token.
	#[derive(Clone, Copy, Debug, Default)]
	pub struct RejectingRefresher;
	impl TokenRefresher for RejectingRefresher {
		fn refresh<'a>(&'a self, _credential: &'a Credential) -> RefreshFuture<'a> {
			Box::pin(async { Err(AuthRefreshError::Rejected { reason: "invalid_grant".into() }) })
		}
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
