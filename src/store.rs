//! Storage contracts and built-in backends for per-user credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credential, UserId},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for per-user OAuth credentials.
///
/// The resolver only ever reads and replaces whole credentials; partial updates are not part
/// of the contract. Backing storage (file, encrypted store, session table) is up to the
/// implementation.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the credential for its user.
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Fetches the credential stored for the user, if present.
	fn fetch<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<Credential>>;

	/// Removes the credential stored for the user, returning it if one existed.
	fn remove<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<Credential>>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unreachable".into() };
		let crate_error: Error = store_error.clone().into();

		assert!(matches!(crate_error, Error::Store(_)));
		assert!(crate_error.to_string().contains("disk unreachable"));

		let source = StdError::source(&crate_error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
