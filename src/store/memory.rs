//! Thread-safe in-memory [`CredentialStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Credential, UserId},
	store::{CredentialStore, StoreFuture},
};

type CredentialMap = Arc<RwLock<HashMap<UserId, Credential>>>;

/// Storage backend that keeps credentials in-process; nothing survives a restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(CredentialMap);
impl MemoryStore {
	/// Number of users with a stored credential.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if no credentials are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl CredentialStore for MemoryStore {
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(credential.user.clone(), credential);

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<Credential>> {
		let map = self.0.clone();
		let user = user.to_owned();

		Box::pin(async move { Ok(map.read().get(&user).cloned()) })
	}

	fn remove<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<Credential>> {
		let map = self.0.clone();
		let user = user.to_owned();

		Box::pin(async move { Ok(map.write().remove(&user)) })
	}
}
