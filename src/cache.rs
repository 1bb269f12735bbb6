//! TTL-bound, process-local cache of authenticated service handles.
//!
//! The cache maps a (user, service, version, scope-set) key to a previously constructed
//! client handle. Entries expire after a fixed TTL and are replaced, never mutated; a
//! per-key singleflight guard ensures concurrent misses for the same key execute one
//! builder while every waiter reuses the winner's entry. The map itself is never
//! persisted; handles die with the process.

// self
use crate::{
	_prelude::*,
	auth::{ApiVersion, ScopeSet, ServiceName, UserId},
};

/// Unique key identifying a cached service handle.
///
/// Scope sets participate through their fingerprint, so requesting the same logical scopes
/// in any order resolves to the same entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	/// User the handle was authenticated for.
	pub user: UserId,
	/// Service the handle talks to.
	pub service: ServiceName,
	/// API version the handle was constructed against.
	pub version: ApiVersion,
	/// Fingerprint of the normalized scope set.
	pub scope_fingerprint: String,
}
impl CacheKey {
	/// Builds a key from the request components, normalizing scopes via their fingerprint.
	pub fn new(user: &UserId, service: &ServiceName, version: &ApiVersion, scope: &ScopeSet) -> Self {
		Self {
			user: user.clone(),
			service: service.clone(),
			version: version.clone(),
			scope_fingerprint: scope.fingerprint(),
		}
	}
}

/// Cached handle plus the bookkeeping needed for TTL checks.
struct CacheEntry<H> {
	handle: Arc<H>,
	created_at: OffsetDateTime,
	ttl: Duration,
}
impl<H> CacheEntry<H> {
	fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant - self.created_at < self.ttl
	}
}

/// Concurrency-safe cache of authenticated service handles with TTL-based expiry.
pub struct ServiceCache<H> {
	entries: Arc<RwLock<HashMap<CacheKey, CacheEntry<H>>>>,
	build_guards: Arc<Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>>,
	ttl: Duration,
}
impl<H> ServiceCache<H> {
	/// Default entry lifetime.
	pub const DEFAULT_TTL: Duration = Duration::minutes(30);

	/// Creates an empty cache with the default TTL.
	pub fn new() -> Self {
		Self::with_ttl(Self::DEFAULT_TTL)
	}

	/// Creates an empty cache whose entries live for the provided duration.
	pub fn with_ttl(ttl: Duration) -> Self {
		Self { entries: Default::default(), build_guards: Default::default(), ttl }
	}

	/// Entry lifetime applied to newly stored handles.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the cached handle for `key`, invoking `builder` on miss or expiry.
	///
	/// The builder runs under a per-key guard: concurrent misses for the same key execute it
	/// once and every waiter observes the stored result. Builder failure leaves the cache
	/// state for `key` unchanged and propagates to the caller; nothing is written until the
	/// builder future completes successfully, so a cancelled builder leaks no partial entry.
	pub async fn get_or_create<B, Fut>(&self, key: CacheKey, builder: B) -> Result<Arc<H>>
	where
		B: FnOnce() -> Fut,
		Fut: Future<Output = Result<H>>,
	{
		if let Some(handle) = self.lookup_valid(&key, OffsetDateTime::now_utc()) {
			return Ok(handle);
		}

		let guard = self.build_guard(&key);
		let _build = guard.lock().await;

		// Another caller may have populated the entry while this one waited on the guard.
		if let Some(handle) = self.lookup_valid(&key, OffsetDateTime::now_utc()) {
			return Ok(handle);
		}

		let handle = Arc::new(builder().await?);
		let entry = CacheEntry {
			handle: handle.clone(),
			created_at: OffsetDateTime::now_utc(),
			ttl: self.ttl,
		};

		self.entries.write().insert(key, entry);

		Ok(handle)
	}

	/// Removes the entry for `key` unconditionally; idempotent if absent.
	pub fn invalidate(&self, key: &CacheKey) {
		self.entries.write().remove(key);
	}

	/// Drops every expired entry, returning how many were removed.
	pub fn purge_expired(&self) -> usize {
		let now = OffsetDateTime::now_utc();
		let mut guard = self.entries.write();
		let before = guard.len();

		guard.retain(|_, entry| entry.is_valid_at(now));

		before - guard.len()
	}

	/// Number of entries currently stored, including any not yet purged after expiry.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` if no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Removes every entry.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	fn lookup_valid(&self, key: &CacheKey, instant: OffsetDateTime) -> Option<Arc<H>> {
		let guard = self.entries.read();
		let entry = guard.get(key)?;

		entry.is_valid_at(instant).then(|| entry.handle.clone())
	}

	fn build_guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.build_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl<H> Clone for ServiceCache<H> {
	fn clone(&self) -> Self {
		Self {
			entries: self.entries.clone(),
			build_guards: self.build_guards.clone(),
			ttl: self.ttl,
		}
	}
}
impl<H> Default for ServiceCache<H> {
	fn default() -> Self {
		Self::new()
	}
}
impl<H> Debug for ServiceCache<H> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceCache")
			.field("entries", &self.entries.read().len())
			.field("ttl", &self.ttl)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::ServiceBuildError;

	fn key_fixture(scope: &ScopeSet) -> CacheKey {
		let user = UserId::new("user@example.com").expect("User fixture should be valid.");
		let service = ServiceName::new("drive").expect("Service fixture should be valid.");
		let version = ApiVersion::new("v3").expect("Version fixture should be valid.");

		CacheKey::new(&user, &service, &version, scope)
	}

	#[tokio::test]
	async fn valid_entries_are_reused_without_rebuilding() {
		let cache = ServiceCache::new();
		let scope = ScopeSet::new(["drive.readonly"]).expect("Scope fixture should be valid.");
		let key = key_fixture(&scope);
		let first = cache
			.get_or_create(key.clone(), || async { Ok("handle-1") })
			.await
			.expect("First resolution should build and store a handle.");
		let second = cache
			.get_or_create(key, || async { panic!("builder must not run on a valid entry") })
			.await
			.expect("Second resolution should reuse the cached handle.");

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(cache.len(), 1);
	}

	#[tokio::test]
	async fn scope_order_resolves_to_the_same_entry() {
		let forward =
			ScopeSet::new(["drive.file", "drive.readonly"]).expect("Scope fixture should be valid.");
		let reversed =
			ScopeSet::new(["drive.readonly", "drive.file"]).expect("Scope fixture should be valid.");

		assert_eq!(key_fixture(&forward), key_fixture(&reversed));
	}

	#[tokio::test]
	async fn zero_ttl_treats_every_lookup_as_a_miss() {
		let cache = ServiceCache::with_ttl(Duration::ZERO);
		let scope = ScopeSet::new(["tasks"]).expect("Scope fixture should be valid.");
		let key = key_fixture(&scope);

		for round in 0..2 {
			let handle = cache
				.get_or_create(key.clone(), || async move { Ok(round) })
				.await
				.expect("Expired entries should be rebuilt.");

			assert_eq!(*handle, round);
		}

		assert_eq!(cache.purge_expired(), 1);
		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn builder_failure_leaves_state_unchanged() {
		let cache: ServiceCache<&str> = ServiceCache::new();
		let scope = ScopeSet::new(["gmail.readonly"]).expect("Scope fixture should be valid.");
		let key = key_fixture(&scope);
		let err = cache
			.get_or_create(key.clone(), || async {
				Err(ServiceBuildError::new("gmail", "v1", "connection reset").into())
			})
			.await
			.expect_err("Builder failure must propagate.");

		assert!(matches!(err, Error::Build(_)));
		assert!(cache.is_empty());

		let handle = cache
			.get_or_create(key, || async { Ok("recovered") })
			.await
			.expect("A later resolution should succeed from scratch.");

		assert_eq!(*handle, "recovered");
	}

	#[tokio::test]
	async fn invalidate_is_idempotent_and_forces_rebuild() {
		let cache = ServiceCache::new();
		let scope = ScopeSet::new(["calendar"]).expect("Scope fixture should be valid.");
		let key = key_fixture(&scope);

		cache.invalidate(&key);

		let _ = cache
			.get_or_create(key.clone(), || async { Ok("first") })
			.await
			.expect("Initial resolution should succeed.");

		cache.invalidate(&key);
		cache.invalidate(&key);

		let rebuilt = cache
			.get_or_create(key, || async { Ok("second") })
			.await
			.expect("Post-invalidation resolution should rebuild.");

		assert_eq!(*rebuilt, "second");
	}
}
