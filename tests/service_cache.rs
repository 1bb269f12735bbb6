// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::time::{Duration as TokioDuration, sleep};
// self
use service_broker::{
	_preludet::*,
	auth::ScopeSet,
	cache::{CacheKey, ServiceCache},
};

fn make_key(scope: &ScopeSet) -> CacheKey {
	CacheKey::new(&test_user(), &test_service(), &test_version(), scope)
}

#[tokio::test]
async fn concurrent_misses_build_exactly_once() {
	let cache: ServiceCache<String> = ServiceCache::new();
	let key = make_key(&test_scope());
	let builds = AtomicU64::new(0);
	let build = |tag: &'static str| {
		let key = key.clone();
		let cache = cache.clone();
		let builds = &builds;

		async move {
			cache
				.get_or_create(key, || async {
					builds.fetch_add(1, Ordering::SeqCst);

					// Keep the winner inside the builder long enough for the loser to queue
					// up on the singleflight guard.
					sleep(TokioDuration::from_millis(50)).await;

					Ok(format!("built-by-{tag}"))
				})
				.await
				.expect("Concurrent resolution should succeed.")
		}
	};
	let (first, second) = tokio::join!(build("first"), build("second"));

	assert_eq!(builds.load(Ordering::SeqCst), 1);
	assert!(Arc::ptr_eq(&first, &second), "Both callers should observe the winner's handle.");
	assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn distinct_scope_sets_get_distinct_entries() {
	let cache: ServiceCache<&str> = ServiceCache::new();
	let drive = ScopeSet::new(["drive.readonly"]).expect("Scope fixture should be valid.");
	let gmail = ScopeSet::new(["gmail.readonly"]).expect("Scope fixture should be valid.");
	let drive_handle = cache
		.get_or_create(make_key(&drive), || async { Ok("drive-handle") })
		.await
		.expect("Drive resolution should succeed.");
	let gmail_handle = cache
		.get_or_create(make_key(&gmail), || async { Ok("gmail-handle") })
		.await
		.expect("Gmail resolution should succeed.");

	assert_eq!(*drive_handle, "drive-handle");
	assert_eq!(*gmail_handle, "gmail-handle");
	assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn short_ttl_entries_expire_and_rebuild() {
	let cache = ServiceCache::with_ttl(Duration::milliseconds(20));
	let key = make_key(&test_scope());
	let first = cache
		.get_or_create(key.clone(), || async { Ok(1_u32) })
		.await
		.expect("Initial resolution should succeed.");

	sleep(TokioDuration::from_millis(40)).await;

	let second = cache
		.get_or_create(key, || async { Ok(2_u32) })
		.await
		.expect("Post-expiry resolution should rebuild.");

	assert_eq!(*first, 1);
	assert_eq!(*second, 2);
	assert_eq!(cache.purge_expired(), 0, "The rebuild replaced the expired entry.");
}

#[tokio::test]
async fn clear_empties_the_cache() {
	let cache: ServiceCache<&str> = ServiceCache::new();

	cache
		.get_or_create(make_key(&test_scope()), || async { Ok("handle") })
		.await
		.expect("Resolution should succeed.");

	assert!(!cache.is_empty());

	cache.clear();

	assert!(cache.is_empty());
}
