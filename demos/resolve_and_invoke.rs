//! Demonstrates resolving an authenticated Drive handle, reusing it across calls, and
//! recovering from an upstream auth rejection via the invalidate-and-retry cycle.
//!
//! Run with `cargo run --example resolve_and_invoke --features test`.

// std
use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};
// crates.io
use color_eyre::Result;
// self
use service_broker::{
	_preludet::{CountingBuilder, FakeHandle, RenewingRefresher, expired_credential},
	auth::{ApiVersion, ScopeSet, ServiceName, UserId},
	resolver::{OperationError, ServiceRequest, ServiceResolver},
	store::{CredentialStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let user = UserId::new("demo@example.com")?;
	let scope = ScopeSet::new(["drive.file", "drive.readonly"])?;
	let store = Arc::new(MemoryStore::default());

	// Seed a credential whose access token already lapsed; the first resolution refreshes it.
	store.save(expired_credential(&user, &scope)).await?;

	let resolver = ServiceResolver::new(
		store,
		Arc::new(RenewingRefresher::default()),
		CountingBuilder::default(),
	);
	let request =
		ServiceRequest::new(user, ServiceName::new("drive")?, ApiVersion::new("v3")?, scope);
	let listing = resolver
		.resolve_and_invoke(&request, |handle: Arc<FakeHandle>| async move {
			Ok(format!("listed files for {} with {}", handle.service, handle.access_token))
		})
		.await?;

	println!("first call:  {listing}");

	// The second call reuses the cached handle; fail it once with an auth error to show the
	// resolver evicting the entry and retrying with a freshly built handle.
	let calls = AtomicU64::new(0);
	let recovered = resolver
		.resolve_and_invoke(&request, |handle: Arc<FakeHandle>| {
			let call = calls.fetch_add(1, Ordering::SeqCst);

			async move {
				if call == 0 {
					Err(OperationError::auth_with_status(401, "token no longer accepted"))
				} else {
					Ok(format!("recovered with {}", handle.access_token))
				}
			}
		})
		.await?;

	println!("second call: {recovered}");
	println!(
		"attempts={} successes={} retries={} builds={} refreshes={}",
		resolver.metrics.attempts(),
		resolver.metrics.successes(),
		resolver.metrics.retries(),
		resolver.metrics.builds(),
		resolver.metrics.refreshes(),
	);

	Ok(())
}
