// std
use std::{env, fs, path::PathBuf, process};
// self
use service_broker::{
	_preludet::*,
	auth::Credential,
	store::{CredentialStore, FileStore, MemoryStore},
};

fn temp_path(tag: &str) -> PathBuf {
	let unique = format!(
		"service_broker_{tag}_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}

fn build_credential(access: &str) -> Credential {
	Credential::builder(test_user(), test_scope())
		.access_token(access)
		.refresh_token("refresh-token")
		.issued_now()
		.expires_in(Duration::hours(1))
		.build()
		.expect("Credential fixture should build successfully.")
}

#[tokio::test]
async fn memory_store_replaces_on_save() {
	let store = MemoryStore::default();
	let user = test_user();

	store.save(build_credential("access-1")).await.expect("First save should succeed.");
	store.save(build_credential("access-2")).await.expect("Second save should succeed.");

	assert_eq!(store.len(), 1, "Saving twice for one user replaces, never duplicates.");

	let fetched = store
		.fetch(&user)
		.await
		.expect("Fetch should succeed.")
		.expect("The credential should be present after save.");

	assert_eq!(fetched.access_token.expose(), "access-2");
}

#[tokio::test]
async fn memory_store_remove_returns_the_removed_credential() {
	let store = MemoryStore::default();
	let user = test_user();

	store.save(build_credential("access-1")).await.expect("Save should succeed.");

	let removed = store
		.remove(&user)
		.await
		.expect("Remove should succeed.")
		.expect("Remove should return the stored credential.");

	assert_eq!(removed.access_token.expose(), "access-1");
	assert!(store.is_empty());
	assert!(
		store.remove(&user).await.expect("Removing again should succeed.").is_none(),
		"Removing an absent credential is a no-op.",
	);
}

#[tokio::test]
async fn file_store_persists_removals_across_reopen() {
	let path = temp_path("removal");
	let user = test_user();

	{
		let store = FileStore::open(&path).expect("Opening the file store should succeed.");

		store.save(build_credential("access-1")).await.expect("Save should succeed.");
		store
			.remove(&user)
			.await
			.expect("Remove should succeed.")
			.expect("Remove should return the stored credential.");
	}

	let reopened = FileStore::open(&path).expect("Reopening the file store should succeed.");

	assert!(
		reopened.fetch(&user).await.expect("Fetch should succeed.").is_none(),
		"A removed credential must not resurface after reopen.",
	);

	fs::remove_file(&path).expect("Cleaning up the snapshot should succeed.");
}

#[tokio::test]
async fn file_store_round_trips_secrets_and_scopes() {
	let path = temp_path("roundtrip");
	let credential = build_credential("access-secret");
	let user = credential.user.clone();

	{
		let store = FileStore::open(&path).expect("Opening the file store should succeed.");

		store.save(credential.clone()).await.expect("Save should succeed.");
	}

	let reopened = FileStore::open(&path).expect("Reopening the file store should succeed.");
	let fetched = reopened
		.fetch(&user)
		.await
		.expect("Fetch should succeed.")
		.expect("The credential should survive a reopen.");

	assert_eq!(fetched.access_token.expose(), credential.access_token.expose());
	assert_eq!(
		fetched.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-token"),
	);
	assert_eq!(fetched.scope, credential.scope);
	assert_eq!(fetched.expires_at, credential.expires_at);

	fs::remove_file(&path).expect("Cleaning up the snapshot should succeed.");
}
