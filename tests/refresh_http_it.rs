#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use service_broker::{
	_preludet::*,
	auth::Credential,
	error::AuthRefreshError,
	refresh::{HttpTokenRefresher, TokenRefresher},
};

fn make_refresher(server: &MockServer) -> HttpTokenRefresher {
	let endpoint =
		Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully.");

	HttpTokenRefresher::new(endpoint, "client-id").with_client_secret("client-secret")
}

#[tokio::test]
async fn refresh_rotates_tokens() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let refresher = make_refresher(&server);
	let stale = expired_credential(&test_user(), &test_scope());
	let refreshed =
		refresher.refresh(&stale).await.expect("Refresh token rotation should succeed.");

	mock.assert_async().await;

	assert_eq!(refreshed.access_token.expose(), "access-new");
	assert_eq!(
		refreshed.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-new"),
	);
	assert_eq!(refreshed.scope, stale.scope);
	assert!(!refreshed.is_expired_at(OffsetDateTime::now_utc()));
}

#[tokio::test]
async fn refresh_keeps_the_held_token_when_rotation_is_omitted() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-new\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let refresher = make_refresher(&server);
	let stale = expired_credential(&test_user(), &test_scope());
	let refreshed = refresher.refresh(&stale).await.expect("Refresh should succeed.");

	assert_eq!(
		refreshed.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-stale"),
	);
}

#[tokio::test]
async fn invalid_grant_reports_rejection() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"Token has been revoked.\"}",
			);
		})
		.await;
	let refresher = make_refresher(&server);
	let stale = expired_credential(&test_user(), &test_scope());
	let err = refresher.refresh(&stale).await.expect_err("A revoked token must not refresh.");

	assert!(matches!(err, AuthRefreshError::Rejected { .. }));
	assert!(err.to_string().contains("Token has been revoked."));
}

#[tokio::test]
async fn server_failures_report_endpoint_errors() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503).body("upstream maintenance");
		})
		.await;
	let refresher = make_refresher(&server);
	let stale = expired_credential(&test_user(), &test_scope());
	let err = refresher.refresh(&stale).await.expect_err("A 503 must not refresh.");

	assert!(matches!(err, AuthRefreshError::Endpoint { status: Some(503), .. }));
}

#[tokio::test]
async fn malformed_success_bodies_report_parse_failures() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":42}");
		})
		.await;
	let refresher = make_refresher(&server);
	let stale = expired_credential(&test_user(), &test_scope());
	let err = refresher.refresh(&stale).await.expect_err("A malformed body must not refresh.");

	assert!(matches!(err, AuthRefreshError::MalformedResponse { status: Some(200), .. }));
}

#[tokio::test]
async fn credentials_without_refresh_tokens_fail_fast() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200);
		})
		.await;
	let refresher = make_refresher(&server);
	let credential = Credential::builder(test_user(), test_scope())
		.access_token("access-only")
		.issued_now()
		.expires_in(Duration::hours(1))
		.build()
		.expect("Credential fixture should build successfully.");
	let err = refresher
		.refresh(&credential)
		.await
		.expect_err("A credential without a refresh token cannot be exchanged.");

	assert!(matches!(err, AuthRefreshError::MissingRefreshToken));
	assert_eq!(mock.hits_async().await, 0, "The endpoint is never called.");
}
