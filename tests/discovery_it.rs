#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use session_token_broker::{_preludet::*, error::DiscoveryError};

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

fn broker_for(server: &MockServer) -> ReqwestTestBroker {
	let config = test_config(&server.url(DISCOVERY_PATH), "client-discovery", None);

	build_reqwest_test_broker(config).0
}

#[tokio::test]
async fn discovery_is_fetched_once_and_memoized() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"issuer\":\"https://auth.example\",\"token_endpoint\":\"https://auth.example/oauth2/token\"}",
			);
		})
		.await;
	let broker = broker_for(&server);

	for _ in 0..5 {
		let endpoint = broker.resolver.token_endpoint().await?;

		assert_eq!(endpoint.as_str(), "https://auth.example/oauth2/token");
	}

	let well_known = broker.resolver.well_known().await?;

	assert_eq!(well_known.issuer.as_deref(), Some("https://auth.example"));
	assert!(broker.resolver.is_resolved());

	mock.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn concurrent_first_calls_share_one_fetch() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(100))
				.body("{\"token_endpoint\":\"https://auth.example/oauth2/token\"}");
		})
		.await;
	let broker = broker_for(&server);
	let (a, b, c) = tokio::join!(
		broker.resolver.token_endpoint(),
		broker.resolver.token_endpoint(),
		broker.resolver.token_endpoint(),
	);

	for endpoint in [a, b, c] {
		assert_eq!(
			endpoint.expect("Every caller should see the endpoint.").as_str(),
			"https://auth.example/oauth2/token"
		);
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_success_status_is_reported_and_not_cached() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let failing = server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(503);
		})
		.await;
	let broker = broker_for(&server);
	let err = broker.resolver.token_endpoint().await.expect_err("A 503 must not resolve.");

	assert!(matches!(err, Error::Discovery(DiscoveryError::Status { status: 503 })));
	assert!(!broker.resolver.is_resolved());

	failing.delete_async().await;

	let healthy = server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token_endpoint\":\"https://auth.example/oauth2/token\"}");
		})
		.await;
	let endpoint = broker.resolver.token_endpoint().await?;

	assert_eq!(endpoint.as_str(), "https://auth.example/oauth2/token");

	healthy.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn document_without_token_endpoint_is_rejected() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path(DISCOVERY_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"issuer\":\"https://auth.example\"}");
		})
		.await;

	let err = broker_for(&server)
		.resolver
		.token_endpoint()
		.await
		.expect_err("A document without token_endpoint is unusable.");

	assert!(matches!(err, Error::Discovery(DiscoveryError::MissingTokenEndpoint)));
}

#[tokio::test]
async fn unreachable_discovery_is_a_transport_failure() {
	let config = test_config(
		"http://127.0.0.1:9/.well-known/openid-configuration",
		"client-discovery",
		None,
	);
	let (broker, _) = build_reqwest_test_broker(config);
	let err = broker.resolver.token_endpoint().await.expect_err("Nothing listens on port 9.");

	assert!(err.is_retryable(), "Unexpected error: {err:?}");
}
