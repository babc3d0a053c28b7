//! Submits a request-to-pay against a mock provider, then waits for the provider to confirm it
//! with the bundled reqwest transport, an in-memory token cache, and the status poller.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use paygate_core::{
	auth::{OperationReference, ProductScope},
	config::GatewayConfig,
	gateway::GatewayRequest,
	poll::{AsyncOperationPoller, GatewayStatusSource, JsonStatusQuery},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/collection/token/");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"demo-access","token_type":"Bearer","expires_in":3600}"#);
		})
		.await;
	let submit_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/collection/v1_0/requesttopay");
			then.status(202);
		})
		.await;
	let status_mock = server
		.mock_async(|when, then| {
			when.method(GET).path_includes("/collection/v1_0/requesttopay/");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"status":"SUCCESSFUL","financialTransactionId":"demo-ft-1"}"#);
		})
		.await;
	let config = GatewayConfig::from_json_str(
		&json!({
			"provider": "demo-momo",
			"base_url": server.base_url(),
			"token_endpoint": server.url("/collection/token/"),
			"identity": "demo-user",
			"secret": "demo-key",
			"environment": { "name": "X-Target-Environment", "value": "sandbox" },
			"signing": { "scheme": "hmac_sha256", "secret": "demo-signing-secret" },
			"retry": { "max_attempts": 5, "base_delay_ms": 200, "max_delay_ms": 2000 }
		})
		.to_string(),
	)?;
	let executor = Arc::new(config.build()?);
	let collection = ProductScope::new("collection")?;
	let reference = OperationReference::generate();

	executor
		.execute(
			GatewayRequest::post(collection.clone(), "/collection/v1_0/requesttopay")
				.json(&json!({
					"amount": "100",
					"currency": "EUR",
					"externalId": "order-42",
					"payer": { "partyIdType": "MSISDN", "partyId": "46733123453" }
				}))?
				.reference(reference.clone())
				.signed_body(),
		)
		.await?;

	let query = JsonStatusQuery::new(collection, "/collection/v1_0/requesttopay/{reference}");
	let poller = AsyncOperationPoller::new(GatewayStatusSource::new(executor.clone(), query));
	let report = poller.poll(&reference, &config.retry_policy()?).await?;

	println!(
		"Operation {reference} settled with transaction {}.",
		report.details["financialTransactionId"]
	);

	token_mock.assert_async().await;
	submit_mock.assert_async().await;
	status_mock.assert_async().await;

	Ok(())
}
