// std
use std::{io, time::Duration as StdDuration};
// crates.io
use httpmock::prelude::*;
use tokio::sync::Notify;
// self
use paygate_core::{
	_preludet::*,
	auth::{Credential, ProductScope, ProviderId},
	cache::MemoryTokenCache,
	error::AuthenticationError,
	http::{
		GatewayHttpClient, HttpFuture, HttpRequest, NetworkTransportErrorMapper,
		ReqwestTransportErrorMapper,
	},
	provider::{
		ClientAuthMethod, DefaultProviderStrategy, HeaderPair, ProductProfile, ProviderDescriptor,
	},
	token::{ReqwestTokenProvider, TokenProvider},
};

const BASIC_API_USER: &str = "Basic YXBpLXVzZXI6YXBpLWtleQ==";

fn product(name: &str) -> ProductScope {
	ProductScope::new(name).expect("Product fixture should be valid.")
}

fn descriptor_for(server: &MockServer, method: ClientAuthMethod) -> ProviderDescriptor {
	let base = Url::parse(&server.base_url()).expect("Mock base URL should parse.");
	let token = Url::parse(&server.url("/token")).expect("Mock token endpoint should parse.");

	ProviderDescriptor::builder(ProviderId::new("mock").expect("Provider id should be valid."))
		.base_url(base)
		.token_endpoint(token)
		.client_auth_method(method)
		.environment("X-Target-Environment", "sandbox")
		.build()
		.expect("Mock descriptor should build.")
}

fn reqwest_provider(descriptor: ProviderDescriptor, credential: Credential) -> ReqwestTokenProvider {
	TokenProvider::with_http_client(
		Arc::new(MemoryTokenCache::new()),
		descriptor,
		Arc::new(DefaultProviderStrategy),
		credential,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
}

#[tokio::test]
async fn concurrent_callers_share_one_exchange() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("authorization", BASIC_API_USER)
				.header("x-target-environment", "sandbox")
				.body("grant_type=client_credentials&scope=payments");
			then.status(200)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(200))
				.body(r#"{"access_token":"shared-token","token_type":"Bearer","expires_in":3600}"#);
		})
		.await;
	let provider = reqwest_provider(
		descriptor_for(&server, ClientAuthMethod::ClientSecretBasic),
		Credential::new("api-user", "api-key").with_scope("payments"),
	);
	let collection = product("collection");
	let results = futures::future::join_all((0..8).map(|_| provider.get_token(&collection))).await;

	for result in results {
		let token = result.expect("Every caller should receive the shared token.");

		assert_eq!(token.value.expose(), "shared-token");
	}

	mock.assert_calls_async(1).await;

	assert_eq!(provider.metrics.refreshes(), 1);
	assert_eq!(provider.metrics.cache_hits(), 7);

	let again = provider.get_token(&collection).await.expect("Cached token should be served.");

	assert_eq!(again.value.expose(), "shared-token");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn client_secret_post_sends_credentials_in_the_form() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body("client_id=api-user&client_secret=api-key&grant_type=client_credentials");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"accessToken":"post-token","expiresIn":"600"}"#);
		})
		.await;
	let provider = reqwest_provider(
		descriptor_for(&server, ClientAuthMethod::ClientSecretPost),
		Credential::new("api-user", "api-key"),
	);
	let token =
		provider.get_token(&product("disbursement")).await.expect("Token exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(token.value.expose(), "post-token");
	assert_eq!(token.expires_at - token.issued_at, Duration::seconds(600));
}

#[tokio::test]
async fn rejections_surface_the_envelope_and_are_not_cached() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(401)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_client","error_description":"Bad secret"}"#);
		})
		.await;
	let provider = reqwest_provider(
		descriptor_for(&server, ClientAuthMethod::ClientSecretBasic),
		Credential::new("api-user", "wrong-key"),
	);
	let collection = product("collection");

	for _ in 0..2 {
		let err = provider
			.get_token(&collection)
			.await
			.expect_err("Rejected credentials must fail the exchange.");

		match err {
			Error::Authentication(AuthenticationError::Rejected { http_status, code, message }) => {
				assert_eq!(http_status, 401);
				assert_eq!(code.as_deref(), Some("invalid_client"));
				assert_eq!(message.as_deref(), Some("Bad secret"));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	mock.assert_calls_async(2).await;

	assert_eq!(provider.metrics.failures(), 2);
	assert_eq!(provider.metrics.cache_hits(), 0);
}

#[tokio::test]
async fn product_profiles_route_to_their_own_endpoint_and_headers() {
	let server = MockServer::start_async().await;
	let collection_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/collection/token/")
				.header("ocp-apim-subscription-key", "collection-key");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"collection-token","expires_in":3600}"#);
		})
		.await;
	let default_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"default-token","expires_in":3600}"#);
		})
		.await;
	let mut descriptor = descriptor_for(&server, ClientAuthMethod::ClientSecretBasic);

	descriptor.products.insert(
		product("collection"),
		ProductProfile {
			token_endpoint: Some(
				Url::parse(&server.url("/collection/token/")).expect("Product endpoint should parse."),
			),
			headers: vec![HeaderPair::new("Ocp-Apim-Subscription-Key", "collection-key")],
		},
	);

	let provider = reqwest_provider(descriptor, Credential::new("api-user", "api-key"));
	let collection =
		provider.get_token(&product("collection")).await.expect("Collection token should issue.");
	let remittance =
		provider.get_token(&product("remittance")).await.expect("Remittance token should issue.");

	assert_eq!(collection.value.expose(), "collection-token");
	assert_eq!(remittance.value.expose(), "default-token");

	collection_mock.assert_calls_async(1).await;
	default_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn unreachable_identity_endpoints_map_to_transport_errors() {
	let descriptor = test_descriptor("http://127.0.0.1:9");
	let provider = reqwest_provider(descriptor, Credential::new("api-user", "api-key"))
		.with_timeout(Duration::seconds(2));
	let err = provider
		.get_token(&product("collection"))
		.await
		.expect_err("Closed ports must fail the exchange.");

	assert!(err.is_transport(), "Unexpected error: {err:?}");
	assert_eq!(provider.metrics.failures(), 1);
}

/// Transport that parks every exchange for the gated path until released.
struct GatedHttpClient {
	gated_path: &'static str,
	gate: Arc<Notify>,
}
impl GatewayHttpClient for GatedHttpClient {
	type TransportError = io::Error;

	fn execute(&self, request: HttpRequest, _timeout: Duration) -> HttpFuture<'_, io::Error> {
		let path = request.uri().path().to_owned();
		let gate = (path == self.gated_path).then(|| self.gate.clone());

		Box::pin(async move {
			if let Some(gate) = gate {
				gate.notified().await;
			}

			let product = path.trim_start_matches('/').split('/').next().unwrap_or_default();

			json_response(200, &format!(r#"{{"access_token":"{product}-token","expires_in":3600}}"#))
		})
	}
}

#[tokio::test]
async fn refreshes_for_different_products_do_not_block_each_other() {
	let gate = Arc::new(Notify::new());
	let mut descriptor = test_descriptor("https://gateway.test");

	for name in ["collection", "disbursement"] {
		descriptor.products.insert(
			product(name),
			ProductProfile {
				token_endpoint: Some(
					Url::parse(&format!("https://gateway.test/{name}/token"))
						.expect("Product endpoint should parse."),
				),
				headers: Vec::new(),
			},
		);
	}

	let provider: TokenProvider<GatedHttpClient, NetworkTransportErrorMapper> =
		TokenProvider::with_http_client(
			Arc::new(MemoryTokenCache::new()),
			descriptor,
			Arc::new(DefaultProviderStrategy),
			Credential::new("api-user", "api-key"),
			GatedHttpClient { gated_path: "/collection/token", gate: gate.clone() },
			NetworkTransportErrorMapper,
		);
	let collection = product("collection");
	let disbursement = product("disbursement");
	let parked = provider.get_token(&collection);
	let unparked = async {
		let token = provider.get_token(&disbursement).await;

		gate.notify_one();

		token
	};
	let (parked, unparked) =
		tokio::time::timeout(StdDuration::from_secs(5), async { tokio::join!(parked, unparked) })
			.await
			.expect("A parked refresh must not hold up other products.");

	assert_eq!(parked.expect("Collection token should issue.").value.expose(), "collection-token");
	assert_eq!(
		unparked.expect("Disbursement token should issue.").value.expose(),
		"disbursement-token"
	);
	assert_eq!(provider.metrics.refreshes(), 2);
}
