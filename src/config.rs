//! Declarative gateway configuration.
//!
//! A [`GatewayConfig`] captures everything needed to stand up one provider client: identity
//! and secret, endpoints, environment and per-product headers, deadlines, the optional signing
//! key, and the default polling policy. Building validates everything eagerly, including the
//! signing key, so a bad deployment fails at startup rather than on the first signed call.

// self
use crate::{
	_prelude::*,
	auth::{Credential, ProductScope, ProviderId, Secret},
	cache::TokenCache,
	error::{ConfigError, SigningError},
	gateway::{CallTimeouts, GatewayExecutor},
	http::{GatewayHttpClient, TransportErrorMapper},
	poll::RetryPolicy,
	provider::{
		ClientAuthMethod, HeaderPair, ProductProfile, ProviderDescriptor, ProviderQuirks,
		ProviderStrategy,
	},
	sign::RequestSigner,
	token::TokenProvider,
};
#[cfg(feature = "reqwest")]
use crate::{
	cache::MemoryTokenCache,
	gateway::ReqwestGatewayExecutor,
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	provider::DefaultProviderStrategy,
};

/// Construction-time configuration for one provider client.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
	/// Provider identifier.
	pub provider: ProviderId,
	/// Base URL that request paths are appended to.
	pub base_url: Url,
	/// Default identity endpoint.
	pub token_endpoint: Url,
	/// Client identity.
	pub identity: String,
	/// Client secret.
	pub secret: Secret,
	/// Optional credential scope sent with token requests.
	#[serde(default)]
	pub scope: Option<String>,
	/// Client authentication method for the identity endpoint.
	#[serde(default)]
	pub client_auth_method: ClientAuthMethod,
	/// Environment header.
	#[serde(default)]
	pub environment: Option<HeaderPair>,
	/// Headers sent on every call.
	#[serde(default)]
	pub headers: Vec<HeaderPair>,
	/// Per-product overrides.
	#[serde(default)]
	pub products: BTreeMap<ProductScope, ProductProfile>,
	/// Provider quirks.
	#[serde(default)]
	pub quirks: ProviderQuirks,
	/// Interactive call deadline in seconds.
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
	/// Batch/report call deadline in seconds.
	#[serde(default = "default_batch_timeout_secs")]
	pub batch_timeout_secs: u64,
	/// Optional request-signing key.
	#[serde(default)]
	pub signing: Option<SigningConfig>,
	/// Default polling policy.
	#[serde(default)]
	pub retry: RetryConfig,
}
impl GatewayConfig {
	/// Parses a JSON document, reporting the failing path on error.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(deserializer).map_err(ConfigError::Parse)
	}

	/// Validated provider descriptor.
	pub fn descriptor(&self) -> Result<ProviderDescriptor, ConfigError> {
		let mut builder = ProviderDescriptor::builder(self.provider.clone())
			.base_url(self.base_url.clone())
			.token_endpoint(self.token_endpoint.clone())
			.client_auth_method(self.client_auth_method)
			.quirks(self.quirks.clone());

		if let Some(environment) = self.environment.as_ref() {
			builder = builder.environment(&environment.name, &environment.value);
		}

		for pair in &self.headers {
			builder = builder.header(&pair.name, &pair.value);
		}
		for (product, profile) in &self.products {
			builder = builder.product(product.clone(), profile.clone());
		}

		Ok(builder.build()?)
	}

	/// Client credential.
	pub fn credential(&self) -> Credential {
		Credential {
			identity: self.identity.clone(),
			secret: self.secret.clone(),
			scope: self.scope.clone(),
		}
	}

	/// Per-call deadlines; both must be positive.
	pub fn timeouts(&self) -> Result<CallTimeouts, ConfigError> {
		let seconds = |secs: u64, which| {
			i64::try_from(secs)
				.ok()
				.filter(|secs| *secs > 0)
				.map(Duration::seconds)
				.ok_or(ConfigError::NonPositiveTimeout { which })
		};

		Ok(CallTimeouts {
			interactive: seconds(self.timeout_secs, "interactive")?,
			batch: seconds(self.batch_timeout_secs, "batch")?,
		})
	}

	/// Parses the signing key, if one is configured.
	pub fn signer(&self) -> Result<Option<RequestSigner>, SigningError> {
		self.signing.as_ref().map(SigningConfig::signer).transpose()
	}

	/// Validated default polling policy.
	pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
		self.retry.policy()
	}

	/// Builds an executor over a caller-supplied transport, cache, and strategy.
	pub fn build_with<C, M>(
		&self,
		cache: Arc<dyn TokenCache>,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<GatewayExecutor<C, M>>
	where
		C: ?Sized + GatewayHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let descriptor = self.descriptor()?;
		let timeouts = self.timeouts()?;
		let signer = self.signer()?;

		self.retry_policy()?;

		let tokens = TokenProvider::with_http_client(
			cache,
			descriptor,
			strategy,
			self.credential(),
			http_client,
			mapper,
		)
		.with_timeout(timeouts.interactive);
		let executor = GatewayExecutor::new(tokens).with_timeouts(timeouts);

		Ok(match signer {
			Some(signer) => executor.with_signer(signer),
			None => executor,
		})
	}

	/// Builds a reqwest-backed executor with a fresh in-memory token cache.
	#[cfg(feature = "reqwest")]
	pub fn build(&self) -> Result<ReqwestGatewayExecutor> {
		self.build_with(
			Arc::new(MemoryTokenCache::new()),
			Arc::new(DefaultProviderStrategy),
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
		)
	}
}

/// Signing key configuration, tagged by scheme.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case", deny_unknown_fields)]
pub enum SigningConfig {
	/// HMAC-SHA256 with a shared secret.
	HmacSha256 {
		/// Shared secret.
		secret: Secret,
	},
	/// RSA-SHA256 with a PEM private key.
	RsaSha256 {
		/// PKCS#8 or PKCS#1 PEM private key.
		private_key_pem: Secret,
	},
}
impl SigningConfig {
	/// Parses the key material into a signer.
	pub fn signer(&self) -> Result<RequestSigner, SigningError> {
		match self {
			SigningConfig::HmacSha256 { secret } => RequestSigner::hmac_sha256(secret.expose()),
			SigningConfig::RsaSha256 { private_key_pem } =>
				RequestSigner::rsa_sha256_pem(private_key_pem.expose()),
		}
	}
}

/// Serializable form of [`RetryPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
	/// Pending answers tolerated before timing out.
	pub max_attempts: u32,
	/// First-step delay in milliseconds.
	pub base_delay_ms: u64,
	/// Delay cap in milliseconds.
	pub max_delay_ms: u64,
	/// Jitter fraction in `[0, 1]`.
	pub jitter_fraction: f64,
}
impl RetryConfig {
	/// Validated policy.
	pub fn policy(&self) -> Result<RetryPolicy, ConfigError> {
		let millis = |ms: u64| Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX));

		RetryPolicy::new(
			self.max_attempts,
			millis(self.base_delay_ms),
			millis(self.max_delay_ms),
			self.jitter_fraction,
		)
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		let policy = RetryPolicy::default();
		let millis = |delay: Duration| u64::try_from(delay.whole_milliseconds()).unwrap_or(u64::MAX);

		Self {
			max_attempts: policy.max_attempts(),
			base_delay_ms: millis(policy.base_delay()),
			max_delay_ms: millis(policy.max_delay()),
			jitter_fraction: policy.jitter_fraction(),
		}
	}
}

fn default_timeout_secs() -> u64 {
	30
}

fn default_batch_timeout_secs() -> u64 {
	120
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const MINIMAL: &str = r#"{
		"provider": "momo",
		"base_url": "https://sandbox.momodeveloper.example",
		"token_endpoint": "https://sandbox.momodeveloper.example/collection/token/",
		"identity": "api-user",
		"secret": "api-key"
	}"#;

	fn parse(raw: &str) -> GatewayConfig {
		GatewayConfig::from_json_str(raw).expect("Config should parse.")
	}

	#[test]
	fn minimal_documents_take_defaults() {
		let config = parse(MINIMAL);

		assert_eq!(config.client_auth_method, ClientAuthMethod::ClientSecretBasic);
		assert_eq!(config.timeouts().expect("Timeouts should be valid."), CallTimeouts::default());
		assert_eq!(
			config.retry_policy().expect("Policy should be valid."),
			RetryPolicy::default()
		);
		assert!(config.signer().expect("No signer is configured.").is_none());
		assert_eq!(config.credential().identity, "api-user");
		assert!(!format!("{config:?}").contains("api-key"));
	}

	#[test]
	fn full_documents_build_descriptors_and_signers() {
		let raw = r#"{
			"provider": "momo",
			"base_url": "https://sandbox.momodeveloper.example",
			"token_endpoint": "https://sandbox.momodeveloper.example/token/",
			"identity": "api-user",
			"secret": "api-key",
			"scope": "payments",
			"client_auth_method": "client_secret_post",
			"environment": { "name": "X-Target-Environment", "value": "sandbox" },
			"headers": [{ "name": "X-Client", "value": "paygate" }],
			"products": {
				"collection": {
					"token_endpoint": "https://sandbox.momodeveloper.example/collection/token/",
					"headers": [{ "name": "Ocp-Apim-Subscription-Key", "value": "sub" }]
				}
			},
			"quirks": { "signature_header": "X-Callback-Signature", "default_token_ttl_secs": 900 },
			"timeout_secs": 10,
			"batch_timeout_secs": 300,
			"signing": { "scheme": "hmac_sha256", "secret": "sig" },
			"retry": { "max_attempts": 3, "base_delay_ms": 500 }
		}"#;
		let config = parse(raw);
		let descriptor = config.descriptor().expect("Descriptor should build.");
		let collection = ProductScope::new("collection").expect("Product should be valid.");

		assert_eq!(descriptor.quirks.signature_header, "X-Callback-Signature");
		assert_eq!(descriptor.quirks.reference_header, "X-Reference-Id");
		assert_eq!(descriptor.quirks.default_token_ttl(), Duration::minutes(15));
		assert_eq!(descriptor.headers_for(&collection).count(), 3);
		assert_eq!(
			config.timeouts().expect("Timeouts should be valid."),
			CallTimeouts { interactive: Duration::seconds(10), batch: Duration::seconds(300) }
		);

		let policy = config.retry_policy().expect("Policy should be valid.");

		assert_eq!(policy.max_attempts(), 3);
		assert_eq!(policy.base_delay(), Duration::milliseconds(500));
		assert_eq!(policy.max_delay(), Duration::seconds(30));
		assert!(config.signer().expect("Signer should parse.").is_some());
	}

	#[test]
	fn parse_errors_name_the_failing_path() {
		let err = GatewayConfig::from_json_str(
			&MINIMAL.replace(r#""identity""#, r#""timeout_secs": "soon", "identity""#),
		)
		.expect_err("Config should be rejected.");

		match err {
			ConfigError::Parse(inner) => assert_eq!(inner.path().to_string(), "timeout_secs"),
			other => panic!("Unexpected error: {other:?}"),
		}

		assert!(GatewayConfig::from_json_str(r#"{"provider":"momo","unknown":1}"#).is_err());
	}

	#[test]
	fn invalid_settings_fail_eagerly() {
		let mut config = parse(MINIMAL);

		config.timeout_secs = 0;

		assert!(matches!(
			config.timeouts(),
			Err(ConfigError::NonPositiveTimeout { which: "interactive" })
		));

		let mut config = parse(MINIMAL);

		config.base_url = Url::parse("http://gateway.example.com").expect("URL should parse.");

		assert!(matches!(config.descriptor(), Err(ConfigError::Descriptor(_))));

		let mut config = parse(MINIMAL);

		config.signing = Some(SigningConfig::RsaSha256 { private_key_pem: Secret::new("junk") });

		assert!(matches!(config.signer(), Err(SigningError::MalformedKey { .. })));

		let mut config = parse(MINIMAL);

		config.retry.jitter_fraction = 2.0;

		assert!(matches!(config.retry_policy(), Err(ConfigError::InvalidRetryPolicy { .. })));
	}

	#[test]
	fn rsa_keys_are_loaded_from_pem() {
		let mut config = parse(MINIMAL);

		config.signing = Some(SigningConfig::RsaSha256 {
			private_key_pem: Secret::new(include_str!("../tests/fixtures/rsa_signing_key.pem")),
		});

		let signer = config.signer().expect("Fixture key should parse.").expect("Signer is set.");

		assert_eq!(signer.scheme(), crate::sign::SignatureScheme::RsaSha256);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn build_rejects_bad_keys_before_any_call() {
		let mut config = parse(MINIMAL);

		config.signing = Some(SigningConfig::HmacSha256 { secret: Secret::new("") });

		assert!(matches!(config.build(), Err(Error::Signing(SigningError::MalformedKey { .. }))));

		config.signing = Some(SigningConfig::HmacSha256 { secret: Secret::new("ok") });

		let executor = config.build().expect("Executor should build.");

		assert!(executor.signer.is_some());
		assert_eq!(executor.timeouts, CallTimeouts::default());
	}
}
