//! Client-credentials token acquisition with per-scope single-flight refresh.
//!
//! [`TokenProvider::get_token`] consults the injected [`TokenCache`] first. On a miss it takes
//! the async guard for that cache key (never a global lock, so products refresh independently),
//! re-checks the cache, and only then calls the identity endpoint. Concurrent callers that miss
//! on the same key queue on the guard and pick up the freshly cached token instead of issuing
//! their own exchange. Failed exchanges are not cached; the next caller retries.

pub mod metrics;

pub use metrics::TokenMetrics;

// crates.io
use http::{
	Method,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{CacheKey, CachedToken, Credential, ProductScope},
	cache::TokenCache,
	error::{AuthenticationError, ConfigError},
	http::{CallSite, GatewayHttpClient, HttpRequest, HttpResponse, TransportErrorMapper},
	obs::{self, OpKind, OpOutcome, OpSpan},
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	provider::DefaultProviderStrategy,
};

#[cfg(feature = "reqwest")]
/// Token provider specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenProvider = TokenProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Acquires and caches bearer tokens for one credential against one provider.
///
/// One provider instance serves every product the credential covers; each product is cached
/// under its own [`CacheKey`] and refreshed under its own guard.
pub struct TokenProvider<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client used for identity-endpoint exchanges.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Cache holding issued tokens.
	pub cache: Arc<dyn TokenCache>,
	/// Provider descriptor that defines endpoints, headers, and quirks.
	pub descriptor: Arc<ProviderDescriptor>,
	/// Strategy responsible for provider-specific request and response handling.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Client credential presented to the identity endpoint.
	pub credential: Credential,
	/// Deadline applied to each identity-endpoint exchange.
	pub timeout: Duration,
	/// Shared counters for cache hits, refreshes, and failures.
	pub metrics: Arc<TokenMetrics>,
	refresh_guards: Arc<Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> TokenProvider<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Deadline applied to token exchanges unless overridden.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates a provider that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		cache: Arc<dyn TokenCache>,
		descriptor: impl Into<Arc<ProviderDescriptor>>,
		strategy: Arc<dyn ProviderStrategy>,
		credential: Credential,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			cache,
			descriptor: descriptor.into(),
			strategy,
			credential,
			timeout: Self::DEFAULT_TIMEOUT,
			metrics: Default::default(),
			refresh_guards: Default::default(),
		}
	}

	/// Overrides the per-exchange deadline.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Cache key under which tokens for `product` are stored.
	pub fn cache_key(&self, product: &ProductScope) -> CacheKey {
		CacheKey::new(&self.descriptor.id, &self.credential, product)
	}

	/// Returns a usable token for `product`, exchanging credentials only when the cache misses.
	pub async fn get_token(&self, product: &ProductScope) -> Result<CachedToken> {
		const KIND: OpKind = OpKind::TokenExchange;

		let key = self.cache_key(product);

		if let Some(token) = self.cached(&key) {
			return Ok(token);
		}

		let guard = self.refresh_guard(&key);
		let _singleflight = guard.lock().await;

		if let Some(token) = self.cached(&key) {
			return Ok(token);
		}

		let span = OpSpan::new(KIND, "get_token");

		self.metrics.record_refresh();
		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.exchange(product)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		let token = result.inspect_err(|_| self.metrics.record_failure())?;

		self.cache.insert(key, token.clone());

		Ok(token)
	}

	/// Drops the cached token for `product` so the next call re-authenticates.
	pub fn invalidate(&self, product: &ProductScope) -> Option<CachedToken> {
		let evicted = self.cache.invalidate(&self.cache_key(product));

		obs::debug_event!(product = %product, evicted = evicted.is_some(), "token invalidated");

		evicted
	}

	fn cached(&self, key: &CacheKey) -> Option<CachedToken> {
		let token = self.cache.get(key)?;

		self.metrics.record_cache_hit();
		obs::debug_event!(key = %key, "token cache hit");

		Some(token)
	}

	fn refresh_guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.refresh_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	async fn exchange(&self, product: &ProductScope) -> Result<CachedToken> {
		let request = self.token_request(product)?;
		let response = self
			.http_client
			.execute(request, self.timeout)
			.await
			.map_err(|e| self.transport_mapper.map_transport_error(CallSite::TokenExchange, e))?;

		self.token_from_response(&response)
	}

	fn token_request(&self, product: &ProductScope) -> Result<HttpRequest> {
		let method = self.descriptor.client_auth_method;
		let mut form = BTreeMap::new();

		if self.descriptor.quirks.send_grant_type {
			form.insert("grant_type".to_owned(), "client_credentials".to_owned());
		}
		if let Some(scope) = self.credential.scope.as_ref() {
			form.insert("scope".to_owned(), scope.clone());
		}
		if method == ClientAuthMethod::ClientSecretPost {
			form.insert("client_id".to_owned(), self.credential.identity.clone());
			form.insert("client_secret".to_owned(), self.credential.secret.expose().to_owned());
		}

		self.strategy.augment_token_request(product, &mut form);

		let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter()).finish();
		let mut builder = http::Request::builder()
			.method(Method::POST)
			.uri(self.descriptor.token_endpoint_for(product).as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json");

		if method == ClientAuthMethod::ClientSecretBasic {
			builder = builder.header(AUTHORIZATION, self.credential.basic_authorization());
		}

		for pair in self.descriptor.headers_for(product) {
			let (name, value) = pair.to_http()?;

			builder = builder.header(name, value);
		}

		let request = builder.body(body.into_bytes()).map_err(ConfigError::from)?;

		Ok(request)
	}

	fn token_from_response(&self, response: &HttpResponse) -> Result<CachedToken> {
		let http_status = response.status().as_u16();
		let body = response.body();

		if !response.status().is_success() {
			let (code, message) = match self.strategy.parse_error_envelope(http_status, body) {
				Some(envelope) => (envelope.code, envelope.message),
				None => (None, raw_text(body)),
			};

			return Err(AuthenticationError::Rejected { http_status, code, message }.into());
		}

		let malformed = |reason: String| AuthenticationError::MalformedResponse { http_status, reason };
		let grant = self.strategy.decode_token_response(body).map_err(malformed)?;
		let ttl = match grant.expires_in {
			Some(secs) if secs > 0 => Duration::seconds(secs),
			Some(secs) => {
				return Err(malformed(format!("expires_in must be positive, got {secs}")).into());
			},
			None => self.descriptor.quirks.default_token_ttl(),
		};
		let token = CachedToken::builder()
			.value(grant.access_token)
			.issued_at(OffsetDateTime::now_utc())
			.expires_in(ttl)
			.build()
			.map_err(|e| malformed(e.to_string()))?;

		Ok(token)
	}
}
#[cfg(feature = "reqwest")]
impl TokenProvider<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a provider backed by its own redirect-free reqwest transport and the default
	/// provider strategy.
	pub fn new(
		cache: Arc<dyn TokenCache>,
		descriptor: impl Into<Arc<ProviderDescriptor>>,
		credential: Credential,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			cache,
			descriptor,
			Arc::new(DefaultProviderStrategy),
			credential,
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
		))
	}
}
impl<C, M> Debug for TokenProvider<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenProvider")
			.field("descriptor", &self.descriptor.id)
			.field("credential", &self.credential)
			.field("timeout", &self.timeout)
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn raw_text(body: &[u8]) -> Option<String> {
	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() { None } else { Some(trimmed.to_owned()) }
}
