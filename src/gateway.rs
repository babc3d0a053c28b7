//! One-shot authenticated request execution and uniform response classification.
//!
//! [`GatewayExecutor`] turns a [`GatewayRequest`] into an HTTP call: it obtains a bearer token
//! (or applies Basic credentials), attaches descriptor, reference, and signature headers,
//! executes the call with the interactive or batch deadline, and classifies the response.
//! Non-2xx answers become [`ApiError`]; transport failures become
//! [`TransportError`](crate::error::TransportError). The executor never retries; a 401 only
//! drops the cached token so the caller's next attempt re-authenticates.

// crates.io
use http::{
	HeaderMap, Method, StatusCode,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{OperationReference, ProductScope},
	error::{ApiError, ConfigError},
	http::{
		CallSite, GatewayHttpClient, HttpRequest, TransportErrorMapper, parse_retry_after,
	},
	obs::{self, OpKind, OpOutcome, OpSpan},
	provider::HeaderPair,
	sign::RequestSigner,
	token::TokenProvider,
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Executor specialized for the crate's default reqwest transport stack.
pub type ReqwestGatewayExecutor = GatewayExecutor<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Per-call deadlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallTimeouts {
	/// Deadline for interactive calls.
	pub interactive: Duration,
	/// Deadline for batch and report calls.
	pub batch: Duration,
}
impl Default for CallTimeouts {
	fn default() -> Self {
		Self { interactive: Duration::seconds(30), batch: Duration::seconds(120) }
	}
}

/// How a call authenticates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallAuth {
	/// Bearer token from the [`TokenProvider`].
	#[default]
	Bearer,
	/// Basic credentials of the configured client (used by some provisioning endpoints).
	Basic,
	/// No `Authorization` header.
	Anonymous,
}

/// What the request signature covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureInput {
	/// The raw request body.
	Body,
	/// A provider-defined canonical string.
	Canonical(String),
}

/// Description of one gateway call.
#[derive(Clone, Debug)]
pub struct GatewayRequest {
	/// HTTP method.
	pub method: Method,
	/// Product whose token and headers apply.
	pub product: ProductScope,
	/// Path (with optional query) relative to the descriptor base URL.
	pub path: String,
	/// Request body.
	pub body: Option<Vec<u8>>,
	/// Content type of `body`.
	pub content_type: Option<String>,
	/// Extra headers for this call only.
	pub headers: Vec<HeaderPair>,
	/// Signature input, when the call must be signed.
	pub signature: Option<SignatureInput>,
	/// Operation reference sent in the provider's reference header.
	pub reference: Option<OperationReference>,
	/// Uses the batch deadline instead of the interactive one.
	pub batch: bool,
	/// Authentication mode.
	pub auth: CallAuth,
}
impl GatewayRequest {
	/// Creates a bearer-authenticated request without a body.
	pub fn new(method: Method, product: ProductScope, path: impl Into<String>) -> Self {
		Self {
			method,
			product,
			path: path.into(),
			body: None,
			content_type: None,
			headers: Vec::new(),
			signature: None,
			reference: None,
			batch: false,
			auth: CallAuth::default(),
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(product: ProductScope, path: impl Into<String>) -> Self {
		Self::new(Method::GET, product, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(product: ProductScope, path: impl Into<String>) -> Self {
		Self::new(Method::POST, product, path)
	}

	/// Serializes `body` as the JSON request body.
	pub fn json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(ConfigError::BodySerialize)?;

		Ok(self.body(bytes, "application/json"))
	}

	/// Sets a raw body and its content type.
	pub fn body(mut self, bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
		self.body = Some(bytes.into());
		self.content_type = Some(content_type.into());

		self
	}

	/// Adds a header for this call.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push(HeaderPair::new(name, value));

		self
	}

	/// Signs the raw request body.
	pub fn signed_body(mut self) -> Self {
		self.signature = Some(SignatureInput::Body);

		self
	}

	/// Signs a provider-defined canonical string instead of the body.
	pub fn sign_over(mut self, canonical: impl Into<String>) -> Self {
		self.signature = Some(SignatureInput::Canonical(canonical.into()));

		self
	}

	/// Attaches the operation reference header.
	pub fn reference(mut self, reference: OperationReference) -> Self {
		self.reference = Some(reference);

		self
	}

	/// Uses the batch deadline.
	pub fn batch(mut self) -> Self {
		self.batch = true;

		self
	}

	/// Overrides the authentication mode.
	pub fn auth(mut self, auth: CallAuth) -> Self {
		self.auth = auth;

		self
	}
}

/// Successful (2xx) response.
#[derive(Clone, Debug)]
pub struct GatewayResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl GatewayResponse {
	/// Returns `true` when the body carries no content.
	pub fn is_empty(&self) -> bool {
		self.body.iter().all(u8::is_ascii_whitespace)
	}

	/// Decodes the body as JSON, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let deserializer = &mut serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(deserializer)
			.map_err(|source| Error::Decode { source, status: self.status.as_u16() })
	}
}

/// Decoded result of [`GatewayExecutor::call`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome<T> {
	/// 2xx response with a decoded body.
	Body(T),
	/// 2xx response without content.
	Empty,
}
impl<T> CallOutcome<T> {
	/// Converts the outcome into an `Option`.
	pub fn into_option(self) -> Option<T> {
		match self {
			CallOutcome::Body(value) => Some(value),
			CallOutcome::Empty => None,
		}
	}
}

/// Executes authenticated, optionally signed calls against one provider.
pub struct GatewayExecutor<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Token provider, which also owns the transport, descriptor, and strategy.
	pub tokens: Arc<TokenProvider<C, M>>,
	/// Signer applied to requests that ask for a signature.
	pub signer: Option<Arc<RequestSigner>>,
	/// Per-call deadlines.
	pub timeouts: CallTimeouts,
}
impl<C, M> GatewayExecutor<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an executor without a signer and with default deadlines.
	pub fn new(tokens: impl Into<Arc<TokenProvider<C, M>>>) -> Self {
		Self { tokens: tokens.into(), signer: None, timeouts: CallTimeouts::default() }
	}

	/// Attaches a request signer.
	pub fn with_signer(mut self, signer: impl Into<Arc<RequestSigner>>) -> Self {
		self.signer = Some(signer.into());

		self
	}

	/// Overrides the per-call deadlines.
	pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
		self.timeouts = timeouts;

		self
	}

	/// Executes `request` once and returns the raw 2xx response.
	pub async fn execute(&self, request: GatewayRequest) -> Result<GatewayResponse> {
		const KIND: OpKind = OpKind::GatewayCall;

		let span = OpSpan::new(KIND, "execute");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.execute_once(request)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		result
	}

	/// Executes `request` and decodes a JSON body, mapping empty 2xx bodies to
	/// [`CallOutcome::Empty`].
	pub async fn call<T>(&self, request: GatewayRequest) -> Result<CallOutcome<T>>
	where
		T: DeserializeOwned,
	{
		let response = self.execute(request).await?;

		if response.is_empty() {
			return Ok(CallOutcome::Empty);
		}

		response.json().map(CallOutcome::Body)
	}

	async fn execute_once(&self, request: GatewayRequest) -> Result<GatewayResponse> {
		let http_request = self.build_request(&request).await?;
		let timeout = if request.batch { self.timeouts.batch } else { self.timeouts.interactive };
		let response = self
			.tokens
			.http_client
			.execute(http_request, timeout)
			.await
			.map_err(|e| self.tokens.transport_mapper.map_transport_error(CallSite::Gateway, e))?;
		let (parts, body) = response.into_parts();

		if parts.status.is_success() {
			return Ok(GatewayResponse { status: parts.status, headers: parts.headers, body });
		}
		if parts.status == StatusCode::UNAUTHORIZED && request.auth == CallAuth::Bearer {
			self.tokens.invalidate(&request.product);
		}

		obs::debug_event!(status = parts.status.as_u16(), path = %request.path, "gateway call rejected");

		Err(self.classify_failure(parts.status, &parts.headers, &body).into())
	}

	async fn build_request(&self, request: &GatewayRequest) -> Result<HttpRequest> {
		let descriptor = &self.tokens.descriptor;
		let url = descriptor.endpoint_url(&request.path)?;
		// Resolve the signature first so a missing signer fails before any token exchange.
		let signature = self.signature_for(request)?;
		let mut builder = http::Request::builder()
			.method(request.method.clone())
			.uri(url.as_str())
			.header(ACCEPT, "application/json");

		match request.auth {
			CallAuth::Bearer => {
				let token = self.tokens.get_token(&request.product).await?;

				builder = builder.header(AUTHORIZATION, token.bearer_authorization());
			},
			CallAuth::Basic => {
				builder = builder.header(AUTHORIZATION, self.tokens.credential.basic_authorization());
			},
			CallAuth::Anonymous => {},
		}

		for pair in descriptor.headers_for(&request.product) {
			let (name, value) = pair.to_http()?;

			builder = builder.header(name, value);
		}

		if let Some(reference) = request.reference.as_ref() {
			let pair = HeaderPair::new(&descriptor.quirks.reference_header, reference.to_string());
			let (name, value) = pair.to_http()?;

			builder = builder.header(name, value);
		}
		if let Some(signature) = signature {
			let (name, value) =
				HeaderPair::new(&descriptor.quirks.signature_header, signature).to_http()?;

			builder = builder.header(name, value);
		}
		if let Some(content_type) = request.content_type.as_deref() {
			builder = builder.header(CONTENT_TYPE, content_type);
		}

		for pair in &request.headers {
			let (name, value) = pair.to_http()?;

			builder = builder.header(name, value);
		}

		let http_request =
			builder.body(request.body.clone().unwrap_or_default()).map_err(ConfigError::from)?;

		Ok(http_request)
	}

	fn signature_for(&self, request: &GatewayRequest) -> Result<Option<String>> {
		let Some(input) = request.signature.as_ref() else {
			return Ok(None);
		};
		let signer = self.signer.as_ref().ok_or(ConfigError::MissingSigner)?;
		let payload = match input {
			SignatureInput::Body => request.body.as_deref().unwrap_or_default(),
			SignatureInput::Canonical(text) => text.as_bytes(),
		};

		Ok(Some(signer.sign(payload)?))
	}

	fn classify_failure(&self, status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ApiError {
		let http_status = status.as_u16();
		let retry_after = parse_retry_after(headers);

		match self.tokens.strategy.parse_error_envelope(http_status, body) {
			Some(envelope) =>
				ApiError::structured(http_status, envelope.code, envelope.message, retry_after),
			None => ApiError::unstructured(http_status, String::from_utf8_lossy(body), retry_after),
		}
	}
}
impl<C, M> Debug for GatewayExecutor<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatewayExecutor")
			.field("tokens", &self.tokens)
			.field("signer", &self.signer)
			.field("timeouts", &self.timeouts)
			.finish()
	}
}
