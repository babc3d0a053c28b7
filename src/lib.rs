//! Gateway client core for payment providers - cached client-credentials tokens with per-scope
//! singleflight refresh, signed request execution with uniform error classification, and
//! bounded, cancellable polling of asynchronous operations.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod obs;
pub mod poll;
pub mod provider;
pub mod sign;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{io, time::Duration as StdDuration};
	// crates.io
	use http::{HeaderMap, HeaderValue, Method, StatusCode, header::CONTENT_TYPE};
	// self
	use crate::{
		auth::{Credential, ProviderId},
		cache::MemoryTokenCache,
		gateway::GatewayExecutor,
		http::{GatewayHttpClient, HttpFuture, HttpRequest, HttpResponse, NetworkTransportErrorMapper},
		provider::{DefaultProviderStrategy, ProviderDescriptor},
		token::TokenProvider,
	};
	#[cfg(feature = "reqwest")]
	use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

	/// Executor type alias backed by [`ScriptedHttpClient`].
	pub type ScriptedExecutor = GatewayExecutor<ScriptedHttpClient, NetworkTransportErrorMapper>;
	/// Executor type alias used by reqwest-backed integration tests.
	#[cfg(feature = "reqwest")]
	pub type ReqwestTestExecutor = GatewayExecutor<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	type Responder = dyn Fn(&RecordedRequest) -> io::Result<HttpResponse> + Send + Sync;

	/// Request captured by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: Method,
		/// Full request URI.
		pub uri: String,
		/// URI path.
		pub path: String,
		/// Request headers.
		pub headers: HeaderMap,
		/// Request body.
		pub body: Vec<u8>,
		/// Deadline the caller attached.
		pub timeout: Duration,
	}
	impl RecordedRequest {
		/// Header value as text, if present.
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers.get(name).and_then(|value| value.to_str().ok())
		}

		/// Body decoded as UTF-8.
		pub fn body_text(&self) -> String {
			String::from_utf8_lossy(&self.body).into_owned()
		}
	}

	/// In-process transport that records requests and answers from a closure.
	pub struct ScriptedHttpClient {
		responder: Box<Responder>,
		latency: StdDuration,
		requests: Mutex<Vec<RecordedRequest>>,
	}
	impl ScriptedHttpClient {
		/// Answers every request with `responder`.
		pub fn new(
			responder: impl Fn(&RecordedRequest) -> io::Result<HttpResponse> + Send + Sync + 'static,
		) -> Self {
			Self { responder: Box::new(responder), latency: StdDuration::ZERO, requests: Mutex::default() }
		}

		/// Issues `scripted-token` on `/token` and answers everything else with `responder`.
		pub fn gateway(
			responder: impl Fn(&RecordedRequest) -> io::Result<HttpResponse> + Send + Sync + 'static,
		) -> Self {
			Self::new(move |request| {
				if request.path == "/token" {
					json_response(200, r#"{"access_token":"scripted-token","expires_in":3600}"#)
				} else {
					responder(request)
				}
			})
		}

		/// Delays every answer by `latency`.
		pub fn with_latency(mut self, latency: StdDuration) -> Self {
			self.latency = latency;

			self
		}

		/// Requests seen so far, in order.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.requests.lock().clone()
		}

		/// Number of requests seen so far.
		pub fn request_count(&self) -> usize {
			self.requests.lock().len()
		}

		/// Number of requests whose path equals `path`.
		pub fn requests_to(&self, path: &str) -> usize {
			self.requests.lock().iter().filter(|request| request.path == path).count()
		}
	}
	impl Debug for ScriptedHttpClient {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.debug_struct("ScriptedHttpClient").field("latency", &self.latency).finish_non_exhaustive()
		}
	}
	impl GatewayHttpClient for ScriptedHttpClient {
		type TransportError = io::Error;

		fn execute(
			&self,
			request: HttpRequest,
			timeout: Duration,
		) -> HttpFuture<'_, Self::TransportError> {
			let (parts, body) = request.into_parts();
			let recorded = RecordedRequest {
				method: parts.method,
				uri: parts.uri.to_string(),
				path: parts.uri.path().to_owned(),
				headers: parts.headers,
				body,
				timeout,
			};
			let answer = (self.responder)(&recorded);
			let latency = self.latency;

			self.requests.lock().push(recorded);

			Box::pin(async move {
				if !latency.is_zero() {
					tokio::time::sleep(latency).await;
				}

				answer
			})
		}
	}

	/// Builds a JSON response with `status` and `body`.
	pub fn json_response(status: u16, body: &str) -> io::Result<HttpResponse> {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = StatusCode::from_u16(status).map_err(io::Error::other)?;
		response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(response)
	}

	/// Descriptor rooted at `base_url` with the identity endpoint at `{base_url}/token` and a
	/// sandbox environment header.
	pub fn test_descriptor(base_url: &str) -> ProviderDescriptor {
		let base = Url::parse(base_url).expect("Test base URL should parse.");
		let token = base.join("/token").expect("Test token endpoint should join.");

		ProviderDescriptor::builder(ProviderId::new("sandbox").expect("Provider id should be valid."))
			.base_url(base)
			.token_endpoint(token)
			.environment("X-Target-Environment", "sandbox")
			.build()
			.expect("Test descriptor should build.")
	}

	/// Executor over `client` using [`test_descriptor`] at `https://gateway.test`.
	pub fn build_scripted_executor(client: Arc<ScriptedHttpClient>) -> ScriptedExecutor {
		let tokens = TokenProvider::with_http_client(
			Arc::new(MemoryTokenCache::new()),
			test_descriptor("https://gateway.test"),
			Arc::new(DefaultProviderStrategy),
			Credential::new("api-user", "api-key"),
			client,
			NetworkTransportErrorMapper,
		);

		GatewayExecutor::new(tokens)
	}

	/// Builds a reqwest HTTP client for `httpmock` servers.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a reqwest-backed executor with an in-memory cache and the default strategy.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_executor(
		descriptor: ProviderDescriptor,
		credential: Credential,
	) -> (ReqwestTestExecutor, Arc<MemoryTokenCache>) {
		let cache = Arc::new(MemoryTokenCache::new());
		let tokens = TokenProvider::with_http_client(
			cache.clone(),
			descriptor,
			Arc::new(DefaultProviderStrategy),
			credential,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		);

		(GatewayExecutor::new(tokens), cache)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
