//! Transport primitives for provider calls.
//!
//! The module exposes [`GatewayHttpClient`], the crate's only dependency on an HTTP stack, and
//! [`TransportErrorMapper`], which turns transport-specific failures into the gateway taxonomy.
//! Token exchanges and gateway calls both go through the same client, so pooling and TLS
//! settings configured on it apply everywhere.

mod mapper;

pub use mapper::*;

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use http::header::{HeaderMap, RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Outbound request handed to a [`GatewayHttpClient`].
pub type HttpRequest = http::Request<Vec<u8>>;
/// Fully buffered response returned by a [`GatewayHttpClient`].
pub type HttpResponse = http::Response<Vec<u8>>;
/// Boxed future returned by [`GatewayHttpClient::execute`].
pub type HttpFuture<'a, E> = Pin<Box<dyn Future<Output = Result<HttpResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing provider calls.
///
/// Implementations must be `Send + Sync + 'static` so one client can be shared by the token
/// provider and every executor built on top of it. Each call carries its own deadline; an
/// implementation must fail the returned future once `timeout` elapses instead of waiting
/// indefinitely. Responses of any status are returned as `Ok`; only failures to obtain a
/// response at all are transport errors.
pub trait GatewayHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Executes `request`, buffering the full response body.
	fn execute(
		&self,
		request: HttpRequest,
		timeout: Duration,
	) -> HttpFuture<'_, Self::TransportError>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The wrapped client pools connections across calls. Provider calls should not follow
/// redirects; configure any custom [`ReqwestClient`] accordingly.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that refuses redirects.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ReqwestHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ReqwestHttpClient(..)")
	}
}
#[cfg(feature = "reqwest")]
impl GatewayHttpClient for ReqwestHttpClient {
	type TransportError = ReqwestError;

	fn execute(
		&self,
		request: HttpRequest,
		timeout: Duration,
	) -> HttpFuture<'_, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut request = reqwest::Request::try_from(request)?;

			*request.timeout_mut() = Some(timeout.unsigned_abs());

			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut buffered = HttpResponse::new(response.bytes().await?.to_vec());

			*buffered.status_mut() = status;
			*buffered.headers_mut() = headers;

			Ok(buffered)
		})
	}
}

/// Reads a `Retry-After` hint expressed in seconds or as an RFC 2822 date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
