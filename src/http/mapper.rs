// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Call site a transport failure originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallSite {
	/// Identity-endpoint token exchange.
	TokenExchange,
	/// Authenticated gateway call.
	Gateway,
}
impl CallSite {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallSite::TokenExchange => "token_exchange",
			CallSite::Gateway => "gateway",
		}
	}
}
impl Display for CallSite {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Maps HTTP transport failures into gateway [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an error emitted by the transport into a gateway error.
	fn map_transport_error(&self, site: CallSite, error: E) -> Error;
}

/// Default mapper for reqwest-backed transports.
///
/// Request-builder failures are configuration errors; every other reqwest failure (connect,
/// TLS, reset, deadline) becomes a retry-safe [`TransportError`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(&self, site: CallSite, err: ReqwestError) -> Error {
		// Call site reserved for provider-specific mappers.
		let _ = site;

		if err.is_builder() {
			return ConfigError::from(err).into();
		}

		TransportError::from(err).into()
	}
}

/// Mapper for transports whose errors carry no further classification.
#[derive(Clone, Debug, Default)]
pub struct NetworkTransportErrorMapper;
impl<E> TransportErrorMapper<E> for NetworkTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(&self, _site: CallSite, err: E) -> Error {
		TransportError::network(err).into()
	}
}
