//! Gateway-level error types shared by token acquisition, request execution, and polling.

// self
use crate::{_prelude::*, auth::OperationReference};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
///
/// Callers switch on the variant to pick a remediation; message strings are informational only.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout). Always safe to retry with backoff.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Identity endpoint rejected the credentials or answered with an unusable body.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Provider rejected a specific call.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Request signing failed.
	#[error(transparent)]
	Signing(#[from] SigningError),
	/// Provider answered 2xx with a body that does not match the expected shape.
	#[error("Provider returned a malformed body (HTTP {status}).")]
	Decode {
		/// Structured parsing failure, including the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},

	/// Asynchronous operation reached a provider-declared failed state.
	#[error("Operation `{reference}` failed: {reason}.")]
	TerminalFailure {
		/// Reference of the failed operation.
		reference: OperationReference,
		/// Provider-supplied failure reason.
		reason: String,
	},
	/// Poll budget exhausted while the operation was still pending.
	#[error("Operation `{reference}` is still pending after {attempts} status queries.")]
	Timeout {
		/// Reference of the pending operation.
		reference: OperationReference,
		/// Number of status queries issued before giving up.
		attempts: u32,
	},
	/// Provider reported a status label that maps to no known state.
	#[error("Operation `{reference}` reported an unrecognized status `{label}`.")]
	UnknownStatus {
		/// Reference of the queried operation.
		reference: OperationReference,
		/// Raw status label returned by the provider.
		label: String,
	},
	/// Caller cancelled the wait.
	#[error("Polling for operation `{reference}` was cancelled.")]
	Cancelled {
		/// Reference of the operation whose wait was cancelled.
		reference: OperationReference,
	},
}
impl Error {
	/// Returns `true` for network-level failures that are safe to retry.
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::Transport(_))
	}

	/// Returns `true` when the provider refused the presented credentials or token.
	pub fn is_auth_rejection(&self) -> bool {
		match self {
			Self::Authentication(AuthenticationError::Rejected { .. }) => true,
			Self::Api(err) => err.http_status == 401,
			_ => false,
		}
	}
}

/// Configuration and validation failures raised while constructing or issuing calls.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] http::Error),
	/// A URL could not be parsed or joined.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending URL text.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Header name or value is not valid HTTP.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Retry policy parameters are inconsistent.
	#[error("Retry policy is invalid: {reason}.")]
	InvalidRetryPolicy {
		/// Description of the violated constraint.
		reason: &'static str,
	},
	/// A call deadline is zero.
	#[error("The {which} timeout must be positive.")]
	NonPositiveTimeout {
		/// Which deadline failed validation.
		which: &'static str,
	},
	/// A request asked for a signature but the executor has no signer.
	#[error("Request requires a signature but no signing key is configured.")]
	MissingSigner,
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	BodySerialize(#[source] serde_json::Error),
	/// Configuration document could not be parsed.
	#[error("Gateway configuration is malformed.")]
	Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, deadline).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The per-call deadline elapsed before the provider answered.
	#[error("Request to the provider timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

/// Identity endpoint failures. Never retried automatically.
#[derive(Debug, ThisError)]
pub enum AuthenticationError {
	/// Identity endpoint answered with a non-2xx status.
	#[error("Identity endpoint rejected the credentials (HTTP {http_status}): {}.", describe(.code, .message))]
	Rejected {
		/// HTTP status code returned by the identity endpoint.
		http_status: u16,
		/// Provider error code, when the envelope carried one.
		code: Option<String>,
		/// Provider error message, when the envelope carried one.
		message: Option<String>,
	},
	/// Identity endpoint answered 2xx with an unusable token body.
	#[error("Identity endpoint returned a malformed token response: {reason}.")]
	MalformedResponse {
		/// HTTP status code returned by the identity endpoint.
		http_status: u16,
		/// What was wrong with the body.
		reason: String,
	},
}

/// Provider rejection of a specific call.
///
/// When the provider's error envelope could be parsed, `code` and `message` carry its fields;
/// otherwise `raw_body` preserves the body for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Provider rejected the call (HTTP {http_status}): {}.", describe(.code, .message))]
pub struct ApiError {
	/// HTTP status code returned by the provider.
	pub http_status: u16,
	/// Provider error code.
	pub code: Option<String>,
	/// Provider error message.
	pub message: Option<String>,
	/// Raw response body when no envelope could be parsed.
	pub raw_body: Option<String>,
	/// Retry-After hint from upstream, if supplied.
	pub retry_after: Option<Duration>,
}
impl ApiError {
	/// Builds an error from a parsed provider envelope.
	pub fn structured(
		http_status: u16,
		code: Option<String>,
		message: Option<String>,
		retry_after: Option<Duration>,
	) -> Self {
		Self { http_status, code, message, raw_body: None, retry_after }
	}

	/// Builds an error for a body that carried no recognizable envelope.
	pub fn unstructured(
		http_status: u16,
		raw_body: impl Into<String>,
		retry_after: Option<Duration>,
	) -> Self {
		Self { http_status, code: None, message: None, raw_body: Some(raw_body.into()), retry_after }
	}
}

/// Signing key and signature failures.
#[derive(Debug, ThisError)]
pub enum SigningError {
	/// Key material could not be parsed.
	#[error("Signing key material is malformed: {reason}.")]
	MalformedKey {
		/// Parser diagnostic.
		reason: String,
	},
	/// The signature primitive reported a failure.
	#[error("Payload could not be signed.")]
	Sign(#[source] BoxError),
}

fn describe(code: &Option<String>, message: &Option<String>) -> String {
	match (code, message) {
		(Some(code), Some(message)) => format!("{code} ({message})"),
		(Some(value), None) | (None, Some(value)) => value.clone(),
		(None, None) => "no error details".into(),
	}
}
