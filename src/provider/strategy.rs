//! Provider strategy hooks that customize token exchanges and error parsing.
//!
//! Implementations decorate outgoing token requests and normalize response shapes without
//! tying the core to any particular HTTP client.

// std
use std::collections::BTreeMap;
// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, auth::ProductScope};

/// Strategy hook that allows providers to decorate token requests and decode responses.
///
/// Implementors are required to be `Send + Sync`. Every hook has a default implementation that
/// understands the common shapes (`access_token`/`accessToken`, `code`/`errorCode`, nested
/// `error` objects), so most providers only override what differs.
pub trait ProviderStrategy: Send + Sync {
	/// Gives providers a chance to add custom form parameters before the token exchange.
	///
	/// The map already contains `grant_type`, `scope`, and client credentials as applicable.
	fn augment_token_request(&self, _product: &ProductScope, _form: &mut BTreeMap<String, String>) {
	}

	/// Decodes a 2xx identity-endpoint body.
	fn decode_token_response(&self, body: &[u8]) -> Result<TokenGrant, String> {
		decode_token_grant(body)
	}

	/// Extracts a structured error envelope from a non-2xx body, if one is present.
	fn parse_error_envelope(&self, http_status: u16, body: &[u8]) -> Option<ErrorEnvelope> {
		let _ = http_status;

		parse_common_envelope(body)
	}
}

/// Token material returned by an identity endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
	/// Bearer token value.
	pub access_token: String,
	/// Lifetime in seconds, when the provider reported one.
	pub expires_in: Option<i64>,
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// Provider error fields extracted from a non-2xx body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorEnvelope {
	/// Machine-readable error code.
	pub code: Option<String>,
	/// Human-readable error message.
	pub message: Option<String>,
}

/// Default strategy that understands the common token and error shapes.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {}

#[derive(Deserialize)]
struct TokenResponse {
	#[serde(alias = "accessToken")]
	access_token: String,
	#[serde(default, alias = "expiresIn")]
	expires_in: Option<ExpiresIn>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
	Seconds(i64),
	Text(String),
}

const CODE_FIELDS: [&str; 5] = ["code", "errorCode", "error_code", "error", "status"];
const MESSAGE_FIELDS: [&str; 6] =
	["message", "errorMessage", "error_message", "error_description", "description", "reason"];

/// Decodes `{access_token|accessToken, expires_in|expiresIn}` bodies.
pub fn decode_token_grant(body: &[u8]) -> Result<TokenGrant, String> {
	let deserializer = &mut serde_json::Deserializer::from_slice(body);
	let response: TokenResponse =
		serde_path_to_error::deserialize(deserializer).map_err(|e| e.to_string())?;

	if response.access_token.trim().is_empty() {
		return Err("access token is empty".into());
	}

	let expires_in = match response.expires_in {
		None => None,
		Some(ExpiresIn::Seconds(secs)) => Some(secs),
		Some(ExpiresIn::Text(text)) => Some(
			text.trim().parse::<i64>().map_err(|_| format!("expires_in `{text}` is not numeric"))?,
		),
	};

	Ok(TokenGrant { access_token: response.access_token, expires_in })
}

/// Extracts code/message fields from a JSON error body, descending into a nested `error`
/// object when present.
pub fn parse_common_envelope(body: &[u8]) -> Option<ErrorEnvelope> {
	let value = serde_json::from_slice::<Value>(body).ok()?;
	let object = value.as_object()?;
	let scope = match object.get("error") {
		Some(Value::Object(nested)) => nested,
		_ => object,
	};
	let envelope = ErrorEnvelope {
		code: first_text(scope, &CODE_FIELDS),
		message: first_text(scope, &MESSAGE_FIELDS),
	};

	if envelope.code.is_none() && envelope.message.is_none() { None } else { Some(envelope) }
}

fn first_text(object: &Map<String, Value>, fields: &[&str]) -> Option<String> {
	fields.iter().find_map(|field| match object.get(*field)? {
		Value::String(text) if !text.is_empty() => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	})
}
