//! Provider descriptor data structures and helpers shared by every call path.
//!
//! A descriptor captures everything the core needs to talk to one provider: where the API and
//! identity endpoints live, how client credentials are encoded, which environment and
//! subscription headers ride along with each request, and per-product overrides for providers
//! that split one credential across several products.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// crates.io
use http::{HeaderName, HeaderValue};
// self
use crate::{
	_prelude::*,
	auth::{ProductScope, ProviderId},
	error::ConfigError,
};

/// Client authentication modes for identity-endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with identity/secret.
	ClientSecretBasic,
	/// Form POST body parameters `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Header name/value pair validated when the descriptor is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair {
	/// Header name.
	pub name: String,
	/// Header value.
	pub value: String,
}
impl HeaderPair {
	/// Creates a header pair.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into() }
	}

	/// Converts the pair into typed HTTP header components.
	pub fn to_http(&self) -> Result<(HeaderName, HeaderValue), ConfigError> {
		let invalid = || ConfigError::InvalidHeader { name: self.name.clone() };
		let name = HeaderName::from_bytes(self.name.as_bytes()).map_err(|_| invalid())?;
		let value = HeaderValue::from_str(&self.value).map_err(|_| invalid())?;

		Ok((name, value))
	}
}

/// Per-product overrides for providers that mint one token per product.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductProfile {
	/// Identity endpoint override for this product.
	pub token_endpoint: Option<Url>,
	/// Extra headers (e.g. a per-product subscription key) sent on every call for this product.
	#[serde(default)]
	pub headers: Vec<HeaderPair>,
}

/// Immutable provider descriptor consumed by the token provider and executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Base URL that request paths are appended to.
	pub base_url: Url,
	/// Default identity endpoint used for client-credentials exchanges.
	pub token_endpoint: Url,
	/// Client authentication mechanism for the identity endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Environment header (e.g. `X-Target-Environment: sandbox`).
	pub environment: Option<HeaderPair>,
	/// Headers sent on every call regardless of product.
	pub headers: Vec<HeaderPair>,
	/// Product-specific overrides.
	pub products: BTreeMap<ProductScope, ProductProfile>,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Identity endpoint for `product`, honoring product overrides.
	pub fn token_endpoint_for(&self, product: &ProductScope) -> &Url {
		self.products
			.get(product)
			.and_then(|profile| profile.token_endpoint.as_ref())
			.unwrap_or(&self.token_endpoint)
	}

	/// Static, environment, and product headers that apply to calls for `product`.
	pub fn headers_for<'a>(
		&'a self,
		product: &'a ProductScope,
	) -> impl Iterator<Item = &'a HeaderPair> + 'a {
		self.headers
			.iter()
			.chain(self.environment.iter())
			.chain(self.products.get(product).into_iter().flat_map(|profile| profile.headers.iter()))
	}

	/// Resolves `path` (with optional query) against the base URL.
	pub fn endpoint_url(&self, path: &str) -> Result<Url, ConfigError> {
		let raw = format!(
			"{}/{}",
			self.base_url.as_str().trim_end_matches('/'),
			path.trim_start_matches('/')
		);

		Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })
	}
}
