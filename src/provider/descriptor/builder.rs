// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ProductScope, ProviderId},
	provider::{ClientAuthMethod, HeaderPair, ProductProfile, ProviderDescriptor, ProviderQuirks},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Base URL is mandatory.
	#[error("Missing base URL.")]
	MissingBaseUrl,
	/// Identity endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Header name or value is not valid HTTP.
	#[error("Header `{name}` is not a valid HTTP header.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Default token lifetime must be positive.
	#[error("Default token TTL must be positive.")]
	NonPositiveTokenTtl,
	/// Default token lifetime exceeds the longest lifetime a cache accepts.
	#[error("Default token TTL of {secs}s exceeds one year.")]
	TokenTtlTooLong {
		/// Configured lifetime in seconds.
		secs: i64,
	},
	/// Quirk header names must not be empty.
	#[error("The {quirk} header name must not be empty.")]
	EmptyQuirkHeader {
		/// Which quirk failed validation.
		quirk: &'static str,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Base URL for API calls.
	pub base_url: Option<Url>,
	/// Default identity endpoint.
	pub token_endpoint: Option<Url>,
	/// Client authentication method for the identity endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Environment header.
	pub environment: Option<HeaderPair>,
	/// Headers sent on every call.
	pub headers: Vec<HeaderPair>,
	/// Product-specific overrides.
	pub products: BTreeMap<ProductScope, ProductProfile>,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			base_url: None,
			token_endpoint: None,
			client_auth_method: ClientAuthMethod::default(),
			environment: None,
			headers: Vec::new(),
			products: BTreeMap::new(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Sets the base URL.
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Sets the default identity endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Sets the environment header.
	pub fn environment(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.environment = Some(HeaderPair::new(name, value));

		self
	}

	/// Adds a header sent on every call.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push(HeaderPair::new(name, value));

		self
	}

	/// Registers product-specific overrides.
	pub fn product(mut self, product: ProductScope, profile: ProductProfile) -> Self {
		self.products.insert(product, profile);

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let base_url = self.base_url.ok_or(ProviderDescriptorError::MissingBaseUrl)?;
		let token_endpoint =
			self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let descriptor = ProviderDescriptor {
			id: self.id,
			base_url,
			token_endpoint,
			client_auth_method: self.client_auth_method,
			environment: self.environment,
			headers: self.headers,
			products: self.products,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	pub(crate) fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint("base", &self.base_url)?;
		validate_endpoint("token", &self.token_endpoint)?;

		for profile in self.products.values() {
			if let Some(endpoint) = profile.token_endpoint.as_ref() {
				validate_endpoint("product token", endpoint)?;
			}
		}

		let product_headers = self.products.values().flat_map(|profile| profile.headers.iter());

		for pair in self.headers.iter().chain(self.environment.iter()).chain(product_headers) {
			pair.to_http()
				.map_err(|_| ProviderDescriptorError::InvalidHeader { name: pair.name.clone() })?;
		}

		let ttl_secs = self.quirks.default_token_ttl_secs;

		if ttl_secs <= 0 {
			return Err(ProviderDescriptorError::NonPositiveTokenTtl);
		}
		if self.quirks.default_token_ttl() > CachedToken::MAX_LIFETIME {
			return Err(ProviderDescriptorError::TokenTtlTooLong { secs: ttl_secs });
		}

		validate_quirk_header("signature", &self.quirks.signature_header)?;
		validate_quirk_header("reference", &self.quirks.reference_header)?;

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	let loopback = match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	};

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn validate_quirk_header(quirk: &'static str, name: &str) -> Result<(), ProviderDescriptorError> {
	if name.is_empty() {
		return Err(ProviderDescriptorError::EmptyQuirkHeader { quirk });
	}

	HeaderPair::new(name, "placeholder")
		.to_http()
		.map(|_| ())
		.map_err(|_| ProviderDescriptorError::InvalidHeader { name: name.to_owned() })
}
