//! Token cache keys derived from provider, credential scope, and product.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{Credential, ProductScope, ProviderId},
};

/// Deterministic key identifying one cached bearer token.
///
/// The credential component is a base64 (no padding) SHA-256 fingerprint of the identity and
/// credential scope, so two clients with different credentials never share a token while the
/// key itself carries no plain identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Provider component.
	pub provider: ProviderId,
	/// Fingerprint of the credential identity + scope.
	pub credential_fingerprint: String,
	/// Product or sub-scope component.
	pub product: ProductScope,
}
impl CacheKey {
	/// Builds a key for the provided provider, credential, and product.
	pub fn new(provider: &ProviderId, credential: &Credential, product: &ProductScope) -> Self {
		Self {
			provider: provider.clone(),
			credential_fingerprint: fingerprint(credential),
			product: product.clone(),
		}
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}/{}", self.provider, self.product, self.credential_fingerprint)
	}
}

fn fingerprint(credential: &Credential) -> String {
	let mut hasher = Sha256::new();

	hasher.update(credential.identity.as_bytes());
	hasher.update([0]);
	hasher.update(credential.scope.as_deref().unwrap_or_default().as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}
