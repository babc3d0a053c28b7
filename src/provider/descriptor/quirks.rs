//! Per-provider deviations in header names, token form, and token lifetime defaults.

// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how calls are built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Sends `grant_type=client_credentials` in the token request body.
	pub send_grant_type: bool,
	/// Header carrying the request signature.
	pub signature_header: String,
	/// Header carrying the operation reference.
	pub reference_header: String,
	/// Token lifetime in seconds assumed when the identity endpoint omits `expires_in`.
	pub default_token_ttl_secs: i64,
}
impl ProviderQuirks {
	/// Token lifetime assumed when the identity endpoint omits `expires_in`.
	pub fn default_token_ttl(&self) -> Duration {
		Duration::seconds(self.default_token_ttl_secs)
	}
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self {
			send_grant_type: true,
			signature_header: "X-Signature".into(),
			reference_header: "X-Reference-Id".into(),
			default_token_ttl_secs: 3600,
		}
	}
}
