//! Key material wrapper shared by credentials, signing keys, and issued bearer values.

// crates.io
use zeroize::Zeroize;
// self
use crate::_prelude::*;

/// Client secret, signing key, or bearer value.
///
/// The bytes are wiped when the last copy is dropped, formatting never prints them, and the type
/// only implements `Deserialize`: configuration files can carry secrets in, but nothing in the
/// crate can write one back out.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Takes ownership of `value`.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Plain value for building headers, form bodies, and keys.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when no material was supplied.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Drop for Secret {
	fn drop(&mut self) {
		self.0.zeroize();
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Secret(<{} bytes redacted>)", self.0.len())
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatting_hides_the_material() {
		let secret = Secret::new("api-key-123");

		assert_eq!(format!("{secret:?}"), "Secret(<11 bytes redacted>)");
		assert_eq!(format!("{secret}"), "<redacted>");
		assert_eq!(secret.expose(), "api-key-123");
	}

	#[test]
	fn secrets_load_from_configuration_strings() {
		let secret: Secret =
			serde_json::from_str("\"sig-secret\"").expect("Secret should deserialize from a string.");

		assert_eq!(secret.expose(), "sig-secret");
		assert!(Secret::new("").is_empty());
	}
}
