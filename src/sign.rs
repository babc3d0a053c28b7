//! Message-level request signing and signature verification.
//!
//! Two schemes are supported: HMAC-SHA256 with a shared secret, and RSA-SHA256 (PKCS#1 v1.5)
//! with a PEM-encoded private key. Key material is parsed once when the signer is built, so a
//! malformed key fails construction instead of the first signed call. Signatures travel as
//! standard base64.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rsa::{
	RsaPrivateKey, RsaPublicKey,
	pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
	pkcs1v15::{Signature, SigningKey, VerifyingKey},
	pkcs8::{DecodePrivateKey, DecodePublicKey},
	signature::{SignatureEncoding, Signer, Verifier},
};
use sha2::Sha256;
// self
use crate::{_prelude::*, error::SigningError};

type HmacSha256 = Hmac<Sha256>;

/// Supported signature schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
	/// HMAC-SHA256 with a shared secret.
	HmacSha256,
	/// RSA-SHA256, PKCS#1 v1.5 padding.
	RsaSha256,
}
impl SignatureScheme {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			SignatureScheme::HmacSha256 => "hmac_sha256",
			SignatureScheme::RsaSha256 => "rsa_sha256",
		}
	}
}
impl Display for SignatureScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Signs outgoing payloads with pre-parsed key material.
///
/// Signing is stateless: every call starts from the same parsed key and never mutates it.
#[derive(Clone)]
pub struct RequestSigner {
	key: SigningMaterial,
	verifier: SignatureVerifier,
}
impl RequestSigner {
	/// Builds an HMAC-SHA256 signer. Empty secrets are rejected.
	pub fn hmac_sha256(secret: impl AsRef<[u8]>) -> Result<Self, SigningError> {
		let mac = hmac_key(secret.as_ref())?;

		Ok(Self {
			key: SigningMaterial::Hmac(mac.clone()),
			verifier: SignatureVerifier { key: VerificationMaterial::Hmac(mac) },
		})
	}

	/// Builds an RSA-SHA256 signer from a PKCS#8 or PKCS#1 PEM private key.
	pub fn rsa_sha256_pem(pem: &str) -> Result<Self, SigningError> {
		let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
			.or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
			.map_err(malformed)?;

		private_key.validate().map_err(malformed)?;

		let verifying_key = VerifyingKey::<Sha256>::new(private_key.to_public_key());

		Ok(Self {
			key: SigningMaterial::Rsa(SigningKey::<Sha256>::new(private_key)),
			verifier: SignatureVerifier { key: VerificationMaterial::Rsa(verifying_key) },
		})
	}

	/// Scheme implemented by this signer.
	pub fn scheme(&self) -> SignatureScheme {
		match self.key {
			SigningMaterial::Hmac(_) => SignatureScheme::HmacSha256,
			SigningMaterial::Rsa(_) => SignatureScheme::RsaSha256,
		}
	}

	/// Signs `payload`, returning the base64-encoded signature.
	pub fn sign(&self, payload: &[u8]) -> Result<String, SigningError> {
		let raw = match &self.key {
			SigningMaterial::Hmac(prototype) => {
				let mut mac = prototype.clone();

				mac.update(payload);

				mac.finalize().into_bytes().to_vec()
			},
			SigningMaterial::Rsa(key) => key
				.try_sign(payload)
				.map_err(|e| SigningError::Sign(Box::new(e)))?
				.to_vec(),
		};

		Ok(STANDARD.encode(raw))
	}

	/// Checks a base64 `signature` against `payload` with this signer's own key.
	pub fn verify(&self, signature: &str, payload: &[u8]) -> bool {
		self.verifier.verify(signature, payload)
	}

	/// Verifier that accepts signatures produced by this signer.
	pub fn verifier(&self) -> &SignatureVerifier {
		&self.verifier
	}
}
impl Debug for RequestSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestSigner").field("scheme", &self.scheme()).finish_non_exhaustive()
	}
}

/// Verifies signatures on inbound payloads such as provider callbacks.
#[derive(Clone)]
pub struct SignatureVerifier {
	key: VerificationMaterial,
}
impl SignatureVerifier {
	/// Builds an HMAC-SHA256 verifier. Empty secrets are rejected.
	pub fn hmac_sha256(secret: impl AsRef<[u8]>) -> Result<Self, SigningError> {
		Ok(Self { key: VerificationMaterial::Hmac(hmac_key(secret.as_ref())?) })
	}

	/// Builds an RSA-SHA256 verifier from an SPKI or PKCS#1 PEM public key.
	pub fn rsa_sha256_public_pem(pem: &str) -> Result<Self, SigningError> {
		let public_key = RsaPublicKey::from_public_key_pem(pem)
			.or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
			.map_err(malformed)?;

		Ok(Self { key: VerificationMaterial::Rsa(VerifyingKey::<Sha256>::new(public_key)) })
	}

	/// Returns `true` only if `signature` (base64) authenticates `payload`.
	///
	/// HMAC tags are compared in constant time.
	pub fn verify(&self, signature: &str, payload: &[u8]) -> bool {
		let Ok(raw) = STANDARD.decode(signature.trim()) else {
			return false;
		};

		match &self.key {
			VerificationMaterial::Hmac(prototype) => {
				let mut mac = prototype.clone();

				mac.update(payload);

				mac.verify_slice(&raw).is_ok()
			},
			VerificationMaterial::Rsa(key) => Signature::try_from(raw.as_slice())
				.is_ok_and(|signature| key.verify(payload, &signature).is_ok()),
		}
	}
}
impl Debug for SignatureVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let scheme = match self.key {
			VerificationMaterial::Hmac(_) => SignatureScheme::HmacSha256,
			VerificationMaterial::Rsa(_) => SignatureScheme::RsaSha256,
		};

		f.debug_struct("SignatureVerifier").field("scheme", &scheme).finish_non_exhaustive()
	}
}

#[derive(Clone)]
enum SigningMaterial {
	Hmac(HmacSha256),
	Rsa(SigningKey<Sha256>),
}

#[derive(Clone)]
enum VerificationMaterial {
	Hmac(HmacSha256),
	Rsa(VerifyingKey<Sha256>),
}

/// Joins provider-selected field values into the string that gets signed.
///
/// Providers that sign a canonical string instead of the raw body pick the fields and the
/// separator; this helper only concatenates them in the given order.
pub fn canonical_input<I, S>(fields: I, separator: &str) -> String
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut buf = String::new();

	for (idx, field) in fields.into_iter().enumerate() {
		if idx > 0 {
			buf.push_str(separator);
		}

		buf.push_str(field.as_ref());
	}

	buf
}

fn hmac_key(secret: &[u8]) -> Result<HmacSha256, SigningError> {
	if secret.is_empty() {
		return Err(SigningError::MalformedKey { reason: "HMAC secret is empty".into() });
	}

	HmacSha256::new_from_slice(secret).map_err(malformed)
}

fn malformed(e: impl Display) -> SigningError {
	SigningError::MalformedKey { reason: e.to_string() }
}
