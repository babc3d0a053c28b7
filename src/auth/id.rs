//! Validated identifiers for providers, products, and operation references.
//!
//! Provider ids and product scopes are slugs: they key the token cache and the product map of a
//! configuration file. Operation references travel in a request header and are substituted into
//! status paths, so they are restricted to visible ASCII without URL delimiters. Mobile-money
//! gateways additionally require them to be UUIDs, which [`OperationReference::generate`] and
//! [`OperationReference::parse_uuid`] guarantee.

// std
use std::{borrow::Borrow, marker::PhantomData, ops::Deref};
// crates.io
use serde::{Deserializer, Serializer, de::Error as _};
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Naming rules for one family of identifiers.
pub trait IdentKind {
	/// Label used in errors and `Debug` output.
	const LABEL: &'static str;
	/// Longest accepted identifier, in bytes.
	const MAX_LEN: usize;

	/// Returns `true` if `c` may appear in the identifier.
	fn allows(c: char) -> bool;
}

/// Marker for [`ProviderId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {}
impl IdentKind for ProviderKind {
	const LABEL: &'static str = "Provider";
	const MAX_LEN: usize = 64;

	fn allows(c: char) -> bool {
		is_slug_char(c)
	}
}

/// Marker for [`ProductScope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProductKind {}
impl IdentKind for ProductKind {
	const LABEL: &'static str = "Product";
	const MAX_LEN: usize = 64;

	fn allows(c: char) -> bool {
		is_slug_char(c)
	}
}

/// Marker for [`OperationReference`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceKind {}
impl IdentKind for ReferenceKind {
	const LABEL: &'static str = "Reference";
	const MAX_LEN: usize = 128;

	fn allows(c: char) -> bool {
		c.is_ascii_graphic() && !matches!(c, '/' | '?' | '#' | '%')
	}
}

/// Payment provider named by a descriptor (e.g. `mtn-momo`).
pub type ProviderId = Ident<ProviderKind>;
/// Product or sub-scope sharing one credential (e.g. `collection`, `disbursement`).
pub type ProductScope = Ident<ProductKind>;
/// Identifier correlating a submitted asynchronous operation with later status queries.
pub type OperationReference = Ident<ReferenceKind>;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier family.
		kind: &'static str,
	},
	/// The identifier exceeded the family's length limit.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Identifier family.
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
	/// The identifier contains a character the family does not allow.
	#[error("{kind} identifier contains {character:?}.")]
	InvalidCharacter {
		/// Identifier family.
		kind: &'static str,
		/// First offending character.
		character: char,
	},
	/// The reference is not a UUID.
	#[error("Reference `{value}` is not a UUID.")]
	NotUuid {
		/// Rejected input.
		value: String,
	},
}

/// Identifier validated against the rules of `K`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident<K> {
	value: String,
	kind: PhantomData<K>,
}
impl<K> Ident<K>
where
	K: IdentKind,
{
	/// Validates `value` against the family's rules.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		check::<K>(view)?;

		Ok(Self::trusted(view.to_owned()))
	}

	fn trusted(value: String) -> Self {
		Self { value, kind: PhantomData }
	}
}
impl OperationReference {
	/// Generates a fresh UUID v4 reference for a new logical operation.
	pub fn generate() -> Self {
		Self::from_uuid(Uuid::new_v4())
	}

	/// Wraps an existing UUID in its lowercase hyphenated form.
	pub fn from_uuid(uuid: Uuid) -> Self {
		Self::trusted(uuid.hyphenated().to_string())
	}

	/// Accepts only UUID input, normalizing it to the lowercase hyphenated form.
	pub fn parse_uuid(value: &str) -> Result<Self, IdentifierError> {
		Uuid::parse_str(value)
			.map(Self::from_uuid)
			.map_err(|_| IdentifierError::NotUuid { value: value.to_owned() })
	}

	/// The reference as a UUID, if it is one.
	pub fn as_uuid(&self) -> Option<Uuid> {
		Uuid::parse_str(&self.value).ok()
	}
}
impl<K> Deref for Ident<K> {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.value
	}
}
impl<K> AsRef<str> for Ident<K> {
	fn as_ref(&self) -> &str {
		&self.value
	}
}
impl<K> Borrow<str> for Ident<K> {
	fn borrow(&self) -> &str {
		&self.value
	}
}
impl<K> From<Ident<K>> for String {
	fn from(ident: Ident<K>) -> Self {
		ident.value
	}
}
impl<K> TryFrom<String> for Ident<K>
where
	K: IdentKind,
{
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		check::<K>(&value)?;

		Ok(Self::trusted(value))
	}
}
impl<K> FromStr for Ident<K>
where
	K: IdentKind,
{
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl<K> Debug for Ident<K>
where
	K: IdentKind,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}({})", K::LABEL, self.value)
	}
}
impl<K> Display for Ident<K> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.value)
	}
}
impl<K> Serialize for Ident<K> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.value)
	}
}
impl<'de, K> Deserialize<'de> for Ident<K>
where
	K: IdentKind,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Self::try_from(String::deserialize(deserializer)?).map_err(D::Error::custom)
	}
}

fn is_slug_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn check<K>(view: &str) -> Result<(), IdentifierError>
where
	K: IdentKind,
{
	let kind = K::LABEL;

	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.len() > K::MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: K::MAX_LEN });
	}
	if let Some(character) = view.chars().find(|c| !K::allows(*c)) {
		return Err(IdentifierError::InvalidCharacter { kind, character });
	}

	Ok(())
}
