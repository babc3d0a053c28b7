//! Token cache contract and the built-in in-memory implementation.
//!
//! A [`TokenCache`] is an explicitly owned value injected into each
//! [`TokenProvider`](crate::token::TokenProvider); there is no process-global instance, so two
//! clients never observe each other's tokens unless they share a cache on purpose.

pub mod memory;

pub use memory::MemoryTokenCache;

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, CachedToken, CachedTokenBuilderError, Secret},
};

/// Time-bounded storage for bearer tokens.
///
/// Implementations serialize access internally so concurrent callers need no external locking,
/// and must never perform network I/O.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Returns the token for `key` only if it stays valid beyond the cache's safety margin at
	/// `now`.
	fn get_at(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CachedToken>;

	/// Stores or replaces the token for `key`.
	fn insert(&self, key: CacheKey, token: CachedToken);

	/// Removes the token for `key`, returning the evicted value.
	fn invalidate(&self, key: &CacheKey) -> Option<CachedToken>;

	/// Returns the token for `key` relative to the current UTC clock.
	fn get(&self, key: &CacheKey) -> Option<CachedToken> {
		self.get_at(key, OffsetDateTime::now_utc())
	}

	/// Stores `value` for `key`, valid for `ttl` from now.
	///
	/// Lifetimes that are not positive or exceed [`CachedToken::MAX_LIFETIME`] are refused and
	/// leave the cache untouched.
	fn set(
		&self,
		key: CacheKey,
		value: Secret,
		ttl: Duration,
	) -> Result<CachedToken, CachedTokenBuilderError> {
		let token = CachedToken::builder()
			.value(value.expose())
			.issued_at(OffsetDateTime::now_utc())
			.expires_in(ttl)
			.build()?;

		self.insert(key, token.clone());

		Ok(token)
	}
}
