//! Thread-safe in-memory [`TokenCache`] implementation.

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, CachedToken},
	cache::TokenCache,
};

type CacheMap = Arc<RwLock<HashMap<CacheKey, CachedToken>>>;

/// In-process token cache guarded by a read-write lock.
///
/// Lookups report a miss once a token's remaining lifetime drops below the safety margin
/// (60 seconds unless overridden, capped at half the token's lifetime) and lazily evict entries
/// that are already expired.
#[derive(Clone, Debug)]
pub struct MemoryTokenCache {
	entries: CacheMap,
	safety_margin: Duration,
}
impl MemoryTokenCache {
	/// Safety margin applied when none is configured.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Creates an empty cache with the default safety margin.
	pub fn new() -> Self {
		Self::with_safety_margin(Self::DEFAULT_SAFETY_MARGIN)
	}

	/// Creates an empty cache with a custom safety margin (negative values clamp to zero).
	pub fn with_safety_margin(margin: Duration) -> Self {
		let safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		Self { entries: Default::default(), safety_margin }
	}

	/// Safety margin applied by lookups.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Number of stored entries, including ones inside the safety margin.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Drops every entry expired at `now`, returning how many were removed.
	pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
		let mut guard = self.entries.write();
		let before = guard.len();

		guard.retain(|_, token| !token.is_expired_at(now));

		before - guard.len()
	}

	fn evict_if_expired(&self, key: &CacheKey, now: OffsetDateTime) {
		let mut guard = self.entries.write();

		if guard.get(key).is_some_and(|token| token.is_expired_at(now)) {
			guard.remove(key);
		}
	}
}
impl Default for MemoryTokenCache {
	fn default() -> Self {
		Self::new()
	}
}
impl TokenCache for MemoryTokenCache {
	fn get_at(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CachedToken> {
		let expired = {
			let guard = self.entries.read();
			let token = guard.get(key)?;

			if token.is_usable_at(now, self.safety_margin) {
				return Some(token.clone());
			}

			token.is_expired_at(now)
		};

		if expired {
			self.evict_if_expired(key, now);
		}

		None
	}

	fn insert(&self, key: CacheKey, token: CachedToken) {
		self.entries.write().insert(key, token);
	}

	fn invalidate(&self, key: &CacheKey) -> Option<CachedToken> {
		self.entries.write().remove(key)
	}
}
