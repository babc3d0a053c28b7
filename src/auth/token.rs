//! Cached bearer token model, lifecycle helpers, and builder.

// self
use crate::{_prelude::*, auth::Secret};

/// Lifecycle status of a cached token relative to a safety margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is valid for longer than the safety margin.
	Active,
	/// Token is still valid but expires within the safety margin.
	Expiring,
	/// Token reached its expiry instant.
	Expired,
}

/// Errors produced by [`CachedTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CachedTokenBuilderError {
	/// Issued when no token value was provided.
	#[error("Token value is required.")]
	MissingValue,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry falls before issuance or beyond [`CachedToken::MAX_LIFETIME`].
	#[error("Token lifetime must be positive and at most one year.")]
	LifetimeOutOfRange,
}

/// Bearer token stored by a [`TokenCache`](crate::cache::TokenCache).
#[derive(Clone)]
pub struct CachedToken {
	/// Opaque token value; callers must avoid logging it.
	pub value: Secret,
	/// Instant the token was issued.
	pub issued_at: OffsetDateTime,
	/// Instant the token stops being accepted by the provider.
	pub expires_at: OffsetDateTime,
}
impl CachedToken {
	/// Longest lifetime accepted from an identity endpoint.
	pub const MAX_LIFETIME: Duration = Duration::days(366);

	/// Creates a token valid for `ttl` from `issued_at`, saturating at the calendar bounds.
	pub fn new(value: impl Into<String>, issued_at: OffsetDateTime, ttl: Duration) -> Self {
		Self { value: Secret::new(value), issued_at, expires_at: issued_at.saturating_add(ttl) }
	}

	/// Returns a builder for constructing tokens from provider responses.
	pub fn builder() -> CachedTokenBuilder {
		CachedTokenBuilder::default()
	}

	/// Remaining lifetime at `instant` (negative once expired).
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}

	/// Lifetime granted at issuance.
	pub fn lifetime(&self) -> Duration {
		self.expires_at - self.issued_at
	}

	/// Safety margin actually applied to this token: the requested margin, capped at half the
	/// granted lifetime so short-lived tokens are still served for their first half.
	pub fn effective_margin(&self, safety_margin: Duration) -> Duration {
		safety_margin.min(self.lifetime() / 2).max(Duration::ZERO)
	}

	/// Computes the lifecycle status at `instant` for the provided safety margin.
	pub fn status_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		if instant >= self.expires_at - self.effective_margin(safety_margin) {
			return TokenStatus::Expiring;
		}

		TokenStatus::Active
	}

	/// Returns `true` if the token may be handed to a caller at `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> bool {
		matches!(self.status_at(instant, safety_margin), TokenStatus::Active)
	}

	/// Returns `true` if the token has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Renders the `Authorization: Bearer` header value.
	pub fn bearer_authorization(&self) -> String {
		format!("Bearer {}", self.value.expose())
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("value", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`CachedToken`].
#[derive(Clone, Debug, Default)]
pub struct CachedTokenBuilder {
	value: Option<Secret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CachedTokenBuilder {
	/// Provides the token value.
	pub fn value(mut self, token: impl Into<String>) -> Self {
		self.value = Some(Secret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`CachedToken`].
	pub fn build(self) -> Result<CachedToken, CachedTokenBuilderError> {
		let value = self.value.ok_or(CachedTokenBuilderError::MissingValue)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at
				.checked_add(delta)
				.ok_or(CachedTokenBuilderError::LifetimeOutOfRange)?,
			(None, None) => return Err(CachedTokenBuilderError::MissingExpiry),
		};
		let lifetime = expires_at - issued_at;

		if !lifetime.is_positive() || lifetime > CachedToken::MAX_LIFETIME {
			return Err(CachedTokenBuilderError::LifetimeOutOfRange);
		}

		Ok(CachedToken { value, issued_at, expires_at })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn status_transitions_respect_safety_margin() {
		let token = CachedToken::builder()
			.value("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Token builder should succeed for status transitions.");
		let margin = Duration::seconds(60);

		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:30 UTC), margin),
			TokenStatus::Active
		);
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:59:00 UTC), margin),
			TokenStatus::Expiring
		);
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:59:30 UTC), margin),
			TokenStatus::Expiring
		);
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 01:00 UTC), margin),
			TokenStatus::Expired
		);
		assert!(token.is_usable_at(macros::datetime!(2025-01-01 00:58:59 UTC), margin));
		assert!(!token.is_usable_at(macros::datetime!(2025-01-01 00:59:00 UTC), margin));
	}

	#[test]
	fn builder_handles_relative_expiry_and_missing_fields() {
		let token = CachedToken::builder()
			.value("secret")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Token builder should support relative expiry calculations.");

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert_eq!(
			token.remaining_at(macros::datetime!(2025-01-01 00:10 UTC)),
			Duration::minutes(20)
		);
		assert_eq!(
			CachedToken::builder().expires_in(Duration::MINUTE).build().unwrap_err(),
			CachedTokenBuilderError::MissingValue
		);
		assert_eq!(
			CachedToken::builder().value("v").build().unwrap_err(),
			CachedTokenBuilderError::MissingExpiry
		);
	}

	#[test]
	fn builder_rejects_unrepresentable_and_inverted_lifetimes() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);

		for delta in [Duration::seconds(i64::MAX), Duration::days(367), Duration::seconds(-1)] {
			assert_eq!(
				CachedToken::builder().value("v").issued_at(issued).expires_in(delta).build().unwrap_err(),
				CachedTokenBuilderError::LifetimeOutOfRange,
				"Lifetime {delta} must be rejected."
			);
		}

		let saturated = CachedToken::new("v", issued, Duration::seconds(i64::MAX));

		assert!(saturated.expires_at > issued);
	}

	#[test]
	fn short_lifetimes_cap_the_margin_at_half() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = CachedToken::new("short", issued, Duration::seconds(45));
		let margin = Duration::seconds(60);

		assert_eq!(token.effective_margin(margin), Duration::milliseconds(22_500));
		assert!(token.is_usable_at(issued, margin));
		assert!(token.is_usable_at(issued + Duration::seconds(22), margin));
		assert_eq!(token.status_at(issued + Duration::seconds(23), margin), TokenStatus::Expiring);
		assert_eq!(
			CachedToken::new("long", issued, Duration::HOUR).effective_margin(margin),
			margin
		);
	}

	#[test]
	fn debug_redacts_value() {
		let token = CachedToken::new("bearer-value", OffsetDateTime::now_utc(), Duration::HOUR);

		assert!(!format!("{token:?}").contains("bearer-value"));
		assert_eq!(token.bearer_authorization(), "Bearer bearer-value");
	}
}
