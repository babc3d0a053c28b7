//! Optional observability helpers for token exchanges, gateway calls, and status polling.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `paygate.op` with the `op` (operation kind)
//!   and `stage` (call site) fields, plus debug events for cache hits, retries, and poll
//!   transitions.
//! - Enable `metrics` to increment the `paygate_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

pub(crate) use self::tracing::debug_event;

// self
use crate::_prelude::*;

/// Operation kinds observed by the gateway core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Identity-endpoint token exchange.
	TokenExchange,
	/// Authenticated gateway call.
	GatewayCall,
	/// Asynchronous operation status polling.
	StatusPoll,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::TokenExchange => "token_exchange",
			OpKind::GatewayCall => "gateway_call",
			OpKind::StatusPoll => "status_poll",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}

	/// Maps a result onto its terminal outcome label.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure }
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
