//! Poll-until-terminal protocol for operations that are submitted now and confirmed later.
//!
//! [`AsyncOperationPoller`] queries a [`StatusSource`] strictly sequentially. A `Successful`
//! answer ends the wait, a `Failed` answer becomes [`Error::TerminalFailure`] without further
//! queries, an unrecognized label aborts with [`Error::UnknownStatus`], and any error from the
//! source is returned as-is. Each `Pending` answer counts against the [`RetryPolicy`] budget and
//! is followed by a jittered backoff sleep. The caller's cancellation future is checked before
//! every query and raced against both the query and the sleep.

pub mod policy;
pub mod status;

pub use policy::*;
pub use status::*;

// std
use std::pin::pin;
// crates.io
use futures::future::{self, Either};
// self
use crate::{
	_prelude::*,
	auth::OperationReference,
	gateway::GatewayExecutor,
	http::{GatewayHttpClient, TransportErrorMapper},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Boxed future returned by [`StatusSource::query`].
pub type StatusFuture<'a> = Pin<Box<dyn Future<Output = Result<StatusReport>> + Send + 'a>>;
/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Anything that can report the current status of a submitted operation.
pub trait StatusSource
where
	Self: Send + Sync,
{
	/// Fetches the current status of `reference`.
	fn query<'a>(&'a self, reference: &'a OperationReference) -> StatusFuture<'a>;
}

/// Timer used between status queries.
pub trait Sleeper
where
	Self: Send + Sync,
{
	/// Completes after `duration`.
	fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;
impl Sleeper for TokioSleeper {
	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		Box::pin(tokio::time::sleep(duration.unsigned_abs()))
	}
}

/// [`StatusSource`] that issues status queries through a [`GatewayExecutor`].
pub struct GatewayStatusSource<C, M, Q>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Executor used for each query.
	pub executor: Arc<GatewayExecutor<C, M>>,
	/// Request builder and response interpreter.
	pub query: Q,
}
impl<C, M, Q> GatewayStatusSource<C, M, Q>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
	Q: StatusQuery,
{
	/// Creates a source for `executor` and `query`.
	pub fn new(executor: impl Into<Arc<GatewayExecutor<C, M>>>, query: Q) -> Self {
		Self { executor: executor.into(), query }
	}
}
impl<C, M, Q> StatusSource for GatewayStatusSource<C, M, Q>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
	Q: StatusQuery,
{
	fn query<'a>(&'a self, reference: &'a OperationReference) -> StatusFuture<'a> {
		Box::pin(async move {
			let response = self.executor.execute(self.query.request(reference)).await?;

			self.query.parse(&response)
		})
	}
}
impl<C, M, Q> Debug for GatewayStatusSource<C, M, Q>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
	Q: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatewayStatusSource").field("query", &self.query).finish_non_exhaustive()
	}
}

/// Turns a submitted operation into a bounded wait for its terminal state.
#[derive(Debug)]
pub struct AsyncOperationPoller<S, Z = TokioSleeper> {
	source: S,
	sleeper: Z,
}
impl<S> AsyncOperationPoller<S>
where
	S: StatusSource,
{
	/// Creates a poller that sleeps on the tokio timer.
	pub fn new(source: S) -> Self {
		Self { source, sleeper: TokioSleeper }
	}
}
impl<S, Z> AsyncOperationPoller<S, Z>
where
	S: StatusSource,
	Z: Sleeper,
{
	/// Replaces the timer.
	pub fn with_sleeper<Z2>(self, sleeper: Z2) -> AsyncOperationPoller<S, Z2>
	where
		Z2: Sleeper,
	{
		AsyncOperationPoller { source: self.source, sleeper }
	}

	/// Status source queried by this poller.
	pub fn source(&self) -> &S {
		&self.source
	}

	/// Polls `reference` until it reaches a terminal state or `policy` runs out, without a
	/// cancellation signal.
	pub async fn poll(
		&self,
		reference: &OperationReference,
		policy: &RetryPolicy,
	) -> Result<StatusReport> {
		self.poll_until_terminal(reference, policy, future::pending()).await
	}

	/// Polls `reference` until it reaches a terminal state, `policy` runs out, or `cancel`
	/// completes.
	///
	/// Returns the successful report, or one of [`Error::TerminalFailure`], [`Error::Timeout`],
	/// [`Error::UnknownStatus`], [`Error::Cancelled`], or the source's own error.
	pub async fn poll_until_terminal<F>(
		&self,
		reference: &OperationReference,
		policy: &RetryPolicy,
		cancel: F,
	) -> Result<StatusReport>
	where
		F: Future<Output = ()>,
	{
		const KIND: OpKind = OpKind::StatusPoll;

		let span = OpSpan::new(KIND, "poll_until_terminal");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.run(reference, policy, cancel)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		result
	}

	async fn run<F>(
		&self,
		reference: &OperationReference,
		policy: &RetryPolicy,
		cancel: F,
	) -> Result<StatusReport>
	where
		F: Future<Output = ()>,
	{
		let cancelled = || Error::Cancelled { reference: reference.clone() };
		let mut cancel = pin!(cancel);
		let mut attempt = 0_u32;
		let mut queries = 0_u32;

		loop {
			if futures::poll!(cancel.as_mut()).is_ready() {
				return Err(cancelled());
			}

			let report = match future::select(cancel.as_mut(), self.source.query(reference)).await {
				Either::Left(_) => return Err(cancelled()),
				Either::Right((result, _)) => result?,
			};

			queries += 1;

			match report.status {
				OperationStatus::Successful => return Ok(report),
				OperationStatus::Failed(reason) =>
					return Err(Error::TerminalFailure { reference: reference.clone(), reason }),
				OperationStatus::Unknown(label) =>
					return Err(Error::UnknownStatus { reference: reference.clone(), label }),
				OperationStatus::Pending => {},
			}

			attempt += 1;

			if attempt > policy.max_attempts() {
				return Err(Error::Timeout { reference: reference.clone(), attempts: queries });
			}

			let delay = policy.sample_delay(attempt);

			obs::debug_event!(reference = %reference, attempt, delay = %delay, "operation pending");

			if let Either::Left(_) = future::select(cancel.as_mut(), self.sleeper.sleep(delay)).await {
				return Err(cancelled());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::VecDeque;
	// self
	use super::*;

	#[derive(Default)]
	struct ScriptedSource {
		script: Mutex<VecDeque<Result<OperationStatus>>>,
		queries: Mutex<u32>,
	}
	impl ScriptedSource {
		fn new(script: impl IntoIterator<Item = Result<OperationStatus>>) -> Self {
			Self { script: Mutex::new(script.into_iter().collect()), queries: Mutex::new(0) }
		}

		fn statuses(script: impl IntoIterator<Item = OperationStatus>) -> Self {
			Self::new(script.into_iter().map(Ok))
		}

		fn queries(&self) -> u32 {
			*self.queries.lock()
		}
	}
	impl StatusSource for ScriptedSource {
		fn query<'a>(&'a self, _reference: &'a OperationReference) -> StatusFuture<'a> {
			*self.queries.lock() += 1;

			let next = self.script.lock().pop_front().unwrap_or(Ok(OperationStatus::Pending));

			Box::pin(async move { next.map(StatusReport::new) })
		}
	}

	#[derive(Default)]
	struct RecordingSleeper {
		sleeps: Mutex<Vec<Duration>>,
	}
	impl RecordingSleeper {
		fn sleeps(&self) -> Vec<Duration> {
			self.sleeps.lock().clone()
		}
	}
	impl Sleeper for Arc<RecordingSleeper> {
		fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
			self.sleeps.lock().push(duration);

			Box::pin(async {})
		}
	}

	struct HangingSource;
	impl StatusSource for HangingSource {
		fn query<'a>(&'a self, _reference: &'a OperationReference) -> StatusFuture<'a> {
			Box::pin(future::pending())
		}
	}

	fn reference() -> OperationReference {
		OperationReference::new("7f1f0f8e-4b5e-4d1c-9d0a-0f4b1c8e2a11").expect("Reference should be valid.")
	}

	fn no_jitter(max_attempts: u32) -> RetryPolicy {
		RetryPolicy::new(max_attempts, Duration::seconds(1), Duration::seconds(30), 0.0)
			.expect("Policy should be valid.")
	}

	fn recording_poller(
		source: ScriptedSource,
	) -> (AsyncOperationPoller<ScriptedSource, Arc<RecordingSleeper>>, Arc<RecordingSleeper>) {
		let sleeper = Arc::new(RecordingSleeper::default());

		(AsyncOperationPoller::new(source).with_sleeper(sleeper.clone()), sleeper)
	}

	#[tokio::test]
	async fn pending_then_successful_takes_three_queries_and_two_sleeps() {
		use OperationStatus::*;

		let (poller, sleeper) = recording_poller(ScriptedSource::statuses([Pending, Pending, Successful]));
		let report = poller.poll(&reference(), &no_jitter(6)).await.expect("Poll should succeed.");

		assert_eq!(report.status, Successful);
		assert_eq!(poller.source().queries(), 3);
		assert_eq!(sleeper.sleeps(), vec![Duration::seconds(2), Duration::seconds(4)]);
	}

	#[tokio::test]
	async fn failure_is_terminal_and_stops_querying() {
		use OperationStatus::*;

		let (poller, sleeper) = recording_poller(ScriptedSource::statuses([
			Pending,
			Failed("INSUFFICIENT_FUNDS".into()),
			Successful,
		]));
		let err = poller.poll(&reference(), &no_jitter(6)).await.expect_err("Poll should fail.");

		assert!(matches!(
			err,
			Error::TerminalFailure { ref reason, .. } if reason == "INSUFFICIENT_FUNDS"
		));
		assert_eq!(poller.source().queries(), 2);
		assert_eq!(sleeper.sleeps().len(), 1);
	}

	#[tokio::test]
	async fn exhausted_budget_reports_a_timeout() {
		let (poller, sleeper) = recording_poller(ScriptedSource::statuses([]));
		let err = poller.poll(&reference(), &no_jitter(3)).await.expect_err("Poll should time out.");

		assert!(matches!(err, Error::Timeout { attempts: 4, .. }));
		assert_eq!(poller.source().queries(), 4);
		assert_eq!(
			sleeper.sleeps(),
			vec![Duration::seconds(2), Duration::seconds(4), Duration::seconds(8)]
		);
	}

	#[tokio::test]
	async fn zero_budget_allows_exactly_one_query() {
		let (poller, sleeper) = recording_poller(ScriptedSource::statuses([]));
		let err = poller.poll(&reference(), &no_jitter(0)).await.expect_err("Poll should time out.");

		assert!(matches!(err, Error::Timeout { attempts: 1, .. }));
		assert!(sleeper.sleeps().is_empty());
	}

	#[tokio::test]
	async fn unknown_labels_and_source_errors_abort_immediately() {
		let (poller, _) = recording_poller(ScriptedSource::statuses([
			OperationStatus::Pending,
			OperationStatus::Unknown("ON_HOLD".into()),
		]));
		let err = poller.poll(&reference(), &no_jitter(6)).await.expect_err("Poll should abort.");

		assert!(matches!(err, Error::UnknownStatus { ref label, .. } if label == "ON_HOLD"));
		assert_eq!(poller.source().queries(), 2);

		let (poller, sleeper) = recording_poller(ScriptedSource::new([Err(
			crate::error::TransportError::Io(std::io::Error::other("reset")).into(),
		)]));
		let err = poller.poll(&reference(), &no_jitter(6)).await.expect_err("Poll should abort.");

		assert!(err.is_transport());
		assert_eq!(poller.source().queries(), 1);
		assert!(sleeper.sleeps().is_empty());
	}

	#[tokio::test]
	async fn jittered_sleeps_stay_within_bounds() {
		let policy = RetryPolicy::new(5, Duration::seconds(1), Duration::seconds(30), 0.5)
			.expect("Policy should be valid.");
		let (poller, sleeper) = recording_poller(ScriptedSource::statuses([]));

		poller.poll(&reference(), &policy).await.expect_err("Poll should time out.");

		for (idx, slept) in sleeper.sleeps().into_iter().enumerate() {
			let base = policy.delay_for(idx as u32 + 1);

			assert!(slept >= base && slept < base * 1.5, "sleep {idx}: {slept}");
		}
	}

	#[tokio::test]
	async fn already_cancelled_waits_issue_no_queries() {
		let (poller, _) = recording_poller(ScriptedSource::statuses([OperationStatus::Successful]));
		let err = poller
			.poll_until_terminal(&reference(), &no_jitter(6), future::ready(()))
			.await
			.expect_err("Poll should be cancelled.");

		assert!(matches!(err, Error::Cancelled { .. }));
		assert_eq!(poller.source().queries(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_interrupts_the_backoff_sleep() {
		let poller = AsyncOperationPoller::new(ScriptedSource::statuses([]));
		let policy = RetryPolicy::new(6, Duration::seconds(10), Duration::seconds(30), 0.0)
			.expect("Policy should be valid.");
		let started = tokio::time::Instant::now();
		let err = poller
			.poll_until_terminal(
				&reference(),
				&policy,
				tokio::time::sleep(std::time::Duration::from_millis(100)),
			)
			.await
			.expect_err("Poll should be cancelled.");
		let elapsed = started.elapsed();

		assert!(matches!(err, Error::Cancelled { .. }));
		assert_eq!(poller.source().queries(), 1);
		assert!(elapsed >= std::time::Duration::from_millis(100));
		assert!(elapsed < std::time::Duration::from_millis(150), "{elapsed:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_interrupts_a_hanging_query() {
		let poller = AsyncOperationPoller::new(HangingSource);
		let err = poller
			.poll_until_terminal(
				&reference(),
				&RetryPolicy::default(),
				tokio::time::sleep(std::time::Duration::from_millis(20)),
			)
			.await
			.expect_err("Poll should be cancelled.");

		assert!(matches!(err, Error::Cancelled { .. }));
	}
}
