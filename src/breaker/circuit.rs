//! Circuit Breaker
//!
//! One breaker guards one downstream service.
//!
//! # State Transitions
//! ```text
//! CLOSED    -> OPEN       failure rate > threshold over the evaluation window
//! OPEN      -> HALF_OPEN  reset timeout elapsed, next caller becomes the trial
//! HALF_OPEN -> CLOSED     trial succeeded (window cleared)
//! HALF_OPEN -> OPEN       trial failed or was abandoned (timer restarts)
//! ```
//!
//! All transitions happen under the breaker's own mutex, which is never held
//! across the downstream call. Every transition bumps a generation counter;
//! outcomes of calls admitted under an older generation are dropped, so the
//! first decisive outcome wins and late arrivals see the new state.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::breaker::state::to_datetime;
use crate::breaker::{BreakerSnapshot, CircuitBreakerConfig, CircuitState};
use crate::cache::current_timestamp_ms;

// == Failure Classification ==
/// Tells the breaker whether an error means the downstream is unhealthy.
///
/// Errors caused by the caller (bad input, validation) must return false so
/// one client's mistakes cannot open the circuit for everyone.
pub trait TripsBreaker {
    /// True when the error should count toward the failure rate.
    fn trips_breaker(&self) -> bool;
}

// == Errors ==
/// A call was rejected because the circuit is not accepting traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit {state} for service '{service}'")]
pub struct CircuitOpenError {
    /// Guarded service
    pub service: String,
    /// State at rejection time (OPEN, or HALF_OPEN with a trial in flight)
    pub state: CircuitState,
    /// Unix milliseconds of the next trial; None while forced open
    pub next_probe_at: Option<u64>,
}

impl CircuitOpenError {
    /// Time left until the breaker lets a trial through.
    pub fn retry_after(&self) -> Option<Duration> {
        let at = self.next_probe_at?;
        Some(Duration::from_millis(
            at.saturating_sub(current_timestamp_ms()),
        ))
    }
}

/// Result of `CircuitBreaker::execute` when the call did not succeed.
#[derive(Debug, Error)]
pub enum ExecuteError<E> {
    /// The breaker rejected the call; the operation never ran
    #[error(transparent)]
    Rejected(CircuitOpenError),
    /// The operation ran and failed
    #[error("operation failed")]
    Failed(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Completed with an error that does not count
    Neutral,
    /// Permit dropped without an outcome
    Abandoned,
}

// == Breaker State ==
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Most recent counted outcomes, true = failure
    outcomes: VecDeque<bool>,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<u64>,
    next_probe_at: Option<u64>,
    trial_in_flight: bool,
    forced: bool,
    generation: u64,
    consecutive_trips: u32,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            outcomes: VecDeque::new(),
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            next_probe_at: None,
            trial_in_flight: false,
            forced: false,
            generation: 0,
            consecutive_trips: 0,
        }
    }

    fn push_outcome(&mut self, failed: bool, window: usize) {
        self.outcomes.push_back(failed);
        if failed {
            self.failure_count += 1;
        } else {
            self.success_count += 1;
        }
        while self.outcomes.len() > window.max(1) {
            match self.outcomes.pop_front() {
                Some(true) => self.failure_count -= 1,
                Some(false) => self.success_count -= 1,
                None => break,
            }
        }
    }

    /// Failures as a percentage of the full window; unfilled slots count as
    /// non-failures.
    fn failure_rate(&self, window: usize) -> f64 {
        f64::from(self.failure_count) * 100.0 / window.max(1) as f64
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.outcomes.clear();
        self.failure_count = 0;
        self.success_count = 0;
        self.next_probe_at = None;
        self.trial_in_flight = false;
        self.forced = false;
        self.consecutive_trips = 0;
        self.generation += 1;
    }

    fn open(&mut self, next_probe_at: Option<u64>) {
        self.state = CircuitState::Open;
        self.next_probe_at = next_probe_at;
        self.trial_in_flight = false;
        self.generation += 1;
    }
}

// == Circuit Breaker ==
/// Per-service circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for `service`.
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    /// Guarded service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    // The state is consistent after every critical section, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Point-in-time view for operators.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            service: self.service.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_rate: inner.failure_rate(self.config.evaluation_window),
            last_failure_at: inner.last_failure_at.and_then(to_datetime),
            next_probe_at: inner.next_probe_at.and_then(to_datetime),
            forced: inner.forced,
        }
    }

    // == Admission ==
    /// Asks to make one call.
    ///
    /// In OPEN, the first caller after the reset timeout flips the breaker to
    /// HALF_OPEN and receives the trial permit; everyone else is rejected
    /// until the trial settles.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpenError> {
        let now = current_timestamp_ms();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(self.permit(inner.generation, false)),
            CircuitState::Open => match inner.next_probe_at {
                Some(at) if !inner.forced && now >= at => {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    inner.generation += 1;
                    info!("Circuit for {} half-open, admitting trial call", self.service);
                    Ok(self.permit(inner.generation, true))
                }
                next_probe_at => Err(self.rejection(CircuitState::Open, next_probe_at)),
            },
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejection(CircuitState::HalfOpen, inner.next_probe_at))
                } else {
                    inner.trial_in_flight = true;
                    Ok(self.permit(inner.generation, true))
                }
            }
        }
    }

    // == Execute ==
    /// Runs `operation` if the breaker admits it and records the outcome.
    ///
    /// Errors for which `trips_breaker` is false are returned without
    /// touching the failure rate.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: TripsBreaker,
    {
        let permit = self.try_acquire().map_err(ExecuteError::Rejected)?;

        match operation().await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(err) => {
                if err.trips_breaker() {
                    permit.record_failure();
                } else {
                    permit.release();
                }
                Err(ExecuteError::Failed(err))
            }
        }
    }

    // == Operator Overrides ==
    /// Holds the breaker open until `force_close` or `reset`.
    pub fn force_open(&self) {
        let mut inner = self.lock();
        inner.forced = true;
        inner.open(None);
        warn!("Circuit for {} forced open", self.service);
    }

    /// Closes the breaker and clears the evaluation window.
    pub fn force_close(&self) {
        self.lock().close();
        info!("Circuit for {} forced closed", self.service);
    }

    /// Returns the breaker to its initial state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.close();
        inner.last_failure_at = None;
        info!("Circuit for {} reset", self.service);
    }

    // == Internals ==
    fn permit(&self, generation: u64, trial: bool) -> BreakerPermit<'_> {
        BreakerPermit {
            breaker: self,
            generation,
            trial,
            settled: false,
        }
    }

    fn rejection(&self, state: CircuitState, next_probe_at: Option<u64>) -> CircuitOpenError {
        CircuitOpenError {
            service: self.service.clone(),
            state,
            next_probe_at,
        }
    }

    fn settle(&self, generation: u64, trial: bool, outcome: Outcome) {
        let now = current_timestamp_ms();
        let mut inner = self.lock();

        if inner.generation != generation {
            debug!(
                "Dropping {:?} outcome for {} from an earlier breaker generation",
                outcome, self.service
            );
            return;
        }

        match (inner.state, outcome) {
            (CircuitState::HalfOpen, Outcome::Success) if trial => {
                inner.close();
                info!("Circuit for {} closed after successful trial", self.service);
            }
            (CircuitState::HalfOpen, Outcome::Failure | Outcome::Abandoned) if trial => {
                if outcome == Outcome::Failure {
                    inner.last_failure_at = Some(now);
                }
                self.trip(&mut inner, now);
            }
            (CircuitState::HalfOpen, Outcome::Neutral) if trial => {
                inner.trial_in_flight = false;
            }
            (CircuitState::Closed, Outcome::Success) => {
                inner.push_outcome(false, self.config.evaluation_window);
            }
            (CircuitState::Closed, Outcome::Failure) => {
                inner.last_failure_at = Some(now);
                inner.push_outcome(true, self.config.evaluation_window);
                if inner.outcomes.len() >= self.config.minimum_calls
                    && inner.failure_rate(self.config.evaluation_window)
                        > self.config.error_threshold_percentage
                {
                    self.trip(&mut inner, now);
                }
            }
            _ => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner, now: u64) {
        inner.consecutive_trips = inner.consecutive_trips.saturating_add(1);
        let timeout = self.config.reset_timeout_for(inner.consecutive_trips);
        inner.open(Some(now + timeout.as_millis() as u64));
        warn!(
            "Circuit for {} opened ({:.0}% failures), next trial in {:?}",
            self.service,
            inner.failure_rate(self.config.evaluation_window),
            timeout
        );
    }
}

// == Permit ==
/// Admission ticket for one call.
///
/// Dropping a trial permit without recording an outcome counts as a failed
/// trial, so a cancelled caller cannot leave the breaker stuck in HALF_OPEN.
#[must_use = "a permit must record the call outcome"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit is the HALF_OPEN trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The call succeeded.
    pub fn record_success(mut self) {
        self.finish(Outcome::Success);
    }

    /// The call failed in a way that counts against the service.
    pub fn record_failure(mut self) {
        self.finish(Outcome::Failure);
    }

    /// The call completed with an error that does not count.
    pub fn release(mut self) {
        self.finish(Outcome::Neutral);
    }

    fn finish(&mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.generation, self.trial, outcome);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.finish(Outcome::Abandoned);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Unavailable,
        BadInput,
    }

    impl TripsBreaker for TestError {
        fn trips_breaker(&self) -> bool {
            matches!(self, TestError::Unavailable)
        }
    }

    fn breaker(reset_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "court",
            CircuitBreakerConfig {
                reset_timeout,
                ..CircuitBreakerConfig::default()
            },
        )
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, ExecuteError<TestError>> {
        breaker.execute(|| async { Ok(1) }).await
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<u32, ExecuteError<TestError>> {
        breaker
            .execute(|| async { Err(TestError::Unavailable) })
            .await
    }

    #[tokio::test]
    async fn test_opens_when_failure_rate_exceeds_threshold() {
        let breaker = breaker(Duration::from_secs(30));

        for _ in 0..4 {
            succeed(&breaker).await.unwrap();
        }
        for _ in 0..5 {
            assert!(matches!(fail(&breaker).await, Err(ExecuteError::Failed(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().failure_count, 6);
    }

    #[tokio::test]
    async fn test_fresh_breaker_opens_on_failure_streak() {
        let breaker = breaker(Duration::from_secs(30));

        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_rate, 50.0);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(fail(&breaker).await, Err(ExecuteError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_minimum_calls_delays_evaluation() {
        let breaker = CircuitBreaker::new(
            "court",
            CircuitBreakerConfig {
                minimum_calls: 8,
                ..CircuitBreakerConfig::default()
            },
        );

        for _ in 0..7 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_rate_at_threshold_stays_closed() {
        let breaker = breaker(Duration::from_secs(30));

        for _ in 0..5 {
            succeed(&breaker).await.unwrap();
            let _ = fail(&breaker).await;
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_rate, 50.0);
    }

    #[tokio::test]
    async fn test_open_rejects_without_calling_operation() {
        let breaker = breaker(Duration::from_secs(30));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let calls = AtomicUsize::new(0);
        let result: Result<(), ExecuteError<TestError>> = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(ExecuteError::Rejected(err)) => {
                assert_eq!(err.state, CircuitState::Open);
                assert!(err.retry_after().unwrap() > Duration::ZERO);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_half_open_success_closes_and_resets_counters() {
        let breaker = breaker(Duration::from_millis(200));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(succeed(&breaker).await.unwrap(), 1);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.next_probe_at.is_none());
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker(Duration::from_millis(100));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(matches!(fail(&breaker).await, Err(ExecuteError::Failed(_))));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            succeed(&breaker).await,
            Err(ExecuteError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_half_open_admits_single_trial() {
        let breaker = breaker(Duration::from_millis(50));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let second = breaker.try_acquire();
        assert!(matches!(
            second,
            Err(CircuitOpenError { state: CircuitState::HalfOpen, .. })
        ));

        trial.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_trial_callers_get_one_permit() {
        let breaker = Arc::new(breaker(Duration::from_millis(50)));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let admitted = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if let Ok(permit) = breaker.try_acquire() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                        std::mem::forget(permit);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_trial_reopens() {
        let breaker = breaker(Duration::from_millis(50));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let trial = breaker.try_acquire().unwrap();
        drop(trial);

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_caller_errors_do_not_count() {
        let breaker = breaker(Duration::from_secs(30));

        for _ in 0..20 {
            let result: Result<(), _> = breaker.execute(|| async { Err(TestError::BadInput) }).await;
            assert!(matches!(result, Err(ExecuteError::Failed(TestError::BadInput))));
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[tokio::test]
    async fn test_neutral_trial_releases_slot() {
        let breaker = breaker(Duration::from_millis(50));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let _ = breaker
            .execute(|| async { Err::<(), _>(TestError::BadInput) })
            .await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stale_outcomes_are_ignored() {
        let breaker = breaker(Duration::from_secs(30));

        let early = breaker.try_acquire().unwrap();
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        early.record_success();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_window_rolls() {
        let breaker = breaker(Duration::from_secs(30));

        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        for _ in 0..10 {
            succeed(&breaker).await.unwrap();
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 10);
        assert!(snapshot.last_failure_at.is_some());
    }

    #[tokio::test]
    async fn test_backoff_extends_reset_timeout() {
        let breaker = CircuitBreaker::new(
            "payments",
            CircuitBreakerConfig {
                reset_timeout: Duration::from_millis(50),
                backoff_multiplier: 4.0,
                max_reset_timeout: Duration::from_secs(10),
                ..CircuitBreakerConfig::default()
            },
        );
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = fail(&breaker).await;

        // Second trip waits 200ms, so 80ms later the breaker still rejects
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(matches!(
            succeed(&breaker).await,
            Err(ExecuteError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_force_open_holds_until_closed() {
        let breaker = breaker(Duration::from_millis(10));

        breaker.force_open();
        tokio::time::sleep(Duration::from_millis(30)).await;

        match succeed(&breaker).await {
            Err(ExecuteError::Rejected(err)) => assert!(err.next_probe_at.is_none()),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(breaker.snapshot().forced);

        breaker.force_close();
        assert_eq!(succeed(&breaker).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let breaker = breaker(Duration::from_secs(30));
        for _ in 0..10 {
            let _ = fail(&breaker).await;
        }

        breaker.reset();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.last_failure_at.is_none());
    }
}
