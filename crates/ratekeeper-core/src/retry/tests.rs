//! Integration tests for the retry module
//!
//! These tests drive `RateLimitManager` end to end with mock operations and
//! tokio's paused clock, so every delay is observed without real waiting.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::RateLimitConfig;
use crate::quota::{QuotaState, RateLimitMetadata, SharedQuota};
use crate::retry::{
    CancelSignal, FailureHint, RateLimitManager, RateLimited, RetryError, RetryReason,
    RetryableFailure, StatsObserver,
};

/// Successful response carrying rate limit headers
#[derive(Debug, Clone)]
struct MockResponse {
    body: &'static str,
    rate_limit: Option<RateLimitMetadata>,
}

impl MockResponse {
    fn ok(body: &'static str) -> Self {
        Self {
            body,
            rate_limit: None,
        }
    }

    fn with_quota(body: &'static str, limit: u64, remaining: u64) -> Self {
        Self {
            body,
            rate_limit: Some(
                RateLimitMetadata::new()
                    .with_limit(limit)
                    .with_remaining(remaining)
                    .with_used(limit - remaining)
                    .with_reset(Utc::now().timestamp() + 3600),
            ),
        }
    }
}

impl RateLimited for MockResponse {
    fn rate_limit(&self) -> Option<&RateLimitMetadata> {
        self.rate_limit.as_ref()
    }
}

/// Failure with an HTTP status or a transport-level hint
#[derive(Debug, Clone)]
struct MockError {
    hint: FailureHint,
    rate_limit: Option<RateLimitMetadata>,
}

impl MockError {
    fn status(code: u16) -> Self {
        Self {
            hint: FailureHint::Status(code),
            rate_limit: None,
        }
    }

    fn timeout() -> Self {
        Self {
            hint: FailureHint::Timeout,
            rate_limit: None,
        }
    }

    /// Rejected for exceeding the quota, renewing `reset_in` seconds from now
    fn rate_limited(code: u16, reset_in: i64) -> Self {
        Self {
            hint: FailureHint::Status(code),
            rate_limit: Some(
                RateLimitMetadata::new()
                    .with_limit(60)
                    .with_remaining(0)
                    .with_used(60)
                    .with_reset(Utc::now().timestamp() + reset_in),
            ),
        }
    }
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock failure: {:?}", self.hint)
    }
}

impl std::error::Error for MockError {}

impl RetryableFailure for MockError {
    fn failure_hint(&self) -> FailureHint {
        self.hint
    }

    fn failure_metadata(&self) -> Option<&RateLimitMetadata> {
        self.rate_limit.as_ref()
    }
}

/// Operation that replays a script of outcomes and counts invocations
#[derive(Clone)]
struct Script {
    calls: Arc<AtomicU32>,
    outcomes: Arc<Vec<Result<MockResponse, MockError>>>,
}

impl Script {
    fn new(outcomes: Vec<Result<MockResponse, MockError>>) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            outcomes: Arc::new(outcomes),
        }
    }

    /// Invoke once; the last outcome repeats forever
    fn call(&self) -> impl std::future::Future<Output = Result<MockResponse, MockError>> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let outcome = self.outcomes[index.min(self.outcomes.len() - 1)].clone();
        async move { outcome }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn config(max_retries: i64, initial: f64, max: f64, factor: f64) -> RateLimitConfig {
    RateLimitConfig::new(max_retries, initial, max, factor, 0.1, false, 0.0).unwrap()
}

fn manager_with(
    config: RateLimitConfig,
    quota: SharedQuota,
) -> (RateLimitManager<Arc<StatsObserver>>, Arc<StatsObserver>) {
    let observer = Arc::new(StatsObserver::new());
    let manager = RateLimitManager::builder()
        .with_config(config)
        .with_quota(quota)
        .with_observer(observer.clone())
        .build();
    (manager, observer)
}

fn low_quota(remaining: u64, limit: u64, reset_in: i64) -> SharedQuota {
    let mut state = QuotaState::new();
    state.update(
        &RateLimitMetadata::new()
            .with_limit(limit)
            .with_remaining(remaining)
            .with_reset(Utc::now().timestamp() + reset_in),
    );
    SharedQuota::from_state(state)
}

// ============================================================================
// Retry sequencing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fail_fail_succeed_delay_sequence() {
    let (manager, observer) = manager_with(config(2, 1.0, 10.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![
        Err(MockError::status(503)),
        Err(MockError::timeout()),
        Ok(MockResponse::ok("payload")),
    ]);

    let result = manager
        .execute_with_retry("get-repo", || script.call())
        .await;

    assert_eq!(result.unwrap().body, "payload");
    assert_eq!(script.calls(), 3);
    assert_eq!(observer.delay_secs(), vec![1.0, 2.0]);
    assert_eq!(observer.retries(), 2);
    assert_eq!(observer.successes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_always_transient_exhausts_after_max_retries_plus_one() {
    let (manager, observer) = manager_with(config(2, 0.5, 10.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![Err(MockError::status(502))]);

    let err = manager
        .execute_with_retry("get-repo", || script.call())
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 3);
    assert_eq!(script.calls(), 3);
    assert_eq!(observer.exhaustions(), 1);
    assert_eq!(observer.delay_secs(), vec![0.5, 1.0]);
    assert!(err.quota().is_none());
    match err {
        RetryError::Exhausted { total_delay, source, .. } => {
            assert_eq!(total_delay, Duration::from_millis(1500));
            assert_eq!(source.hint, FailureHint::Status(502));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_fails_immediately() {
    for status in [400, 401, 404, 422] {
        let (manager, observer) = manager_with(config(5, 1.0, 10.0, 2.0), SharedQuota::new());
        let script = Script::new(vec![Err(MockError::status(status))]);

        let err = manager
            .execute_with_retry("get-repo", || script.call())
            .await
            .unwrap_err();

        assert!(err.is_fatal(), "{status}");
        assert_eq!(err.attempts(), 1);
        assert_eq!(script.calls(), 1);
        assert!(observer.delays().is_empty());
        assert_eq!(observer.fatals(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_without_exhaustion_is_fatal() {
    let (manager, _observer) = manager_with(config(3, 1.0, 10.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![Err(MockError::status(403))]);

    let err = manager
        .execute_with_retry("get-repo", || script.call())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(script.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_after_transient_keeps_attempt_count() {
    let (manager, observer) = manager_with(config(5, 1.0, 10.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![Err(MockError::timeout()), Err(MockError::status(404))]);

    let err = manager
        .execute_with_retry("get-repo", || script.call())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.attempts(), 2);
    assert_eq!(observer.delay_secs(), vec![1.0]);
}

// ============================================================================
// Rate limit handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_exhausted_forbidden_waits_for_reset() {
    let quota = SharedQuota::new();
    let (manager, observer) = manager_with(config(1, 1.0, 10.0, 2.0), quota.clone());
    let script = Script::new(vec![
        Err(MockError::rate_limited(403, 30)),
        Ok(MockResponse::with_quota("payload", 60, 59)),
    ]);

    let result = manager
        .execute_with_retry("get-repo", || script.call())
        .await;

    assert!(result.is_ok());
    let delays = observer.delays();
    assert_eq!(delays.len(), 1);
    assert_eq!(delays[0].1, RetryReason::RateLimited);
    assert!(delays[0].0 >= Duration::from_secs(28), "{:?}", delays[0].0);
    assert!(delays[0].0 <= Duration::from_secs(30));
    assert_eq!(quota.snapshot().remaining, 59);
}

#[tokio::test(start_paused = true)]
async fn test_too_many_requests_uses_backoff_when_reset_is_past() {
    let (manager, observer) = manager_with(config(1, 2.0, 10.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![
        Err(MockError::rate_limited(429, -10)),
        Ok(MockResponse::ok("payload")),
    ]);

    manager
        .execute_with_retry("get-repo", || script.call())
        .await
        .unwrap();

    assert_eq!(observer.delays(), vec![(Duration::from_secs(2), RetryReason::RateLimited)]);
}

#[tokio::test(start_paused = true)]
async fn test_failure_metadata_updates_quota() {
    let quota = SharedQuota::new();
    let (manager, _observer) = manager_with(config(0, 1.0, 10.0, 2.0), quota.clone());
    let script = Script::new(vec![Err(MockError::rate_limited(429, 60))]);

    let err = manager
        .execute_with_retry("get-repo", || script.call())
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
    let snapshot = quota.snapshot();
    assert_eq!(snapshot.limit, 60);
    assert_eq!(snapshot.remaining, 0);
    assert_eq!(snapshot.remaining_ratio, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_exhaustion_reports_quota() {
    let (manager, _observer) = manager_with(config(1, 1.0, 10.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![Err(MockError::rate_limited(429, 5))]);

    let err = manager
        .execute_with_retry("search-code", || script.call())
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(script.calls(), 2);
    let quota = err.quota().expect("rate limited exhaustion carries the quota");
    assert_eq!(quota.limit, 60);
    assert_eq!(quota.remaining, 0);
    assert!(quota.reset_at.is_some());
    assert!(err.to_string().contains("[rate limit: 0/60 remaining, resets at "));
}

#[tokio::test(start_paused = true)]
async fn test_success_updates_quota() {
    let (manager, _observer) = manager_with(config(0, 1.0, 10.0, 2.0), SharedQuota::new());

    manager
        .execute_with_retry("get-repo", || async {
            Ok::<_, MockError>(MockResponse::with_quota("payload", 5000, 4999))
        })
        .await
        .unwrap();

    let snapshot = manager.quota();
    assert_eq!(snapshot.limit, 5000);
    assert_eq!(snapshot.remaining, 4999);
    assert_eq!(snapshot.used, 1);
    assert!(snapshot.reset_at.is_some());
}

// ============================================================================
// Pre-emptive throttling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_throttle_engages_at_threshold() {
    let (manager, observer) = manager_with(config(2, 1.0, 10.0, 2.0), low_quota(10, 100, 20));
    let script = Script::new(vec![Ok(MockResponse::ok("payload"))]);

    manager
        .execute_with_retry("get-repo", || script.call())
        .await
        .unwrap();

    assert_eq!(observer.throttles(), 1);
    assert_eq!(script.calls(), 1);
    let (delay, reason) = observer.delays()[0];
    assert_eq!(reason, RetryReason::Throttled);
    assert!(delay >= Duration::from_secs(18), "{delay:?}");
    assert!(delay <= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_uses_backoff_when_reset_unknown() {
    let mut state = QuotaState::new();
    state.update(&RateLimitMetadata::new().with_limit(100).with_remaining(0));
    let (manager, observer) = manager_with(config(2, 3.0, 10.0, 2.0), SharedQuota::from_state(state));

    manager
        .execute_with_retry("get-repo", || async { Ok::<_, MockError>(MockResponse::ok("x")) })
        .await
        .unwrap();

    assert_eq!(observer.delays(), vec![(Duration::from_secs(3), RetryReason::Throttled)]);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_not_engaged_above_threshold() {
    let (manager, observer) = manager_with(config(2, 1.0, 10.0, 2.0), low_quota(11, 100, 20));

    manager
        .execute_with_retry("get-repo", || async { Ok::<_, MockError>(MockResponse::ok("x")) })
        .await
        .unwrap();

    assert_eq!(observer.throttles(), 0);
    assert!(observer.delays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_throttle_never_engages_with_unknown_limit() {
    let config = RateLimitConfig::new(2, 1.0, 10.0, 2.0, 1.0, false, 0.0).unwrap();
    let (manager, observer) = manager_with(config, SharedQuota::new());

    manager
        .execute_with_retry("get-repo", || async { Ok::<_, MockError>(MockResponse::ok("x")) })
        .await
        .unwrap();

    assert_eq!(observer.throttles(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_during_delay_stops_retries() {
    let (manager, observer) = manager_with(config(5, 10.0, 60.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![Err(MockError::timeout())]);
    let cancel = CancelSignal::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let err = manager
        .execute_with_cancel("get-repo", &cancel, || script.call())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 1);
    assert_eq!(script.calls(), 1);
    assert_eq!(observer.cancellations(), 1);
    assert!(err.source_ref().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_in_flight_attempt() {
    let (manager, _observer) = manager_with(config(3, 1.0, 10.0, 2.0), SharedQuota::new());
    let completed = Arc::new(AtomicU32::new(0));
    let cancel = CancelSignal::new().with_timeout(Duration::from_secs(1));

    let err = manager
        .execute_with_cancel("slow", &cancel, || {
            let completed = completed.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, MockError>(MockResponse::ok("late"))
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_throttle_makes_no_attempt() {
    let (manager, observer) = manager_with(config(2, 1.0, 10.0, 2.0), low_quota(0, 100, 600));
    let script = Script::new(vec![Ok(MockResponse::ok("payload"))]);
    let cancel = CancelSignal::new().with_timeout(Duration::from_secs(5));

    let err = manager
        .execute_with_cancel("get-repo", &cancel, || script.call())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 0);
    assert_eq!(script.calls(), 0);
    assert_eq!(observer.throttles(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delay_beyond_duration_range_is_cancellable() {
    let (manager, observer) = manager_with(config(3, 1e20, 1e20, 2.0), SharedQuota::new());
    let script = Script::new(vec![Err(MockError::status(503))]);
    let cancel = CancelSignal::new().with_timeout(Duration::from_secs(5));

    let err = manager
        .execute_with_cancel("get-repo", &cancel, || script.call())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 1);
    assert_eq!(observer.delays(), vec![(Duration::MAX, RetryReason::Transient)]);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_makes_no_attempt() {
    let (manager, _observer) = manager_with(config(2, 1.0, 10.0, 2.0), SharedQuota::new());
    let script = Script::new(vec![Ok(MockResponse::ok("payload"))]);
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = manager
        .execute_with_cancel("get-repo", &cancel, || script.call())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(script.calls(), 0);
}

// ============================================================================
// Sharing and determinism
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_share_quota() {
    let quota = SharedQuota::new();
    let (manager, observer) = manager_with(config(1, 1.0, 10.0, 2.0), quota.clone());
    let manager = Arc::new(manager);

    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .execute_with_retry("list-issues", || async move {
                        Ok::<_, MockError>(MockResponse::with_quota("page", 5000, 4000 + i))
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(observer.successes(), 8);
    let snapshot = quota.snapshot();
    assert_eq!(snapshot.limit, 5000);
    assert!((4000..4008).contains(&snapshot.remaining));
}

#[tokio::test(start_paused = true)]
async fn test_seeded_jitter_is_reproducible() {
    async fn run(seed: u64) -> Vec<f64> {
        let observer = Arc::new(StatsObserver::new());
        let manager = RateLimitManager::builder()
            .with_config(RateLimitConfig::new(3, 1.0, 10.0, 2.0, 0.1, true, 0.5).unwrap())
            .with_observer(observer.clone())
            .with_rng(StdRng::seed_from_u64(seed))
            .build();
        let script = Script::new(vec![Err(MockError::timeout())]);
        let _ = manager.execute_with_retry("jitter", || script.call()).await;
        observer.delay_secs()
    }

    let first = run(99).await;
    let second = run(99).await;

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    for (attempt, delay) in first.iter().enumerate() {
        let base = 2f64.powi(attempt as i32);
        assert!(*delay >= base && *delay <= base * 1.5, "{delay} vs {base}");
    }
}
