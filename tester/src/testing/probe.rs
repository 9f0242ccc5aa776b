//! Probe Executor
//!
//! Repeatedly evaluates a probe under a [`PollPolicy`] and implements the two
//! polling contracts every assertion in the suite is built from:
//!
//! - [`eventually`]: succeed as soon as the probe is accepted, fail at the deadline.
//! - [`consistently`]: succeed only if every evaluation up to the deadline is
//!   accepted, fail on the first rejection.
//!
//! The probe is evaluated immediately, then at every interval boundary measured
//! from the first evaluation, and one last time at the deadline. Evaluations
//! never overlap. All waiting goes through `tokio::time`, so tests drive the
//! schedule with a paused clock.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

use crate::error::{HarnessError, HarnessResult};

/// Deadline and spacing for a polling assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    timeout: Duration,
    interval: Duration,
}

impl PollPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(timeout: Duration, interval: Duration) -> HarnessResult<Self> {
        if interval.is_zero() {
            return Err(HarnessError::InvalidPolicy {
                reason: "interval must be greater than zero".to_string(),
            });
        }
        Ok(Self { timeout, interval })
    }

    /// Policy with the default polling interval.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    /// Same timeout, different interval. A zero interval keeps the current one.
    pub fn every(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Evaluation points for one assertion call.
struct Schedule {
    start: Instant,
    deadline: Instant,
    interval: Duration,
    next: Instant,
}

impl Schedule {
    fn begin(policy: &PollPolicy) -> Self {
        let start = Instant::now();
        Self {
            start,
            deadline: start + policy.timeout,
            interval: policy.interval,
            next: start + policy.interval,
        }
    }

    fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.start)
    }

    /// Sleep until the next evaluation point; `false` once the deadline has passed.
    async fn wait_next(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        // a slow probe may have overrun several boundaries
        while self.next <= now {
            self.next += self.interval;
        }
        sleep_until(self.next.min(self.deadline)).await;
        true
    }
}

/// Poll `probe` until `accept` holds for its value, returning that value.
///
/// Probe errors are retried. On deadline the error carries the last observed
/// value or the last probe error.
pub async fn eventually<T, E, F, Fut, A>(
    what: &str,
    policy: &PollPolicy,
    mut probe: F,
    mut accept: A,
) -> HarnessResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: fmt::Debug,
    E: fmt::Display,
    A: FnMut(&T) -> bool,
{
    let mut schedule = Schedule::begin(policy);
    let mut attempts = 0u32;
    let mut last_observed = None;

    loop {
        attempts += 1;
        match probe().await {
            Ok(value) if accept(&value) => {
                tracing::debug!(
                    "✅ {} satisfied after {:?} ({} attempts)",
                    what,
                    schedule.elapsed(),
                    attempts
                );
                return Ok(value);
            }
            Ok(value) => last_observed = Some(format!("{value:?}")),
            Err(e) => last_observed = Some(format!("probe error: {e}")),
        }

        if !schedule.wait_next().await {
            tracing::warn!("⏰ Timed out waiting for {} after {} attempts", what, attempts);
            return Err(HarnessError::timeout(what, schedule.elapsed(), attempts, last_observed));
        }
    }
}

/// Require `accept` to hold on every evaluation until the deadline.
///
/// Returns the number of evaluations. A rejection or probe error ends the
/// assertion immediately.
pub async fn consistently<T, E, F, Fut, A>(
    what: &str,
    policy: &PollPolicy,
    mut probe: F,
    mut accept: A,
) -> HarnessResult<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: fmt::Debug,
    E: fmt::Display,
    A: FnMut(&T) -> bool,
{
    let mut schedule = Schedule::begin(policy);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let observed = match probe().await {
            Ok(value) if accept(&value) => None,
            Ok(value) => Some(format!("{value:?}")),
            Err(e) => Some(format!("probe error: {e}")),
        };

        if let Some(observed) = observed {
            tracing::warn!("❌ {} violated on attempt {}", what, attempts);
            return Err(HarnessError::AssertionViolation {
                what: what.to_string(),
                at: schedule.elapsed(),
                attempts,
                observed,
            });
        }

        if !schedule.wait_next().await {
            return Ok(attempts);
        }
    }
}

/// [`eventually`] for probes that report a boolean.
pub async fn eventually_true<E, F, Fut>(what: &str, policy: &PollPolicy, probe: F) -> HarnessResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: fmt::Display,
{
    eventually(what, policy, probe, |ok| *ok).await.map(|_| ())
}

/// [`consistently`] for probes that report a boolean.
pub async fn consistently_true<E, F, Fut>(what: &str, policy: &PollPolicy, probe: F) -> HarnessResult<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: fmt::Display,
{
    consistently(what, policy, probe, |ok| *ok).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    const INTERVAL: Duration = Duration::from_millis(100);

    fn policy(timeout_ms: u64) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(timeout_ms), INTERVAL).unwrap()
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert_matches!(
            PollPolicy::new(Duration::from_secs(1), Duration::ZERO),
            Err(HarnessError::InvalidPolicy { .. })
        );
        let policy = PollPolicy::with_timeout(Duration::from_secs(1)).every(Duration::ZERO);
        assert_eq!(policy.interval(), PollPolicy::DEFAULT_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventually_succeeds_on_the_expected_boundary() {
        for boundaries in [0u32, 1, 3, 7] {
            let start = Instant::now();
            let target = INTERVAL * boundaries;
            let calls = &AtomicU32::new(0);

            let seen_at = eventually(
                "probe turns true",
                &policy(1_000),
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(start.elapsed())
                },
                |elapsed| *elapsed >= target,
            )
            .await
            .unwrap();

            assert_eq!(seen_at, target, "never earlier, never later than the boundary");
            assert_eq!(calls.load(Ordering::SeqCst), boundaries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventually_fails_exactly_at_timeout() {
        let start = Instant::now();
        let result = eventually_true("never", &policy(1_050), || async { Ok::<_, Infallible>(false) }).await;

        assert_eq!(start.elapsed(), Duration::from_millis(1_050));
        assert_matches!(
            result,
            Err(HarnessError::Timeout { elapsed, attempts, last_observed: Some(last), .. }) => {
                assert_eq!(elapsed, Duration::from_millis(1_050));
                // 0, 100, ..., 1000 and the deadline itself
                assert_eq!(attempts, 12);
                assert_eq!(last, "false");
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventually_retries_probe_errors_and_surfaces_the_last() {
        let calls = &AtomicU32::new(0);
        let result = eventually(
            "flaky",
            &policy(300),
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, String>(format!("boom {n}"))
            },
            |_| true,
        )
        .await;

        assert_matches!(
            result,
            Err(HarnessError::Timeout { last_observed: Some(last), .. }) if last == "probe error: boom 3"
        );

        let calls = &AtomicU32::new(0);
        let value = eventually(
            "recovers",
            &policy(1_000),
            move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err("not yet"),
                    n => Ok(n),
                }
            },
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_policy_evaluates_once() {
        let calls = &AtomicU32::new(0);
        let result = eventually_true("once", &policy(0), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(false)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = &AtomicU32::new(0);
        let attempts = consistently_true("once", &policy(0), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(true)
        })
        .await
        .unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consistently_runs_the_full_window() {
        let start = Instant::now();
        let attempts = consistently_true("always", &policy(1_000), || async { Ok::<_, Infallible>(true) })
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
        assert_eq!(attempts, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consistently_fails_at_the_midpoint() {
        let start = Instant::now();
        let midpoint = Duration::from_millis(500);

        let result = consistently(
            "holds until midpoint",
            &policy(10_000),
            move || async move { Ok::<_, Infallible>(start.elapsed()) },
            |elapsed| *elapsed < midpoint,
        )
        .await;

        assert_eq!(start.elapsed(), midpoint);
        assert_matches!(
            result,
            Err(HarnessError::AssertionViolation { at, attempts, .. }) => {
                assert_eq!(at, midpoint);
                assert_eq!(attempts, 6);
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_consistently_treats_probe_error_as_violation() {
        let result = consistently_true("errors", &policy(1_000), || async { Err::<bool, _>("unreachable") }).await;
        assert_matches!(
            result,
            Err(HarnessError::AssertionViolation { attempts: 1, observed, .. }) if observed.contains("unreachable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_skips_missed_boundaries() {
        let start = Instant::now();
        let evaluations = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = evaluations.clone();

        let _ = eventually_true("slow", &policy(1_000), move || {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(start.elapsed());
                tokio::time::sleep(Duration::from_millis(250)).await;
                Ok::<_, Infallible>(false)
            }
        })
        .await;

        let evaluations = evaluations.lock().unwrap().clone();
        assert_eq!(
            evaluations,
            vec![
                Duration::ZERO,
                Duration::from_millis(300),
                Duration::from_millis(600),
                Duration::from_millis(900),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluations_never_overlap() {
        let in_flight = &AtomicBool::new(false);
        let _ = eventually_true("serial", &policy(500), move || async move {
            assert!(!in_flight.swap(true, Ordering::SeqCst), "probe ran concurrently");
            tokio::time::sleep(Duration::from_millis(30)).await;
            in_flight.store(false, Ordering::SeqCst);
            Ok::<_, Infallible>(false)
        })
        .await;
    }
}
