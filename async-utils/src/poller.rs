//! Recurring task runner that backs off while the task keeps failing.
//!
//! The poller never gives up on a failing endpoint; it only polls it less
//! often, up to `max_backoff_delay`. A single success restores the normal
//! interval.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::OrCancelExt;

/// Smallest delay a failure backs off to when the normal interval is zero.
const MIN_BACKOFF_STEP: Duration = Duration::from_millis(100);

const DEFAULT_JITTER: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    normal_interval: Duration,
    max_backoff_delay: Duration,
    current_delay: Duration,
    consecutive_failures: u32,
    /// Fraction of `current_delay` the actual sleep may deviate by.
    jitter: f64,
}

impl PollSchedule {
    pub fn new(normal_interval: Duration, max_backoff_delay: Duration) -> Self {
        Self {
            normal_interval,
            max_backoff_delay: max_backoff_delay.max(normal_interval),
            current_delay: normal_interval,
            consecutive_failures: 0,
            jitter: DEFAULT_JITTER,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn normal_interval(&self) -> Duration {
        self.normal_interval
    }

    pub fn max_backoff_delay(&self) -> Duration {
        self.max_backoff_delay
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.normal_interval;
    }

    /// Doubles the delay, capped at `max_backoff_delay`.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let doubled = self.current_delay.saturating_mul(2).max(MIN_BACKOFF_STEP);
        self.current_delay = doubled.min(self.max_backoff_delay);
    }

    /// How long to actually wait before the next run: `current_delay` with
    /// jitter applied, never above `max_backoff_delay`.
    pub fn next_sleep<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.jitter == 0.0 || self.current_delay.is_zero() {
            return self.current_delay;
        }
        let factor = rng.random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        self.current_delay
            .mul_f64(factor)
            .min(self.max_backoff_delay)
    }
}

/// Owner-side handle of a running poller. Dropping it cancels the poller.
#[derive(Debug)]
pub struct PollerHandle {
    cancel: CancellationToken,
    schedule: Arc<Mutex<PollSchedule>>,
    join: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stops the poller. The pending timer is dropped and no further run
    /// starts; a run already in flight is abandoned at its next await point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn snapshot(&self) -> PollSchedule {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancels the poller and waits for its task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take()
            && let Err(err) = join.await
        {
            tracing::warn!("poller task ended abnormally: {err}");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct BackoffPoller;

impl BackoffPoller {
    /// Runs `task` immediately and then keeps rescheduling it according to
    /// `schedule` until the returned handle is cancelled or dropped.
    pub fn spawn<F, Fut, E>(name: &'static str, schedule: PollSchedule, mut task: F) -> PollerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let shared = Arc::new(Mutex::new(schedule));

        let token = cancel.clone();
        let state = Arc::clone(&shared);
        let join = tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }
                let Ok(outcome) = task().or_cancel(&token).await else {
                    break;
                };
                let sleep_for = {
                    let mut schedule = state.lock().unwrap_or_else(PoisonError::into_inner);
                    match outcome {
                        Ok(()) => {
                            if schedule.consecutive_failures() > 0 {
                                tracing::info!(
                                    poller = name,
                                    "poll recovered after {} failures",
                                    schedule.consecutive_failures()
                                );
                            }
                            schedule.record_success();
                        }
                        Err(err) => {
                            schedule.record_failure();
                            tracing::warn!(
                                poller = name,
                                failures = schedule.consecutive_failures(),
                                delay_ms = schedule.current_delay().as_millis() as u64,
                                "poll failed: {err}"
                            );
                        }
                    }
                    schedule.next_sleep(&mut rand::rng())
                };
                if tokio::time::sleep(sleep_for)
                    .or_cancel(&token)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            tracing::debug!(poller = name, "poller stopped");
        });

        PollerHandle {
            cancel,
            schedule: shared,
            join: Some(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    fn counting_task(
        counter: &Arc<AtomicUsize>,
        succeed: bool,
    ) -> impl FnMut() -> std::future::Ready<Result<(), String>> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if succeed {
                Ok(())
            } else {
                Err("endpoint unavailable".to_string())
            })
        }
    }

    #[test]
    fn failures_double_until_cap() {
        let mut schedule =
            PollSchedule::new(Duration::from_secs(1), Duration::from_secs(5)).with_jitter(0.0);
        let mut delays = Vec::new();
        for _ in 0..5 {
            schedule.record_failure();
            delays.push(schedule.current_delay().as_secs());
        }
        assert_eq!(delays, vec![2, 4, 5, 5, 5]);
        assert_eq!(schedule.consecutive_failures(), 5);
    }

    #[test]
    fn success_resets_to_normal_interval() {
        let mut schedule = PollSchedule::new(Duration::from_secs(3), Duration::from_secs(60));
        schedule.record_failure();
        schedule.record_failure();
        schedule.record_success();
        assert_eq!(schedule.current_delay(), Duration::from_secs(3));
        assert_eq!(schedule.consecutive_failures(), 0);
    }

    #[test]
    fn zero_interval_still_backs_off() {
        let mut schedule = PollSchedule::new(Duration::ZERO, Duration::from_secs(1));
        schedule.record_failure();
        assert!(schedule.current_delay() > Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let schedule =
            PollSchedule::new(Duration::from_secs(10), Duration::from_secs(11)).with_jitter(0.5);
        let mut rng = rand::rng();
        for _ in 0..100 {
            let sleep = schedule.next_sleep(&mut rng);
            assert!(sleep >= Duration::from_secs(5), "{sleep:?} below bound");
            assert!(sleep <= Duration::from_secs(11), "{sleep:?} above cap");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_on_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let schedule =
            PollSchedule::new(Duration::from_secs(10), Duration::from_secs(60)).with_jitter(0.0);
        let handle = BackoffPoller::spawn("test", schedule, counting_task(&counter, true));

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(handle.snapshot().current_delay(), Duration::from_secs(10));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_is_polled_less_often_but_not_abandoned() {
        let counter = Arc::new(AtomicUsize::new(0));
        let schedule =
            PollSchedule::new(Duration::from_secs(1), Duration::from_secs(8)).with_jitter(0.0);
        let handle = BackoffPoller::spawn("test", schedule, counting_task(&counter, false));

        // Runs at t=0, 2, 6, 14, 22.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.current_delay(), Duration::from_secs(8));
        assert_eq!(snapshot.consecutive_failures(), 5);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_runs_after_cancel() {
        let counter = Arc::new(AtomicUsize::new(0));
        let schedule =
            PollSchedule::new(Duration::from_secs(1), Duration::from_secs(8)).with_jitter(0.0);
        let handle = BackoffPoller::spawn("test", schedule, counting_task(&counter, true));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        handle.cancel();
        assert!(handle.is_cancelled());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_on_the_timer_deadline_starts_no_run() {
        for _ in 0..200 {
            let stopped = Arc::new(AtomicBool::new(false));
            let late_runs = Arc::new(AtomicUsize::new(0));
            let schedule =
                PollSchedule::new(Duration::from_secs(1), Duration::from_secs(8)).with_jitter(0.0);
            let handle = BackoffPoller::spawn("test", schedule, {
                let stopped = Arc::clone(&stopped);
                let late_runs = Arc::clone(&late_runs);
                move || {
                    let stopped = Arc::clone(&stopped);
                    let late_runs = Arc::clone(&late_runs);
                    async move {
                        if stopped.load(Ordering::SeqCst) {
                            late_runs.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok::<(), String>(())
                    }
                }
            });

            tokio::time::sleep(Duration::from_secs(1)).await;
            stopped.store(true, Ordering::SeqCst);
            handle.shutdown().await;

            assert_eq!(late_runs.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        let schedule =
            PollSchedule::new(Duration::from_secs(1), Duration::from_secs(8)).with_jitter(0.0);
        let handle = BackoffPoller::spawn("test", schedule, counting_task(&counter, true));
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
