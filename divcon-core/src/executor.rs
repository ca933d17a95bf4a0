//! Bounded-concurrency fan-out with completion-order fan-in.
//!
//! Work items are spawned onto a `JoinSet`; a `Semaphore` with `W` permits
//! keeps at most `W` of them past the gate at any time, the rest queue on the
//! semaphore. Results come back in completion order, each one an explicit
//! `Result`, and the caller decides what a failure means via [`FailurePolicy`].
//!
//! Under [`FailurePolicy::FailFast`] the first observed failure aborts every
//! sibling still queued or running. Aborted tasks are dropped at their next
//! await point, so an in-flight oracle request is abandoned and its result
//! never reaches the caller. Shared state is only written by the caller while
//! draining, so cancelled work cannot leave partial writes behind.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

pub use divcon_common::FailurePolicy;

use crate::error::{PipelineError, Result};

/// Fixed-size worker pool for independent oracle calls.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    workers: usize,
}

impl ParallelExecutor {
    /// Create an executor running at most `workers` items at once (minimum 1).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Concurrency bound.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn every work item and return the handle that yields their results.
    ///
    /// Items start immediately, gated by the pool size. Must be called inside
    /// a tokio runtime.
    pub fn spawn_all<I, Fut, T>(&self, work: I) -> Completions<T>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        let mut submitted = 0;

        for item in work {
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::Internal("worker pool closed".into()))?;
                item.await
            }
            .in_current_span());
            submitted += 1;
        }

        Completions {
            set,
            submitted,
            delivered: 0,
        }
    }
}

/// Outcome of draining a set of completions.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Items that finished successfully and were merged
    pub completed: usize,
    /// Failures collected under [`FailurePolicy::Continue`]
    pub failures: Vec<PipelineError>,
}

/// Results of spawned work, yielded in completion order.
///
/// Dropping this handle aborts everything not yet finished.
pub struct Completions<T> {
    set: JoinSet<Result<T>>,
    submitted: usize,
    delivered: usize,
}

impl<T: Send + 'static> Completions<T> {
    /// Number of items spawned.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Number of items not yet delivered.
    pub fn pending(&self) -> usize {
        self.submitted - self.delivered
    }

    /// Next finished item, or `None` once all have been delivered.
    pub async fn next(&mut self) -> Option<Result<T>> {
        let joined = self.set.join_next().await?;
        self.delivered += 1;
        Some(joined.unwrap_or_else(|e| Err(join_failure(e))))
    }

    /// Abort every item still queued or running.
    pub fn cancel(&mut self) {
        let pending = self.pending();
        if pending > 0 {
            tracing::debug!(pending, "Cancelling outstanding work items");
        }
        self.set.abort_all();
    }

    /// Feed every result to `merge` as it completes.
    ///
    /// Item failures are handled per `policy`. An error returned by `merge`
    /// itself is always fatal: outstanding items are cancelled and the error
    /// is returned.
    pub async fn drain<F>(mut self, policy: FailurePolicy, mut merge: F) -> Result<DrainReport>
    where
        F: FnMut(T) -> Result<()>,
    {
        let mut report = DrainReport::default();

        while let Some(outcome) = self.next().await {
            match outcome {
                Ok(value) => {
                    if let Err(e) = merge(value) {
                        self.cancel();
                        return Err(e);
                    }
                    report.completed += 1;
                }
                Err(e) => match policy {
                    FailurePolicy::FailFast => {
                        self.cancel();
                        return Err(e);
                    }
                    FailurePolicy::Continue => {
                        tracing::warn!(error = %e, "Work item failed, continuing");
                        report.failures.push(e);
                    }
                },
            }
        }

        Ok(report)
    }
}

fn join_failure(e: JoinError) -> PipelineError {
    if e.is_panic() {
        PipelineError::TaskFailed(format!("worker panicked: {e}"))
    } else {
        PipelineError::TaskFailed(format!("worker cancelled: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many items run at once.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_bound() {
        let gauge = Arc::new(Gauge::default());
        let executor = ParallelExecutor::new(3);

        let work = (0..20u64).map(|i| {
            let gauge = Arc::clone(&gauge);
            async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(5 + (i % 4))).await;
                gauge.exit();
                Ok::<_, PipelineError>(i)
            }
        });

        let mut seen = Vec::new();
        let report = executor
            .spawn_all(work)
            .drain(FailurePolicy::FailFast, |i| {
                seen.push(i);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(report.completed, 20);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_results_arrive_in_completion_order() {
        let executor = ParallelExecutor::new(4);
        let delays = [40u64, 5, 20];
        let work = delays.iter().enumerate().map(|(i, &ms)| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, PipelineError>(i)
        });

        let mut completions = executor.spawn_all(work);
        assert_eq!(completions.submitted(), 3);

        let mut order = Vec::new();
        while let Some(result) = completions.next().await {
            order.push(result.unwrap());
        }
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(completions.pending(), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_returns_error_and_cancels_siblings() {
        let gauge = Arc::new(Gauge::default());
        let executor = ParallelExecutor::new(1);

        let work = (0..5u32).map(|i| {
            let gauge = Arc::clone(&gauge);
            async move {
                if i == 0 {
                    return Err(PipelineError::oracle("classify", "batch 1-10", "boom"));
                }
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(50)).await;
                gauge.exit();
                Ok(i)
            }
        });

        let err = executor
            .spawn_all(work)
            .drain(FailurePolicy::FailFast, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(err.is_oracle_failure());
        let finished_at_failure = gauge.finished.load(Ordering::SeqCst);

        // Aborted siblings must not run to completion afterwards.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(gauge.finished.load(Ordering::SeqCst), finished_at_failure);
    }

    #[tokio::test]
    async fn test_continue_policy_collects_failures() {
        let executor = ParallelExecutor::new(2);
        let work = (0..6u32).map(|i| async move {
            if i % 3 == 0 {
                Err(PipelineError::oracle("score", format!("batch {i}"), "rate limited"))
            } else {
                Ok(i)
            }
        });

        let mut merged = 0;
        let report = executor
            .spawn_all(work)
            .drain(FailurePolicy::Continue, |_| {
                merged += 1;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(report.completed, 4);
        assert_eq!(merged, 4);
        assert_eq!(report.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_error_is_fatal_under_continue() {
        let executor = ParallelExecutor::new(2);
        let work = (0..3u32).map(|i| async move { Ok::<_, PipelineError>(i) });

        let err = executor
            .spawn_all(work)
            .drain(FailurePolicy::Continue, |_| {
                Err(PipelineError::Internal("axis outside topic".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[tokio::test]
    async fn test_panicking_item_surfaces_as_task_failure() {
        let executor = ParallelExecutor::new(2);
        let work = (0..2u32).map(|i| async move {
            if i == 1 {
                panic!("worker exploded");
            }
            Ok::<_, PipelineError>(i)
        });

        let mut completions = executor.spawn_all(work);
        let mut failures = 0;
        while let Some(result) = completions.next().await {
            if let Err(PipelineError::TaskFailed(msg)) = result {
                assert!(msg.contains("panicked"));
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_zero_workers_is_clamped_to_one() {
        let executor = ParallelExecutor::new(0);
        assert_eq!(executor.workers(), 1);
        let report = executor
            .spawn_all((0..3u8).map(|i| async move { Ok::<_, PipelineError>(i) }))
            .drain(FailurePolicy::FailFast, |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(report.completed, 3);
    }

    #[tokio::test]
    async fn test_empty_work_drains_immediately() {
        let executor = ParallelExecutor::new(4);
        let work: Vec<std::future::Ready<Result<u8>>> = Vec::new();
        let report = executor
            .spawn_all(work)
            .drain(FailurePolicy::FailFast, |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(report.completed, 0);
        assert!(report.failures.is_empty());
    }
}
