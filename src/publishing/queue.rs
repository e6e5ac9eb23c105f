/// Publishing queue: single-flight guard, bounded retries, and timeouts
///
/// The retry/backpressure boundary of the pipeline. This is the only place
/// an operator-scoped publish can be rejected outright (duplicate in
/// flight) or permanently given up on (retry budget exhausted) without
/// touching business logic. The wrapped operation races a timeout; the
/// timeout drops the future, abandoning the in-flight work at its next
/// await point.
use crate::config::PublishingConfig;
use crate::error::{PublishError, PublishResult};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};

/// Broad classification of a failed attempt, kept so the API layer can map
/// rejections back to the right status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Timeout,
    Commit,
    Generation,
    Storage,
    Other,
}

/// Per-operator failure record
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts: u32,
    pub last_error: String,
    pub kind: FailureKind,
}

/// Tracks in-flight publish operations and per-operator retry budgets
#[derive(Debug)]
pub struct PublishQueue {
    config: PublishingConfig,
    in_flight: Mutex<HashSet<String>>,
    errors: Mutex<HashMap<String, RetryState>>,
}

impl PublishQueue {
    /// Create a queue with the given tunables
    pub fn new(config: PublishingConfig) -> Self {
        Self {
            config,
            in_flight: Mutex::new(HashSet::new()),
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a publish for this operator is already in flight
    pub fn is_in_queue(&self, operator_id: &str) -> bool {
        self.with_in_flight(|set| set.contains(operator_id))
    }

    /// Record a failed attempt and its user-facing message
    pub fn record_error(&self, operator_id: &str, message: &str, kind: FailureKind) {
        let mut errors = match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = errors.entry(operator_id.to_string()).or_insert(RetryState {
            attempts: 0,
            last_error: String::new(),
            kind,
        });
        entry.attempts += 1;
        entry.last_error = message.to_string();
        entry.kind = kind;
        warn!(
            "Recorded publish error for {} (attempt {}): {}",
            operator_id, entry.attempts, message
        );
    }

    /// Whether this operator still has retry budget left
    pub fn can_retry(&self, operator_id: &str) -> bool {
        self.attempts(operator_id) < self.config.max_retry_attempts
    }

    /// Failed attempts recorded for this operator
    pub fn attempts(&self, operator_id: &str) -> u32 {
        let errors = match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        errors.get(operator_id).map(|s| s.attempts).unwrap_or(0)
    }

    /// Last recorded failure for this operator, if any
    pub fn last_error(&self, operator_id: &str) -> Option<RetryState> {
        let errors = match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        errors.get(operator_id).cloned()
    }

    /// Reset the failure record for this operator
    pub fn clear_error(&self, operator_id: &str) {
        let mut errors = match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        errors.remove(operator_id);
    }

    /// Run a publish-scoped operation under the queue's guarantees.
    ///
    /// Returns `None` without invoking the operation when a publish for the
    /// same operator is already in flight or the retry budget is exhausted.
    /// Otherwise runs the operation under the configured timeout, clears the
    /// failure record on success, and records a classified error on failure.
    /// The operator is removed from the in-flight set on every outcome.
    pub async fn run<T, F, Fut>(&self, operator_id: &str, label: &str, operation: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PublishResult<T>>,
    {
        // Admission is a single critical section: checking and inserting
        // separately would let two simultaneous calls both pass the checks
        {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if in_flight.contains(operator_id) {
                warn!(
                    "Rejected {} for {}: operation already in progress",
                    label, operator_id
                );
                return None;
            }
            if !self.can_retry(operator_id) {
                warn!(
                    "Rejected {} for {}: retry budget of {} exhausted",
                    label, operator_id, self.config.max_retry_attempts
                );
                return None;
            }
            in_flight.insert(operator_id.to_string());
        }
        let _in_flight = InFlightGuard {
            queue: self,
            operator_id,
        };

        let timeout_secs = self.config.operation_timeout_secs;
        let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), operation()).await;

        let result = match outcome {
            Err(_) => {
                let message = format!("{} timed out after {}s", label, timeout_secs);
                error!("{} for operator {}", message, operator_id);
                self.record_error(operator_id, &message, FailureKind::Timeout);
                None
            }
            Ok(Err(e)) => {
                let message = classify_error(&e, label);
                error!("{} failed for operator {}: {}", label, operator_id, e);
                self.record_error(operator_id, &message, failure_kind(&e));
                None
            }
            Ok(Ok(value)) => {
                info!("{} succeeded for operator {}", label, operator_id);
                self.clear_error(operator_id);
                Some(value)
            }
        };

        result
    }

    fn with_in_flight<R>(&self, f: impl FnOnce(&mut HashSet<String>) -> R) -> R {
        let mut set = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut set)
    }
}

/// Removes the operator from the in-flight set when dropped, so the entry
/// is also released if the caller's future is cancelled mid-operation
struct InFlightGuard<'a> {
    queue: &'a PublishQueue,
    operator_id: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.queue.with_in_flight(|set| {
            set.remove(self.operator_id);
        });
    }
}

/// Broad failure category for a pipeline error
fn failure_kind(error: &PublishError) -> FailureKind {
    match error {
        PublishError::Timeout(_) => FailureKind::Timeout,
        PublishError::Validation(_) => FailureKind::Validation,
        PublishError::Generation(_) => FailureKind::Generation,
        PublishError::Commit(_) => FailureKind::Commit,
        PublishError::Database(_) => FailureKind::Storage,
        _ => FailureKind::Other,
    }
}

/// Turn a pipeline error into the message shown to the editor
fn classify_error(error: &PublishError, label: &str) -> String {
    match error {
        PublishError::Timeout(secs) => {
            format!("{} timed out after {}s. Please try again.", label, secs)
        }
        PublishError::Validation(msg) => msg.clone(),
        PublishError::Generation(_) => "Static content generation failed".to_string(),
        PublishError::Commit(msg) => format!("Publishing could not be committed: {}", msg),
        PublishError::Database(_) => {
            format!("A storage error interrupted {}. Please try again.", label)
        }
        other => format!("{} failed: {}", label, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_queue() -> PublishQueue {
        PublishQueue::new(PublishingConfig {
            operation_timeout_secs: 60,
            max_retry_attempts: 3,
        })
    }

    #[tokio::test]
    async fn test_success_clears_errors_and_queue() {
        let queue = test_queue();
        queue.record_error("op-1", "earlier failure", FailureKind::Other);

        let result = queue.run("op-1", "publish", || async { Ok(42) }).await;

        assert_eq!(result, Some(42));
        assert!(!queue.is_in_queue("op-1"));
        assert_eq!(queue.attempts("op-1"), 0);
    }

    #[tokio::test]
    async fn test_second_call_rejected_while_in_flight() {
        let queue = Arc::new(test_queue());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let started = Arc::new(tokio::sync::Notify::new());

        let first = {
            let queue = Arc::clone(&queue);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                queue
                    .run("op-1", "publish", move || async move {
                        started.notify_one();
                        release_rx.await.ok();
                        Ok::<_, PublishError>("first")
                    })
                    .await
            })
        };

        started.notified().await;
        assert!(queue.is_in_queue("op-1"));

        let invoked = Arc::new(AtomicU32::new(0));
        let invoked_clone = Arc::clone(&invoked);
        let second = queue
            .run("op-1", "publish", || async move {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                Ok("second")
            })
            .await;

        assert_eq!(second, None);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        release_tx.send(()).ok();
        let first_result = first.await.expect("task panicked");
        assert_eq!(first_result, Some("first"));
        assert!(!queue.is_in_queue("op-1"));
    }

    #[tokio::test]
    async fn test_retry_budget_bounds_attempts() {
        let queue = test_queue();

        for _ in 0..3 {
            let result: Option<()> = queue
                .run("op-1", "publish", || async {
                    Err(PublishError::Internal("boom".to_string()))
                })
                .await;
            assert_eq!(result, None);
        }
        assert_eq!(queue.attempts("op-1"), 3);
        assert!(!queue.can_retry("op-1"));

        // Fourth attempt is rejected before invoking the operation
        let invoked = Arc::new(AtomicU32::new(0));
        let invoked_clone = Arc::clone(&invoked);
        let result = queue
            .run("op-1", "publish", || async move {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(result, None);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        // A success (after clearing) resets the budget
        queue.clear_error("op-1");
        let result = queue.run("op-1", "publish", || async { Ok(()) }).await;
        assert_eq!(result, Some(()));
        assert!(queue.can_retry("op-1"));
        assert_eq!(queue.attempts("op-1"), 0);
    }

    #[tokio::test]
    async fn test_timeout_records_error() {
        let queue = PublishQueue::new(PublishingConfig {
            operation_timeout_secs: 1,
            max_retry_attempts: 3,
        });

        let result: Option<()> = queue
            .run("op-1", "publish", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, None);
        assert!(!queue.is_in_queue("op-1"));
        let state = queue.last_error("op-1").expect("error recorded");
        assert_eq!(state.attempts, 1);
        assert!(state.last_error.contains("timed out"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_admission_admits_exactly_one() {
        let queue = Arc::new(test_queue());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));
        let invoked = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let invoked = Arc::clone(&invoked);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                queue
                    .run("op-1", "publish", move || async move {
                        invoked.fetch_add(1, Ordering::SeqCst);
                        // Keep the winner in flight while the losers race
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        Ok::<_, PublishError>(())
                    })
                    .await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.expect("task panicked").is_some() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert!(!queue.is_in_queue("op-1"));
    }

    #[tokio::test]
    async fn test_different_operators_run_independently() {
        let queue = test_queue();
        queue.record_error("op-1", "a", FailureKind::Other);
        queue.record_error("op-1", "b", FailureKind::Other);
        queue.record_error("op-1", "c", FailureKind::Other);

        assert!(!queue.can_retry("op-1"));
        assert!(queue.can_retry("op-2"));

        let result = queue.run("op-2", "publish", || async { Ok(7) }).await;
        assert_eq!(result, Some(7));
    }
}
