//! Execution and outcome composition: §4.4 steps 6-12, the part of
//! `RunJob` that runs outside the scheduler's exclusive lock.

use std::time::Duration;

use tokio::sync::watch;
use ulid::Ulid;

use crate::collaborators::{Coordinator, Notifier};
use crate::error::RunError;
use crate::job::Job;

/// The result of one run, carrying enough information for the caller to
/// update `FailureCount`/`Status` under the lock again (§4.4 steps 13-14).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success { answer: String },
    /// A `CoordinatorFailure` or `DeadlineExceeded` (§7): counts toward
    /// `FailureCount` and drives recovery/pause.
    Failure { error: RunError },
    /// A `Validation` error (§7), distinct from `CoordinatorFailure`: the
    /// run never reached the coordinator, so it neither increments
    /// `FailureCount` nor schedules a recovery retry — retrying a
    /// malformed trigger configuration would only repeat the same
    /// rejection.
    Invalid { error: RunError },
    /// Cancellation: a terminal outcome that does *not* increment
    /// `FailureCount` (§7).
    Cancelled,
}

async fn wait_for_cancel(cancelled: &mut watch::Receiver<bool>) {
    loop {
        if *cancelled.borrow() {
            return;
        }
        if cancelled.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Builds the session identifier of the form
/// `scheduler-{name}-{monotonic-unique-suffix}` (§4.4 step 6). Two
/// consecutive runs of the same trigger never share one since a ULID's
/// randomness component differs even within the same millisecond.
#[must_use]
pub fn session_id(name: &str) -> String {
    format!("scheduler-{name}-{}", Ulid::new())
}

/// Runs one fire of `name` to completion: invokes the coordinator under an
/// optional deadline and cooperative cancellation, composes the outcome
/// summary, and dispatches it to the notifier if configured.
pub async fn execute_run(
    coordinator: &dyn Coordinator,
    notifier: &dyn Notifier,
    job: &Job,
    name: &str,
    timeout: Option<Duration>,
    mut cancelled: watch::Receiver<bool>,
) -> ExecutionOutcome {
    let session = session_id(name);

    // Step 8: channel-specific precondition for lark.
    if job.channel() == Some("lark") {
        if let Some(user_id) = job.user_id() {
            if !user_id.is_empty() && !user_id.starts_with("ou_") {
                tracing::warn!(trigger = name, user_id, "lark user id is not a valid open id, aborting run");
                return ExecutionOutcome::Invalid { error: RunError::LarkUserIdInvalid { user_id: user_id.to_string() } };
            }
        }
    }

    let call = coordinator.execute_task(&job.trigger, &session, None);

    let call_result = tokio::select! {
        res = call => CallResult::Completed(res),
        _ = sleep_or_pending(timeout) => CallResult::TimedOut,
        _ = wait_for_cancel(&mut cancelled) => CallResult::Cancelled,
    };

    let (summary, outcome) = match call_result {
        CallResult::Completed(Ok(result)) => {
            if result.answer.trim().is_empty() {
                ("no result".to_string(), ExecutionOutcome::Success { answer: result.answer })
            } else {
                (result.answer.clone(), ExecutionOutcome::Success { answer: result.answer })
            }
        }
        CallResult::Completed(Err(err)) => {
            let summary = format!("failed: {err}");
            (summary, ExecutionOutcome::Failure { error: RunError::Coordinator(err) })
        }
        CallResult::TimedOut => {
            tracing::warn!(trigger = name, "run deadline exceeded");
            ("failed: deadline exceeded".to_string(), ExecutionOutcome::Failure { error: RunError::DeadlineExceeded })
        }
        CallResult::Cancelled => {
            tracing::info!(trigger = name, "run cancelled by shutdown");
            ("cancelled".to_string(), ExecutionOutcome::Cancelled)
        }
    };

    // Step 11: notifier dispatch. Never fails the run.
    if let Some(chat_id) = job.chat_id() {
        let result = if job.channel() == Some("lark") {
            notifier.send_lark(chat_id, &summary).await
        } else {
            notifier.send_moltbook(&summary).await
        };
        if let Err(err) = result {
            tracing::warn!(trigger = name, error = %err, "notifier failed");
        }
    }

    outcome
}

enum CallResult<T> {
    Completed(T),
    TimedOut,
    Cancelled,
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{NopNotifier, TaskResult};
    use crate::error::CoordinatorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCoordinator {
        calls: Arc<AtomicUsize>,
        answer: Result<String, String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Coordinator for CountingCoordinator {
        async fn execute_task(
            &self,
            _task: &str,
            _session_id: &str,
            _listener: Option<&dyn crate::collaborators::EventListener>,
        ) -> Result<TaskResult, CoordinatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            match &self.answer {
                Ok(answer) => Ok(TaskResult { answer: answer.clone() }),
                Err(reason) => Err(CoordinatorError { reason: reason.clone() }),
            }
        }
    }

    fn job_with_payload(payload: serde_json::Value) -> Job {
        Job::new("daily", "Daily report", "0 9 * * 1", "go").with_payload(payload)
    }

    #[tokio::test]
    async fn success_path_uses_answer_as_summary() {
        let job = job_with_payload(serde_json::json!({}));
        let coordinator = CountingCoordinator { calls: Arc::new(AtomicUsize::new(0)), answer: Ok("done".to_string()), delay: None };
        let (_tx, rx) = watch::channel(false);
        let outcome = execute_run(&coordinator, &NopNotifier, &job, "daily", None, rx).await;
        assert_eq!(outcome, ExecutionOutcome::Success { answer: "done".to_string() });
    }

    #[tokio::test]
    async fn coordinator_error_is_a_failure() {
        let job = job_with_payload(serde_json::json!({}));
        let coordinator = CountingCoordinator { calls: Arc::new(AtomicUsize::new(0)), answer: Err("boom".to_string()), delay: None };
        let (_tx, rx) = watch::channel(false);
        let outcome = execute_run(&coordinator, &NopNotifier, &job, "daily", None, rx).await;
        assert!(matches!(outcome, ExecutionOutcome::Failure { error: RunError::Coordinator(_) }));
    }

    #[tokio::test]
    async fn invalid_lark_user_id_skips_coordinator() {
        let job = job_with_payload(serde_json::json!({"channel": "lark", "user_id": "user-1"}));
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = CountingCoordinator { calls: calls.clone(), answer: Ok("done".to_string()), delay: None };
        let (_tx, rx) = watch::channel(false);
        let outcome = execute_run(&coordinator, &NopNotifier, &job, "daily", None, rx).await;
        assert!(matches!(outcome, ExecutionOutcome::Invalid { error: RunError::LarkUserIdInvalid { .. } }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_lark_open_id_invokes_coordinator() {
        let job = job_with_payload(serde_json::json!({"channel": "lark", "user_id": "ou_test", "chat_id": "oc_test"}));
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = CountingCoordinator { calls: calls.clone(), answer: Ok("done".to_string()), delay: None };
        let (_tx, rx) = watch::channel(false);
        let outcome = execute_run(&coordinator, &NopNotifier, &job, "daily", None, rx).await;
        assert_eq!(outcome, ExecutionOutcome::Success { answer: "done".to_string() });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_exceeded_is_a_failure() {
        let job = job_with_payload(serde_json::json!({}));
        let coordinator = CountingCoordinator {
            calls: Arc::new(AtomicUsize::new(0)),
            answer: Ok("done".to_string()),
            delay: Some(Duration::from_millis(50)),
        };
        let (_tx, rx) = watch::channel(false);
        let outcome = execute_run(&coordinator, &NopNotifier, &job, "daily", Some(Duration::from_millis(5)), rx).await;
        assert_eq!(outcome, ExecutionOutcome::Failure { error: RunError::DeadlineExceeded });
    }

    #[tokio::test]
    async fn cancellation_is_not_a_failure() {
        let job = job_with_payload(serde_json::json!({}));
        let coordinator = CountingCoordinator {
            calls: Arc::new(AtomicUsize::new(0)),
            answer: Ok("done".to_string()),
            delay: Some(Duration::from_millis(50)),
        };
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("send cancel");
        let outcome = execute_run(&coordinator, &NopNotifier, &job, "daily", None, rx).await;
        assert_eq!(outcome, ExecutionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn empty_answer_is_reported_as_no_result() {
        let job = job_with_payload(serde_json::json!({}));
        let coordinator = CountingCoordinator { calls: Arc::new(AtomicUsize::new(0)), answer: Ok(String::new()), delay: None };
        let (_tx, rx) = watch::channel(false);
        let outcome = execute_run(&coordinator, &NopNotifier, &job, "daily", None, rx).await;
        assert_eq!(outcome, ExecutionOutcome::Success { answer: String::new() });
    }
}
