//! Narrow trait-object interfaces for every external collaborator (§6, §9).
//!
//! Each is a small capability set (1-3 operations): a trait object the
//! scheduler depends on, plus in-memory mocks colocated with the tests that
//! use them.

use async_trait::async_trait;

use crate::error::{CoordinatorError, GoalStoreError, LeaderLockError, NotifierError};

/// The outcome of a successful coordinator invocation (§6.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub answer: String,
}

/// Receives intermediate events from a coordinator invocation. The
/// scheduler does not require any specific event to fire and does not
/// interpret the event payload.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &str);
}

/// The opaque task-executing collaborator (§6.2). Out of scope for this
/// crate's own implementation; only the contract is specified here.
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn execute_task(
        &self,
        task: &str,
        session_id: &str,
        listener: Option<&dyn EventListener>,
    ) -> Result<TaskResult, CoordinatorError>;
}

/// The notification fan-out collaborator (§6.3).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_lark(&self, chat_id: &str, content: &str) -> Result<(), NotifierError>;
    async fn send_moltbook(&self, content: &str) -> Result<(), NotifierError>;
}

/// Fan-out composite: iterates its children and returns the first error
/// (§9).
pub struct CompositeNotifier {
    children: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    #[must_use]
    pub fn new(children: Vec<Box<dyn Notifier>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn send_lark(&self, chat_id: &str, content: &str) -> Result<(), NotifierError> {
        for child in &self.children {
            child.send_lark(chat_id, content).await?;
        }
        Ok(())
    }

    async fn send_moltbook(&self, content: &str) -> Result<(), NotifierError> {
        for child in &self.children {
            child.send_moltbook(content).await?;
        }
        Ok(())
    }
}

/// Satisfies the `Notifier` interface when notifications are disabled
/// (§9).
#[derive(Debug, Default, Clone, Copy)]
pub struct NopNotifier;

#[async_trait]
impl Notifier for NopNotifier {
    async fn send_lark(&self, _chat_id: &str, _content: &str) -> Result<(), NotifierError> {
        Ok(())
    }

    async fn send_moltbook(&self, _content: &str) -> Result<(), NotifierError> {
        Ok(())
    }
}

/// Result of attempting to acquire the leader lock (§7, §9, glossary
/// entry "Standby"). A clean "not acquired" outcome is a value, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderLockOutcome {
    Acquired,
    Standby,
}

/// Mutual-exclusion collaborator for multi-replica deployments (§6.1,
/// §9). Out of scope for this crate's own implementation.
#[async_trait]
pub trait LeaderLock: Send + Sync {
    /// Blocking acquisition attempt. A structural error aborts `Start`; a
    /// clean standby outcome does not.
    async fn acquire(&self) -> Result<LeaderLockOutcome, LeaderLockError>;

    /// Releases the lock. Called exactly once on `Stop`.
    async fn release(&self);
}

/// A goal as reported by the goal store (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    pub id: String,
    pub status: String,
    pub review_cadence_cron: String,
}

impl Goal {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Source of dynamic, review-cadence-driven triggers (§4.6). Out of scope
/// for this crate's own implementation.
#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn list_goals(&self) -> Result<Vec<Goal>, GoalStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingNotifier {
        lark_calls: StdMutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Self {
            Self { lark_calls: StdMutex::new(Vec::new()), fail }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_lark(&self, chat_id: &str, content: &str) -> Result<(), NotifierError> {
            if self.fail {
                return Err(NotifierError { reason: "boom".to_string() });
            }
            self.lark_calls.lock().unwrap().push((chat_id.to_string(), content.to_string()));
            Ok(())
        }

        async fn send_moltbook(&self, _content: &str) -> Result<(), NotifierError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn nop_notifier_always_succeeds() {
        let notifier = NopNotifier;
        assert!(notifier.send_lark("oc_test", "hello").await.is_ok());
        assert!(notifier.send_moltbook("hello").await.is_ok());
    }

    #[tokio::test]
    async fn composite_notifier_fans_out() {
        let composite = CompositeNotifier::new(vec![Box::new(RecordingNotifier::new(false))]);
        composite.send_lark("oc_test", "hello").await.expect("fan out");
    }

    #[tokio::test]
    async fn composite_notifier_returns_first_error() {
        let composite = CompositeNotifier::new(vec![Box::new(RecordingNotifier::new(true))]);
        let err = composite.send_lark("oc_test", "hello").await.unwrap_err();
        assert_eq!(err.reason, "boom");
    }

    #[test]
    fn goal_active_classification() {
        let goal = Goal { id: "g1".to_string(), status: "active".to_string(), review_cadence_cron: "0 0 * * 1".to_string() };
        assert!(goal.is_active());
    }
}
