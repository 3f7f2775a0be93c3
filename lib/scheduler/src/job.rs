//! The persisted [`Job`] record and its status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::JobStoreError;

/// Status of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Newly created, not yet scheduled (transient; jobs are normally
    /// created directly into `Active`).
    Pending,
    /// Scheduled and eligible for runs.
    Active,
    /// Recovery exhausted; no further runs are admitted until an operator
    /// intervenes.
    Paused,
    /// Finished for good; no further runs are admitted.
    Completed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// Durable record of a scheduled unit of work.
///
/// `id` is the stable key used by the store and is equal to the owning
/// trigger's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub cron_expr: String,
    pub trigger: String,
    #[serde(default = "default_payload")]
    pub payload: JsonValue,
    pub status: JobStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_payload() -> JsonValue {
    JsonValue::Object(Default::default())
}

impl Job {
    /// Creates a new job in `Active` status with `created_at`/`updated_at`
    /// set to now.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, cron_expr: impl Into<String>, trigger: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            cron_expr: cron_expr.into(),
            trigger: trigger.into(),
            payload: default_payload(),
            status: JobStatus::Active,
            last_run: None,
            next_run: None,
            failure_count: 0,
            last_failure: None,
            last_error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the payload and returns `self` (builder-style).
    #[must_use]
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    /// Validates invariants 1 of §3: `id`/`name`/`cron_expr` non-empty.
    /// `status` is always one of the four enum values by construction, so
    /// that half of invariant 1 cannot be violated in safe Rust.
    pub fn validate(&self) -> Result<(), JobStoreError> {
        if self.id.trim().is_empty() {
            return Err(JobStoreError::Validation { reason: "id must not be empty".to_string() });
        }
        if self.name.trim().is_empty() {
            return Err(JobStoreError::Validation { reason: "name must not be empty".to_string() });
        }
        if self.cron_expr.trim().is_empty() {
            return Err(JobStoreError::Validation { reason: "cron_expr must not be empty".to_string() });
        }
        Ok(())
    }

    /// Records a successful run: resets `failure_count`, clears
    /// `last_error` (invariant 4 of §3).
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.failure_count = 0;
        self.last_error.clear();
        self.updated_at = now;
    }

    /// Records a failed run.
    pub fn record_failure(&mut self, now: DateTime<Utc>, reason: impl Into<String>) {
        self.failure_count += 1;
        self.last_failure = Some(now);
        self.last_error = reason.into();
        self.updated_at = now;
    }

    /// Records a run rejected by validation (§7) before it ever reached the
    /// coordinator. Distinct from [`Self::record_failure`]: `last_error` is
    /// updated for operator visibility, but `failure_count` is left
    /// untouched since a malformed trigger will reject every retry
    /// identically and should not count toward recovery/pause accounting.
    pub fn record_invalid(&mut self, now: DateTime<Utc>, reason: impl Into<String>) {
        self.last_error = reason.into();
        self.updated_at = now;
    }

    /// True once `failure_count` exceeds `max_retries` (invariant 5 of §3).
    #[must_use]
    pub fn exhausted(&self, max_retries: u32) -> bool {
        self.failure_count > max_retries
    }

    #[must_use]
    pub fn is_admissible(&self) -> bool {
        matches!(self.status, JobStatus::Active | JobStatus::Pending)
    }

    /// Routing fields are carried in `payload` rather than as dedicated
    /// Job columns (§3): `{"channel": ..., "user_id": ..., "chat_id": ...,
    /// "goal_id": ..., "look_ahead_minutes": ...}`.
    fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.payload_str("channel")
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.payload_str("user_id")
    }

    #[must_use]
    pub fn chat_id(&self) -> Option<&str> {
        self.payload_str("chat_id")
    }

    #[must_use]
    pub fn goal_id(&self) -> Option<&str> {
        self.payload_str("goal_id")
    }

    /// Look-ahead window in minutes for the synthetic `calendar:reminder`
    /// trigger, carried in `payload` so the coordinator-side prompt can be
    /// regenerated from persisted state after a restart.
    #[must_use]
    pub fn look_ahead_minutes(&self) -> Option<u32> {
        self.payload.get("look_ahead_minutes").and_then(|v| v.as_u64()).map(|v| v as u32)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
