//! Error types for the scheduler crate.
//!
//! Each leaf operation returns its own concrete error enum; crate-level
//! operations that can fail for more than one underlying reason (the
//! programmatic surface of [`crate::Scheduler`]) wrap those in
//! [`SchedulerError`]. All enums follow the manual `Display` + `Error`
//! convention used throughout the workspace rather than a derive macro.

use std::fmt;

/// Errors from [`crate::store::JobStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStoreError {
    /// The job failed validation (see `Job::validate`).
    Validation { reason: String },
    /// No job with the given id exists.
    NotFound { id: String },
    /// The underlying medium failed to read, write, or decode a record.
    Io { reason: String },
}

impl fmt::Display for JobStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { reason } => write!(f, "job validation failed: {reason}"),
            Self::NotFound { id } => write!(f, "job not found: {id}"),
            Self::Io { reason } => write!(f, "job store I/O failed: {reason}"),
        }
    }
}

impl std::error::Error for JobStoreError {}

/// Errors from parsing or evaluating a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    /// The expression does not have five whitespace-separated fields, or a
    /// field's value is out of range.
    InvalidExpression { expression: String, reason: String },
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
        }
    }
}

impl std::error::Error for CronError {}

/// Errors from [`crate::scheduler::Scheduler::register_trigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Trigger name was empty.
    InvalidName,
    /// Trigger schedule expression was empty.
    InvalidSchedule,
    /// The schedule expression failed to parse.
    Cron(CronError),
    /// The job store rejected the save/load.
    Store(JobStoreError),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "trigger name must not be empty"),
            Self::InvalidSchedule => write!(f, "trigger schedule must not be empty"),
            Self::Cron(err) => write!(f, "registration failed: {err}"),
            Self::Store(err) => write!(f, "registration failed: {err}"),
        }
    }
}

impl std::error::Error for RegistrationError {}

impl From<CronError> for RegistrationError {
    fn from(err: CronError) -> Self {
        Self::Cron(err)
    }
}

impl From<JobStoreError> for RegistrationError {
    fn from(err: JobStoreError) -> Self {
        Self::Store(err)
    }
}

/// Errors surfaced by the coordinator collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorError {
    pub reason: String,
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coordinator failed: {}", self.reason)
    }
}

impl std::error::Error for CoordinatorError {}

/// Errors surfaced by the notifier collaborator. Never propagates past the
/// executor (§7): the executor logs it and continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierError {
    pub reason: String,
}

impl fmt::Display for NotifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notifier failed: {}", self.reason)
    }
}

impl std::error::Error for NotifierError {}

/// The outcome of a single run, used internally by the executor to decide
/// failure accounting. Not all variants are errors in the ordinary sense:
/// `Cancelled` is a terminal, non-retryable outcome that does not increment
/// `FailureCount` (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// `Channel == "lark"` with a `UserID` not shaped like `ou_*`.
    LarkUserIdInvalid { user_id: String },
    /// The coordinator returned an error.
    Coordinator(CoordinatorError),
    /// The scheduler's root context was cancelled mid-run. Not a failure.
    Cancelled,
    /// The per-run deadline elapsed before the coordinator returned. A
    /// failure.
    DeadlineExceeded,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LarkUserIdInvalid { user_id } => {
                write!(f, "lark user id '{user_id}' is not a valid open id (expected ou_ prefix)")
            }
            Self::Coordinator(err) => write!(f, "{err}"),
            Self::Cancelled => write!(f, "run cancelled"),
            Self::DeadlineExceeded => write!(f, "run deadline exceeded"),
        }
    }
}

impl std::error::Error for RunError {}

/// Errors from the leader lock collaborator. A structural acquisition
/// failure aborts `Start`; a clean "not acquired" outcome is represented as
/// a value ([`crate::collaborators::LeaderLockOutcome::Standby`]), not this
/// error type (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderLockError {
    pub reason: String,
}

impl fmt::Display for LeaderLockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leader lock acquisition failed: {}", self.reason)
    }
}

impl std::error::Error for LeaderLockError {}

/// Errors from the goal store collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalStoreError {
    pub reason: String,
}

impl fmt::Display for GoalStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "goal store query failed: {}", self.reason)
    }
}

impl std::error::Error for GoalStoreError {}

/// Crate-level error for the programmatic surface (§6.5), wrapping
/// whichever lower-level error kind actually occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    Registration(RegistrationError),
    Store(JobStoreError),
    /// `ListJobs`/`LoadJob` called with no store configured.
    NoStoreConfigured,
    LeaderLock(LeaderLockError),
    /// `Drain`'s deadline elapsed before in-flight runs quiesced. The
    /// scheduler still finished tearing down (§4.7).
    DrainDeadlineExceeded,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::NoStoreConfigured => write!(f, "no job store is configured"),
            Self::LeaderLock(err) => write!(f, "{err}"),
            Self::DrainDeadlineExceeded => write!(f, "drain deadline exceeded"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<RegistrationError> for SchedulerError {
    fn from(err: RegistrationError) -> Self {
        Self::Registration(err)
    }
}

impl From<JobStoreError> for SchedulerError {
    fn from(err: JobStoreError) -> Self {
        Self::Store(err)
    }
}

impl From<LeaderLockError> for SchedulerError {
    fn from(err: LeaderLockError) -> Self {
        Self::LeaderLock(err)
    }
}
