//! Runtime trigger projection and concurrency policy.

use serde::{Deserialize, Serialize};

/// In-memory value derived from a [`crate::job::Job`] plus configuration.
/// Not itself persisted; reconstructed from the `Job` on registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub schedule: String,
    pub task: String,
    pub channel: Option<String>,
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
    pub goal_id: Option<String>,
    /// Carried by the synthetic `calendar:reminder` trigger so the
    /// coordinator-side prompt can be regenerated from persisted state
    /// after a restart without re-reading configuration.
    pub look_ahead_minutes: Option<u32>,
}

/// Prefix used for triggers sourced from the goal store (§4.6).
pub const DYNAMIC_TRIGGER_PREFIX: &str = "okr:";

/// Reserved name for the synthetic heartbeat trigger (§6.1).
pub const HEARTBEAT_TRIGGER_NAME: &str = "__heartbeat__";

/// Reserved name for the synthetic calendar-reminder trigger (§6.1).
pub const CALENDAR_REMINDER_TRIGGER_NAME: &str = "calendar:reminder";

impl Trigger {
    #[must_use]
    pub fn new(name: impl Into<String>, schedule: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            task: task.into(),
            channel: None,
            user_id: None,
            chat_id: None,
            goal_id: None,
            look_ahead_minutes: None,
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    #[must_use]
    pub fn with_goal_id(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    #[must_use]
    pub fn with_look_ahead_minutes(mut self, minutes: u32) -> Self {
        self.look_ahead_minutes = Some(minutes);
        self
    }

    /// A trigger with a non-empty `goal_id` is classified as dynamic: its
    /// lifecycle is driven by the goal-store sync (§4.6), not by static
    /// config or direct API registration.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.goal_id.is_some() || self.name.starts_with(DYNAMIC_TRIGGER_PREFIX)
    }

    /// The dynamic trigger name for a given goal id: `okr:{goal_id}`.
    #[must_use]
    pub fn dynamic_name(goal_id: &str) -> String {
        format!("{DYNAMIC_TRIGGER_PREFIX}{goal_id}")
    }
}

/// Per-trigger policy for what happens when a tick fires while the
/// previous invocation of the *same* trigger is still running (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Drop the tick if the previous run of this trigger has not finished.
    #[default]
    Skip,
    /// Defer the tick until the running invocation completes, then run it
    /// immediately. The backlog this can accumulate during one long run is
    /// left unbounded; see `DESIGN.md`.
    Delay,
}

impl ConcurrencyPolicy {
    /// Parses a configuration string, falling back to `Skip` with a
    /// warning for unrecognized values (§4.3).
    #[must_use]
    pub fn from_config_str(raw: &str) -> Self {
        match raw {
            "delay" => Self::Delay,
            "skip" => Self::Skip,
            other => {
                tracing::warn!(value = other, "unknown concurrency policy, falling back to skip");
                Self::Skip
            }
        }
    }
}
