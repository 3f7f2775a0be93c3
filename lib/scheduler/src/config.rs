//! Configuration types (§6.1). Loading these from environment/file is a
//! hosting-binary concern; this crate only defines the shape and sane
//! defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::trigger::ConcurrencyPolicy;

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// If false, `Start` is a no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Triggers registered at startup.
    #[serde(default)]
    pub static_triggers: Vec<StaticTriggerConfig>,

    /// If non-empty, enables the dynamic sync of §4.6.
    #[serde(default)]
    pub okr_goals_root: Option<String>,

    #[serde(default)]
    pub calendar_reminder: CalendarReminderConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Per-run deadline; `None` means no deadline.
    #[serde(default, with = "duration_secs_option")]
    pub trigger_timeout: Option<Duration>,

    #[serde(default)]
    pub concurrency_policy: ConcurrencyPolicy,

    /// Minimum interval between successful/attempted runs of a single
    /// trigger.
    #[serde(default, with = "duration_secs")]
    pub cooldown: Duration,

    /// Upper bound on globally in-flight runs; zero disables.
    #[serde(default)]
    pub max_concurrent: usize,

    /// Consecutive failures tolerated before pausing.
    #[serde(default = "default_recovery_max_retries")]
    pub recovery_max_retries: u32,

    /// Base unit of exponential backoff.
    #[serde(default = "default_recovery_backoff", with = "duration_secs")]
    pub recovery_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            static_triggers: Vec::new(),
            okr_goals_root: None,
            calendar_reminder: CalendarReminderConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            trigger_timeout: None,
            concurrency_policy: ConcurrencyPolicy::default(),
            cooldown: Duration::ZERO,
            max_concurrent: 0,
            recovery_max_retries: default_recovery_max_retries(),
            recovery_backoff: default_recovery_backoff(),
        }
    }
}

/// One entry of `SchedulerConfig::static_triggers`.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticTriggerConfig {
    pub name: String,
    pub schedule: String,
    pub task: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Synthetic `calendar:reminder` trigger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarReminderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_calendar_reminder_schedule")]
    pub schedule: String,
    #[serde(default = "default_look_ahead_minutes")]
    pub look_ahead_minutes: u32,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl Default for CalendarReminderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: default_calendar_reminder_schedule(),
            look_ahead_minutes: default_look_ahead_minutes(),
            channel: None,
            user_id: None,
            chat_id: None,
        }
    }
}

/// Synthetic `__heartbeat__` trigger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_schedule")]
    pub schedule: String,
    #[serde(default = "default_heartbeat_task")]
    pub task: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: default_heartbeat_schedule(),
            task: default_heartbeat_task(),
            channel: None,
            user_id: None,
            chat_id: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_recovery_max_retries() -> u32 {
    3
}

fn default_recovery_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_calendar_reminder_schedule() -> String {
    "*/15 * * * *".to_string()
}

fn default_look_ahead_minutes() -> u32 {
    120
}

fn default_heartbeat_schedule() -> String {
    "*/30 * * * *".to_string()
}

fn default_heartbeat_task() -> String {
    "heartbeat".to_string()
}

/// `serde(with = ...)` helper module for plain `Duration` fields expressed
/// as whole seconds in configuration sources.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_secs_option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_enabled_with_no_static_triggers() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert!(config.static_triggers.is_empty());
        assert_eq!(config.max_concurrent, 0);
        assert_eq!(config.recovery_max_retries, 3);
    }

    #[test]
    fn calendar_reminder_defaults() {
        let config = CalendarReminderConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.schedule, "*/15 * * * *");
        assert_eq!(config.look_ahead_minutes, 120);
    }

    #[test]
    fn heartbeat_defaults() {
        let config = HeartbeatConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.schedule, "*/30 * * * *");
    }

    #[test]
    fn deserializes_from_json_with_defaults_applied() {
        let json = serde_json::json!({
            "static_triggers": [
                {"name": "daily", "schedule": "0 9 * * 1", "task": "go"}
            ],
            "cooldown": 30,
            "max_concurrent": 2
        });
        let config: SchedulerConfig = serde_json::from_value(json).expect("deserialize");
        assert!(config.enabled);
        assert_eq!(config.static_triggers.len(), 1);
        assert_eq!(config.cooldown, Duration::from_secs(30));
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.recovery_max_retries, 3);
    }
}
