//! Proactive cron-driven task scheduler for silver-telegram.
//!
//! This crate provides:
//!
//! - **Job store**: persistent, atomic-write key-value store of scheduled
//!   jobs (`store`, `job`)
//! - **Cron engine**: 5-field expression parsing and next-fire computation
//!   (`cron`)
//! - **Trigger registry & lifecycle**: registration, start/stop/drain,
//!   leader-lock standby, dynamic source sync (`trigger`, `scheduler`,
//!   `dynamic_sync`)
//! - **Run gate & executor**: cooldown/concurrency admission, coordinator
//!   invocation, outcome persistence, notification fan-out (`gate`,
//!   `executor`)
//! - **Recovery engine**: exponential-backoff retries with pause-on-exhaustion
//!   (`recovery`)

pub mod collaborators;
pub mod config;
pub mod cron;
pub mod dto;
pub mod dynamic_sync;
pub mod error;
pub mod executor;
pub mod gate;
pub mod job;
pub mod recovery;
pub mod scheduler;
pub mod store;
pub mod trigger;

pub use collaborators::{CompositeNotifier, Coordinator, Goal, GoalStore, LeaderLock, LeaderLockOutcome, NopNotifier, Notifier, TaskResult};
pub use config::{CalendarReminderConfig, HeartbeatConfig, SchedulerConfig, StaticTriggerConfig};
pub use cron::CronSchedule;
pub use dto::JobDto;
pub use error::SchedulerError;
pub use job::{Job, JobStatus};
pub use scheduler::Scheduler;
pub use store::{FileJobStore, InMemoryJobStore, JobStore};
pub use trigger::{ConcurrencyPolicy, Trigger};
