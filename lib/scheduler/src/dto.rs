//! Programmatic surface DTOs (§6.5): a denormalized read view over a
//! [`Job`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::job::{Job, JobStatus};

/// Read-only projection of a [`Job`] returned by the programmatic surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDto {
    pub id: String,
    pub name: String,
    pub cron_expr: String,
    pub trigger: String,
    pub payload: JsonValue,
    pub status: JobStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobDto {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            name: job.name,
            cron_expr: job.cron_expr,
            trigger: job.trigger,
            payload: job.payload,
            status: job.status,
            last_run: job.last_run,
            next_run: job.next_run,
            failure_count: job.failure_count,
            last_failure: job.last_failure,
            last_error: job.last_error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

impl From<&Job> for JobDto {
    fn from(job: &Job) -> Self {
        Self::from(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dto_mirrors_job_fields() {
        let job = Job::new("daily", "Daily report", "0 9 * * 1", "go");
        let dto: JobDto = job.clone().into();
        assert_eq!(dto.id, job.id);
        assert_eq!(dto.status, job.status);
        assert_eq!(dto.created_at, job.created_at);
    }
}
