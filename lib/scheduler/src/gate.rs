//! Run gate: admission logic of §4.4 steps 1-5, run under the scheduler's
//! exclusive lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::JobStoreError;
use crate::job::Job;
use crate::store::JobStore;

/// Why a `RunJob` call was or was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Admitted; the job (with `LastRun` already persisted) to execute.
    Admitted(Job),
    /// No job registered under this name.
    NotFound,
    /// `Status` is `paused` or `completed`.
    NotAdmissible,
    /// `now - LastRun < Cooldown`.
    CooldownActive,
    /// `MaxConcurrent` reached.
    ConcurrencyCapped,
}

impl GateDecision {
    #[must_use]
    pub fn admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Evaluates and applies the admission gate for one trigger (§4.4 steps
/// 1-5). On admission, increments `in_flight[name]`, sets `LastRun = now`,
/// and persists the job (if a store is configured) before returning.
///
/// `bypass_cooldown` is set by the recovery engine (§4.5): recovery retries
/// skip the cooldown check but still honour concurrency and paused-status
/// gates.
pub async fn admit(
    jobs: &mut HashMap<String, Job>,
    in_flight: &mut HashMap<String, u32>,
    store: Option<&dyn JobStore>,
    name: &str,
    cooldown: Duration,
    max_concurrent: usize,
    bypass_cooldown: bool,
    now: DateTime<Utc>,
) -> Result<GateDecision, JobStoreError> {
    let Some(job) = jobs.get(name).cloned() else {
        return Ok(GateDecision::NotFound);
    };

    if !job.is_admissible() {
        return Ok(GateDecision::NotAdmissible);
    }

    if !bypass_cooldown {
        if let Some(last_run) = job.last_run {
            if now - last_run < cooldown {
                return Ok(GateDecision::CooldownActive);
            }
        }
    }

    if max_concurrent > 0 {
        let total: u32 = in_flight.values().sum();
        if total >= max_concurrent as u32 {
            return Ok(GateDecision::ConcurrencyCapped);
        }
    }

    let mut job = job;
    job.last_run = Some(now);
    job.updated_at = now;
    *in_flight.entry(name.to_string()).or_insert(0) += 1;

    let job = match store {
        Some(store) => store.save(job).await?,
        None => job,
    };
    jobs.insert(name.to_string(), job.clone());

    Ok(GateDecision::Admitted(job))
}
