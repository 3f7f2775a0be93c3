//! The [`Scheduler`]: trigger registry, lifecycle, and the assembled
//! `RunJob` pipeline (§4.3, §4.7). Ties together `gate`, `executor`,
//! `recovery`, and `dynamic_sync` under one exclusive lock over its
//! in-memory state, matching §5's concurrency model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::collaborators::{Coordinator, GoalStore, LeaderLock, LeaderLockOutcome, Notifier, NopNotifier};
use crate::config::SchedulerConfig;
use crate::cron::CronSchedule;
use crate::dto::JobDto;
use crate::dynamic_sync;
use crate::error::{RegistrationError, SchedulerError};
use crate::executor::{self, ExecutionOutcome};
use crate::gate::{self, GateDecision};
use crate::job::{Job, JobStatus};
use crate::recovery;
use crate::store::JobStore;
use crate::trigger::{ConcurrencyPolicy, Trigger, CALENDAR_REMINDER_TRIGGER_NAME, HEARTBEAT_TRIGGER_NAME};

/// Interval at which the dynamic source sync re-runs once started (§4.6).
const DYNAMIC_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// RAII guard clearing a trigger's "running" flag on drop, so a panic or
/// early return inside a run still releases the skip-if-running lock.
struct ExecutionGuard(Arc<AtomicBool>);

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct SchedulerState {
    entry_handles: HashMap<String, JoinHandle<()>>,
    jobs: HashMap<String, Job>,
    in_flight: HashMap<String, u32>,
    recovery_timers: HashMap<String, JoinHandle<()>>,
    running_flags: HashMap<String, Arc<AtomicBool>>,
}

struct Inner {
    config: SchedulerConfig,
    store: Option<Arc<dyn JobStore>>,
    coordinator: Arc<dyn Coordinator>,
    notifier: Arc<dyn Notifier>,
    leader_lock: Option<Arc<dyn LeaderLock>>,
    goal_store: Option<Arc<dyn GoalStore>>,
    state: Mutex<SchedulerState>,
    cancel: watch::Sender<bool>,
    draining: AtomicBool,
    stopped: AtomicBool,
    dynamic_sync_handle: Mutex<Option<JoinHandle<()>>>,
}

/// A proactive cron-driven task scheduler (§1-§2).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        store: Option<Arc<dyn JobStore>>,
        coordinator: Arc<dyn Coordinator>,
        leader_lock: Option<Arc<dyn LeaderLock>>,
        goal_store: Option<Arc<dyn GoalStore>>,
    ) -> Self {
        Self::with_notifier(config, store, coordinator, Arc::new(NopNotifier), leader_lock, goal_store)
    }

    #[must_use]
    pub fn with_notifier(
        config: SchedulerConfig,
        store: Option<Arc<dyn JobStore>>,
        coordinator: Arc<dyn Coordinator>,
        notifier: Arc<dyn Notifier>,
        leader_lock: Option<Arc<dyn LeaderLock>>,
        goal_store: Option<Arc<dyn GoalStore>>,
    ) -> Self {
        let (cancel, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                coordinator,
                notifier,
                leader_lock,
                goal_store,
                state: Mutex::new(SchedulerState::default()),
                cancel,
                draining: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                dynamic_sync_handle: Mutex::new(None),
            }),
        }
    }

    // ---- Lifecycle (§4.7) -------------------------------------------

    /// `Start`. A no-op if `config.enabled` is false. Otherwise acquires
    /// the leader lock (if any), loads persisted jobs, registers static
    /// and synthetic triggers, runs one dynamic sync pass, and installs
    /// the periodic dynamic-sync loop.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if !self.inner.config.enabled {
            return Ok(());
        }

        if let Some(lock) = &self.inner.leader_lock {
            match lock.acquire().await? {
                LeaderLockOutcome::Standby => {
                    tracing::info!("leader lock not acquired, entering standby");
                    return Ok(());
                }
                LeaderLockOutcome::Acquired => {
                    tracing::info!("leader lock acquired");
                }
            }
        }

        if let Some(store) = &self.inner.store {
            let jobs = store.list().await?;
            let mut state = self.inner.state.lock().await;
            for job in jobs {
                state.jobs.insert(job.id.clone(), job);
            }
        }

        for static_trigger in self.inner.config.static_triggers.clone() {
            let mut trigger = Trigger::new(static_trigger.name.clone(), static_trigger.schedule.clone(), static_trigger.task.clone());
            trigger.channel = static_trigger.channel.clone();
            trigger.user_id = static_trigger.user_id.clone();
            trigger.chat_id = static_trigger.chat_id.clone();
            if let Err(err) = self.register_trigger(trigger).await {
                tracing::warn!(name = %static_trigger.name, error = %err, "failed to register static trigger");
            }
        }

        if self.inner.config.heartbeat.enabled {
            let hb = &self.inner.config.heartbeat;
            let mut trigger = Trigger::new(HEARTBEAT_TRIGGER_NAME, hb.schedule.clone(), hb.task.clone());
            trigger.channel = hb.channel.clone();
            trigger.user_id = hb.user_id.clone();
            trigger.chat_id = hb.chat_id.clone();
            if let Err(err) = self.register_trigger(trigger).await {
                tracing::warn!(error = %err, "failed to register heartbeat trigger");
            }
        }

        if self.inner.config.calendar_reminder.enabled {
            let cr = &self.inner.config.calendar_reminder;
            let task = format!("check the calendar for events in the next {} minutes and remind", cr.look_ahead_minutes);
            let mut trigger = Trigger::new(CALENDAR_REMINDER_TRIGGER_NAME, cr.schedule.clone(), task)
                .with_look_ahead_minutes(cr.look_ahead_minutes);
            trigger.channel = cr.channel.clone();
            trigger.user_id = cr.user_id.clone();
            trigger.chat_id = cr.chat_id.clone();
            if let Err(err) = self.register_trigger(trigger).await {
                tracing::warn!(error = %err, "failed to register calendar reminder trigger");
            }
        }

        if self.inner.config.okr_goals_root.is_some() {
            self.dynamic_sync_once().await;
            let scheduler = self.clone();
            let mut cancel_rx = self.inner.cancel.subscribe();
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(DYNAMIC_SYNC_INTERVAL);
                ticker.tick().await; // consume the immediate first tick; Start already ran one pass
                loop {
                    tokio::select! {
                        _ = ticker.tick() => scheduler.dynamic_sync_once().await,
                        _ = cancel_rx.changed() => break,
                    }
                }
            });
            *self.inner.dynamic_sync_handle.lock().await = Some(handle);
        }

        Ok(())
    }

    /// `Stop`. Idempotent: cancels all recovery timers, aborts all cron
    /// entries and the dynamic-sync loop, releases the leader lock.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.cancel.send(true);

        let mut state = self.inner.state.lock().await;
        for (_, handle) in state.recovery_timers.drain() {
            handle.abort();
        }
        for (_, handle) in state.entry_handles.drain() {
            handle.abort();
        }
        drop(state);

        if let Some(handle) = self.inner.dynamic_sync_handle.lock().await.take() {
            handle.abort();
        }

        if let Some(lock) = &self.inner.leader_lock {
            lock.release().await;
        }
    }

    /// `Drain`. Like `Stop` but blocks new runs immediately and waits for
    /// in-flight ones to finish, up to `deadline`.
    pub async fn drain(&self, deadline: Duration) -> Result<(), SchedulerError> {
        self.inner.draining.store(true, Ordering::SeqCst);
        let waited = tokio::time::timeout(deadline, self.wait_for_quiescence()).await;
        self.stop().await;
        waited.map_err(|_| SchedulerError::DrainDeadlineExceeded)
    }

    async fn wait_for_quiescence(&self) {
        loop {
            let total: u32 = self.inner.state.lock().await.in_flight.values().sum();
            if total == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // ---- Registration (§4.3) -----------------------------------------

    /// `RegisterTrigger`. Idempotent: re-registering an already-present
    /// trigger replaces its cron entry.
    pub async fn register_trigger(&self, trigger: Trigger) -> Result<(), RegistrationError> {
        if trigger.name.trim().is_empty() {
            return Err(RegistrationError::InvalidName);
        }
        if trigger.schedule.trim().is_empty() {
            return Err(RegistrationError::InvalidSchedule);
        }

        let existing = {
            let state = self.inner.state.lock().await;
            state.jobs.get(&trigger.name).cloned()
        };

        let job = match existing {
            Some(job) => job,
            None => match &self.inner.store {
                // §4.3 step 2: on subsequent registration (cold in-memory
                // state, e.g. after a restart) load and reuse the
                // persisted Job rather than clobbering its status.
                Some(store) => match store.load(&trigger.name).await {
                    Ok(job) => job,
                    Err(crate::error::JobStoreError::NotFound { .. }) => {
                        let job = Job::new(trigger.name.clone(), trigger.name.clone(), trigger.schedule.clone(), trigger.task.clone())
                            .with_payload(trigger_payload(&trigger));
                        store.save(job).await?
                    }
                    Err(err) => return Err(err.into()),
                },
                None => Job::new(trigger.name.clone(), trigger.name.clone(), trigger.schedule.clone(), trigger.task.clone())
                    .with_payload(trigger_payload(&trigger)),
            },
        };

        {
            let mut state = self.inner.state.lock().await;
            state.jobs.insert(trigger.name.clone(), job.clone());
        }

        if matches!(job.status, JobStatus::Paused | JobStatus::Completed) {
            return Ok(());
        }

        let schedule = CronSchedule::parse(&trigger.schedule)?;
        self.install_cron_entry(trigger.name.clone(), schedule, self.inner.config.concurrency_policy).await;
        Ok(())
    }

    /// Convenience wrapper for the programmatic surface's
    /// `RegisterDynamicTrigger` (§6.5).
    pub async fn register_dynamic_trigger(
        &self,
        name: impl Into<String>,
        schedule: impl Into<String>,
        task: impl Into<String>,
        channel: Option<String>,
    ) -> Result<JobDto, SchedulerError> {
        let mut trigger = Trigger::new(name, schedule, task);
        trigger.channel = channel;
        self.register_trigger(trigger.clone()).await?;
        let state = self.inner.state.lock().await;
        let job = state.jobs.get(&trigger.name).cloned().ok_or(SchedulerError::NoStoreConfigured)?;
        Ok(job.into())
    }

    /// `UnregisterTrigger`: removes the cron entry, drops the in-memory
    /// job, cancels any pending recovery timer, deletes the persisted job.
    /// `NotFound` from the store is swallowed.
    pub async fn unregister_trigger(&self, name: &str) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.lock().await;
        if let Some(handle) = state.entry_handles.remove(name) {
            handle.abort();
        }
        if let Some(handle) = state.recovery_timers.remove(name) {
            handle.abort();
        }
        state.jobs.remove(name);
        state.in_flight.remove(name);
        state.running_flags.remove(name);
        drop(state);

        if let Some(store) = &self.inner.store {
            match store.delete(name).await {
                Ok(()) => {}
                Err(crate::error::JobStoreError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn install_cron_entry(&self, name: String, schedule: CronSchedule, policy: ConcurrencyPolicy) {
        let running = Arc::new(AtomicBool::new(false));
        let mut state = self.inner.state.lock().await;
        if let Some(old) = state.entry_handles.remove(&name) {
            old.abort();
        }
        state.running_flags.insert(name.clone(), running.clone());

        let scheduler = self.clone();
        let mut cancel_rx = self.inner.cancel.subscribe();
        let entry_name = name.clone();
        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = schedule.next_after(now) else { break };
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(0));

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel_rx.changed() => break,
                }
                if *cancel_rx.borrow() {
                    break;
                }
                if scheduler.inner.draining.load(Ordering::SeqCst) {
                    continue;
                }

                match policy {
                    ConcurrencyPolicy::Skip => {
                        if running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                            let scheduler = scheduler.clone();
                            let running = running.clone();
                            let name = entry_name.clone();
                            tokio::spawn(async move {
                                let _guard = ExecutionGuard(running);
                                scheduler.run_job_inner(&name, false).await;
                            });
                        } else {
                            tracing::debug!(trigger = %entry_name, "tick skipped, previous run still in flight");
                        }
                    }
                    ConcurrencyPolicy::Delay => {
                        while running.load(Ordering::Acquire) {
                            tokio::time::sleep(Duration::from_millis(25)).await;
                        }
                        running.store(true, Ordering::Release);
                        let _guard = ExecutionGuard(running.clone());
                        scheduler.run_job_inner(&entry_name, false).await;
                    }
                }
            }
        });

        state.entry_handles.insert(name, handle);
    }

    // ---- Run gate and executor (§4.4) --------------------------------

    /// `RunJob`. Returns whether execution was admitted.
    pub async fn run_job(&self, name: &str) -> bool {
        self.run_job_inner(name, false).await
    }

    async fn run_job_inner(&self, name: &str, bypass_cooldown: bool) -> bool {
        if self.inner.draining.load(Ordering::SeqCst) {
            return false;
        }

        let now = Utc::now();
        let decision = {
            let mut state = self.inner.state.lock().await;
            let SchedulerState { jobs, in_flight, .. } = &mut *state;
            match gate::admit(
                jobs,
                in_flight,
                self.inner.store.as_deref(),
                name,
                self.inner.config.cooldown,
                self.inner.config.max_concurrent,
                bypass_cooldown,
                now,
            )
            .await
            {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::warn!(trigger = name, error = %err, "failed to persist admission, aborting run");
                    return false;
                }
            }
        };

        let GateDecision::Admitted(job) = decision else {
            return false;
        };

        let cancel_rx = self.inner.cancel.subscribe();
        let outcome = executor::execute_run(
            self.inner.coordinator.as_ref(),
            self.inner.notifier.as_ref(),
            &job,
            name,
            self.inner.config.trigger_timeout,
            cancel_rx,
        )
        .await;

        self.finish_run(name, job, outcome).await;
        true
    }

    async fn finish_run(&self, name: &str, job: Job, outcome: ExecutionOutcome) {
        let now = Utc::now();
        let mut updated = job;

        let should_schedule_recovery = match &outcome {
            ExecutionOutcome::Success { .. } => {
                updated.record_success(now);
                false
            }
            ExecutionOutcome::Cancelled => false,
            ExecutionOutcome::Invalid { error } => {
                updated.record_invalid(now, error.to_string());
                false
            }
            ExecutionOutcome::Failure { error } => {
                updated.record_failure(now, error.to_string());
                true
            }
        };

        let paused = should_schedule_recovery && updated.exhausted(self.inner.config.recovery_max_retries);
        if paused {
            updated.status = JobStatus::Paused;
        }

        if let Some(store) = &self.inner.store {
            match store.save(updated.clone()).await {
                Ok(saved) => updated = saved,
                Err(err) => tracing::warn!(trigger = name, error = %err, "failed to persist run outcome"),
            }
        }

        let mut state = self.inner.state.lock().await;
        if let Some(count) = state.in_flight.get_mut(name) {
            *count = count.saturating_sub(1);
        }
        state.jobs.insert(name.to_string(), updated.clone());

        if matches!(outcome, ExecutionOutcome::Success { .. }) {
            if let Some(handle) = state.recovery_timers.remove(name) {
                handle.abort();
            }
        }

        if should_schedule_recovery && !paused {
            let delay = recovery::backoff_duration(self.inner.config.recovery_backoff, updated.failure_count);
            let scheduler = self.clone();
            let retry_name = name.to_string();
            let handle = recovery::spawn_retry_timer(delay, move || async move {
                scheduler.run_job_inner(&retry_name, true).await;
            });
            if let Some(old) = state.recovery_timers.insert(name.to_string(), handle) {
                old.abort();
            }
        }
    }

    async fn dynamic_sync_once(&self) {
        let Some(goal_store) = &self.inner.goal_store else { return };

        let current_dynamic_names: Vec<String> = {
            let state = self.inner.state.lock().await;
            state.entry_handles.keys().filter(|n| n.starts_with(crate::trigger::DYNAMIC_TRIGGER_PREFIX)).cloned().collect()
        };

        let plan = match dynamic_sync::plan_sync(goal_store.as_ref(), &current_dynamic_names).await {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(error = %err, "dynamic source sync failed");
                return;
            }
        };

        for trigger in plan.to_register {
            if let Err(err) = self.register_trigger(trigger.clone()).await {
                tracing::warn!(name = %trigger.name, error = %err, "failed to register dynamic trigger");
            }
        }
        for name in plan.to_prune {
            if let Err(err) = self.unregister_trigger(&name).await {
                tracing::warn!(name = %name, error = %err, "failed to prune dynamic trigger");
            }
        }
    }

    // ---- Programmatic surface (§6.5) ---------------------------------

    pub async fn list_jobs(&self) -> Result<Vec<JobDto>, SchedulerError> {
        let store = self.inner.store.as_ref().ok_or(SchedulerError::NoStoreConfigured)?;
        Ok(store.list().await?.into_iter().map(JobDto::from).collect())
    }

    pub async fn load_job(&self, id: &str) -> Result<JobDto, SchedulerError> {
        let store = self.inner.store.as_ref().ok_or(SchedulerError::NoStoreConfigured)?;
        Ok(store.load(id).await.map(JobDto::from)?)
    }

    pub async fn trigger_count(&self) -> usize {
        self.inner.state.lock().await.entry_handles.len()
    }

    pub async fn trigger_names(&self) -> Vec<String> {
        self.inner.state.lock().await.entry_handles.keys().cloned().collect()
    }
}

fn trigger_payload(trigger: &Trigger) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(channel) = &trigger.channel {
        map.insert("channel".to_string(), serde_json::Value::String(channel.clone()));
    }
    if let Some(user_id) = &trigger.user_id {
        map.insert("user_id".to_string(), serde_json::Value::String(user_id.clone()));
    }
    if let Some(chat_id) = &trigger.chat_id {
        map.insert("chat_id".to_string(), serde_json::Value::String(chat_id.clone()));
    }
    if let Some(goal_id) = &trigger.goal_id {
        map.insert("goal_id".to_string(), serde_json::Value::String(goal_id.clone()));
    }
    if let Some(minutes) = trigger.look_ahead_minutes {
        map.insert("look_ahead_minutes".to_string(), serde_json::Value::Number(minutes.into()));
    }
    serde_json::Value::Object(map)
}
