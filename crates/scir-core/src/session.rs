//! Cached scheduler sessions.
//!
//! A [`Session`] wraps one backend and keeps the last bulk status listing,
//! refreshing it only when it is older than the configured delay.

use crate::backend::{JobAction, SchedulerBackend, StateSnapshot};
use crate::error::SchedulerError;
use crate::load::QueueLoad;
use crate::state::JobState;
use crate::template::JobTemplate;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Submits jobs to a backend and answers state queries from a TTL cache.
#[derive(Debug)]
pub struct Session<B> {
    backend: B,
    refresh_delay: Duration,
    cache: Option<StateSnapshot>,
    last_refresh: Option<DateTime<Utc>>,
}

impl<B: SchedulerBackend> Session<B> {
    pub fn new(backend: B, refresh_delay: Duration) -> Self {
        Self {
            backend,
            refresh_delay,
            cache: None,
            last_refresh: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }

    /// Jobs seen by the last successful refresh.
    pub fn cached_jobs(&self) -> Option<&StateSnapshot> {
        self.cache.as_ref()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    /// Drop the cached listing so the next query refreshes it.
    pub fn reset_cache(&mut self) {
        self.cache = None;
        self.last_refresh = None;
    }

    /// Submit a job and return its ID.
    pub async fn run(&mut self, template: &JobTemplate) -> Result<String, SchedulerError> {
        self.reset_cache();
        let job_id = self.backend.submit(template).await?;
        tracing::info!(backend = self.backend.name(), job_id = %job_id, "job submitted");
        Ok(job_id)
    }

    /// State of `job_id`, refreshing the whole listing when it is stale.
    ///
    /// `updated_at` is the last time the caller changed the job; a recent
    /// value forces a refresh even inside the delay window. IDs missing
    /// from the listing are [`JobState::Undetermined`].
    pub async fn job_ps(
        &mut self,
        job_id: &str,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<JobState, SchedulerError> {
        self.ensure_fresh(updated_at).await?;
        Ok(self
            .cache
            .as_ref()
            .and_then(|c| c.jobs.get(job_id).copied())
            .unwrap_or(JobState::Undetermined))
    }

    pub async fn hold(&mut self, job_id: &str) -> Result<(), SchedulerError> {
        self.backend.control(JobAction::Hold, job_id).await
    }

    pub async fn release(&mut self, job_id: &str) -> Result<(), SchedulerError> {
        self.backend.control(JobAction::Release, job_id).await
    }

    pub async fn suspend(&mut self, job_id: &str) -> Result<(), SchedulerError> {
        self.backend.control(JobAction::Suspend, job_id).await
    }

    pub async fn resume(&mut self, job_id: &str) -> Result<(), SchedulerError> {
        self.backend.control(JobAction::Resume, job_id).await
    }

    pub async fn terminate(&mut self, job_id: &str) -> Result<(), SchedulerError> {
        self.backend.control(JobAction::Terminate, job_id).await
    }

    /// Dispatch a [`JobAction`] to the matching method.
    pub async fn control(&mut self, action: JobAction, job_id: &str) -> Result<(), SchedulerError> {
        self.backend.control(action, job_id).await
    }

    /// Cluster load, as far as the backend can tell. Never fails.
    pub async fn queue_tasks_tot_max(&mut self) -> QueueLoad {
        if self.backend.load_from_status() {
            if let Err(e) = self.ensure_fresh(None).await {
                tracing::warn!("Cannot refresh {} status for load: {}", self.backend.name(), e);
                return QueueLoad::Failed;
            }
        }
        self.backend.queue_load(self.cache.as_ref()).await
    }

    fn is_stale(&self, now: DateTime<Utc>, updated_at: Option<DateTime<Utc>>) -> bool {
        let (Some(_), Some(last)) = (&self.cache, self.last_refresh) else {
            return true;
        };
        let delay = TimeDelta::from_std(self.refresh_delay).unwrap_or(TimeDelta::MAX);
        let window_start = now.checked_sub_signed(delay).unwrap_or(DateTime::<Utc>::MIN_UTC);
        last <= window_start || updated_at.is_some_and(|t| t > window_start)
    }

    async fn ensure_fresh(&mut self, updated_at: Option<DateTime<Utc>>) -> Result<(), SchedulerError> {
        let now = Utc::now();
        if !self.is_stale(now, updated_at) {
            return Ok(());
        }
        let snapshot = self.backend.refresh_states().await?;
        tracing::debug!(
            backend = self.backend.name(),
            jobs = snapshot.jobs.len(),
            "refreshed job states"
        );
        self.cache = Some(snapshot);
        self.last_refresh = Some(now);
        Ok(())
    }
}
