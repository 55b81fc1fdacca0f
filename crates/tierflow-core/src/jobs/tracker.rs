//! Job status tracking with backoff polling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::{CancellationToken, CancelledError};
use crate::config::JobsConfig;
use crate::error::{Result, TierflowError};
use crate::gateway::StorageGateway;
use crate::models::{JobState, JobStatus};
use crate::network::RetryConfig;

#[derive(Debug, Clone)]
struct TrackedJob {
    status: JobStatus,
    polls: u64,
    seq: u64,
}

/// Job counts per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobSummary {
    pub fn active(&self) -> usize {
        self.pending + self.running
    }
}

struct TrackerInner {
    gateway: Arc<dyn StorageGateway>,
    config: JobsConfig,
    jobs: RwLock<HashMap<String, TrackedJob>>,
    next_seq: AtomicU64,
    cancel: CancellationToken,
}

/// Observes data-movement jobs by id.
///
/// Cloning is cheap; all clones share the same job table. Once a job
/// reaches a terminal state its cached status is final and the fabric is
/// not asked about it again.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<TrackerInner>,
}

impl JobTracker {
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &JobsConfig, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                gateway,
                config: config.clone(),
                jobs: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                cancel,
            }),
        }
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, TrackedJob>> {
        self.inner.jobs.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, TrackedJob>> {
        self.inner.jobs.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Start tracking `job_id`. Returns false if it was already tracked.
    ///
    /// With background polling enabled and a runtime available, a task
    /// polls the job until it is terminal.
    pub fn track(&self, job_id: impl Into<String>) -> bool {
        let job_id = job_id.into();
        {
            let mut jobs = self.write_jobs();
            if jobs.contains_key(&job_id) {
                return false;
            }
            let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
            jobs.insert(
                job_id.clone(),
                TrackedJob {
                    status: JobStatus::pending(job_id.clone()),
                    polls: 0,
                    seq,
                },
            );
        }
        debug!(job_id = %job_id, "Tracking job");

        if self.inner.config.background_polling {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let tracker = self.clone();
                handle.spawn(async move { tracker.poll_until_terminal(job_id).await });
            }
        }
        true
    }

    pub fn is_tracked(&self, job_id: &str) -> bool {
        self.read_jobs().contains_key(job_id)
    }

    /// Last known status without contacting the fabric.
    pub fn cached(&self, job_id: &str) -> Option<JobStatus> {
        self.read_jobs().get(job_id).map(|j| j.status.clone())
    }

    /// Number of fabric polls made for `job_id`.
    pub fn poll_count(&self, job_id: &str) -> u64 {
        self.read_jobs().get(job_id).map_or(0, |j| j.polls)
    }

    /// Current status. Terminal statuses come from the cache; otherwise the
    /// fabric is polled once.
    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        match self.cached(job_id) {
            None => Err(TierflowError::not_found(format!("tracked job {}", job_id))),
            Some(status) if status.is_terminal() => Ok(status),
            Some(_) => self.poll_once(job_id).await,
        }
    }

    async fn poll_once(&self, job_id: &str) -> Result<JobStatus> {
        let polled = self.inner.gateway.get_job_status(job_id).await?;
        Ok(self.record(job_id, polled))
    }

    /// Store a polled status unless the job is already terminal.
    fn record(&self, job_id: &str, mut polled: JobStatus) -> JobStatus {
        let mut jobs = self.write_jobs();
        let Some(job) = jobs.get_mut(job_id) else {
            return polled;
        };
        job.polls += 1;
        if job.status.is_terminal() {
            return job.status.clone();
        }
        polled.job_id = job_id.to_string();
        job.status = polled.clone();
        if polled.is_terminal() {
            info!(job_id, state = %polled.state, "Job reached terminal state");
            self.evict_finished(&mut jobs);
        }
        polled
    }

    /// Drop the oldest terminal jobs beyond `max_finished_jobs`.
    /// Unfinished jobs are never evicted.
    fn evict_finished(&self, jobs: &mut HashMap<String, TrackedJob>) {
        let cap = self.inner.config.max_finished_jobs;
        let mut finished: Vec<(u64, String)> = jobs
            .iter()
            .filter(|(_, j)| j.status.is_terminal())
            .map(|(id, j)| (j.seq, id.clone()))
            .collect();
        if finished.len() <= cap {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - cap;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
        debug!(evicted = excess, "Forgot finished jobs");
    }

    /// Poll until the job is terminal or `timeout` elapses.
    ///
    /// On timeout the job stays tracked and can be waited on again.
    /// Transient fabric errors are retried within the deadline.
    pub async fn wait_until_terminal(&self, job_id: &str, timeout: Duration) -> Result<JobStatus> {
        let deadline = Instant::now() + timeout;
        let schedule = RetryConfig::for_job_polling(&self.inner.config);
        let mut attempt = 0u32;

        loop {
            self.inner.cancel.check()?;
            match self.status(job_id).await {
                Ok(status) if status.is_terminal() => return Ok(status),
                Ok(status) => debug!(job_id, state = %status.state, progress = status.progress, "Job still running"),
                Err(e) if e.is_retryable() => warn!(job_id, error = %e, "Job poll failed; retrying"),
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TierflowError::Timeout {
                    job_id: job_id.to_string(),
                    waited: timeout,
                });
            }
            let delay = schedule.calculate_delay(attempt).min(deadline - now);
            attempt = attempt.saturating_add(1);

            tokio::select! {
                _ = self.inner.cancel.cancelled() => return Err(CancelledError.into()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn poll_until_terminal(self, job_id: String) {
        let schedule = RetryConfig::for_job_polling(&self.inner.config);
        let mut attempt = 0u32;

        loop {
            let delay = schedule.calculate_delay(attempt);
            tokio::select! {
                _ = self.inner.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt = attempt.saturating_add(1);

            match self.status(&job_id).await {
                Ok(status) if status.is_terminal() => return,
                Ok(_) => {}
                Err(e) if e.is_retryable() => debug!(job_id = %job_id, error = %e, "Background poll failed"),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Stopping background polling");
                    return;
                }
            }
        }
    }

    /// Cached statuses in registration order, optionally of one state.
    pub fn list_all(&self, filter: Option<JobState>) -> Vec<JobStatus> {
        let jobs = self.read_jobs();
        let mut tracked: Vec<&TrackedJob> = jobs
            .values()
            .filter(|j| filter.map_or(true, |state| j.status.state == state))
            .collect();
        tracked.sort_by_key(|j| j.seq);
        tracked.into_iter().map(|j| j.status.clone()).collect()
    }

    /// Poll every non-terminal job once. Returns how many polls succeeded.
    pub async fn refresh(&self) -> usize {
        let pending: Vec<String> = self
            .list_all(None)
            .into_iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.job_id)
            .collect();

        let results = futures::future::join_all(pending.iter().map(|id| self.status(id))).await;
        let mut refreshed = 0;
        for (id, result) in pending.iter().zip(results) {
            match result {
                Ok(_) => refreshed += 1,
                Err(e) => warn!(job_id = %id, error = %e, "Failed to refresh job"),
            }
        }
        refreshed
    }

    pub fn summary(&self) -> JobSummary {
        let jobs = self.read_jobs();
        let mut summary = JobSummary {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs.values() {
            match job.status.state {
                JobState::Pending => summary.pending += 1,
                JobState::Running => summary.running += 1,
                JobState::Completed => summary.completed += 1,
                JobState::Failed => summary.failed += 1,
                JobState::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayOp, InMemoryGateway};
    use crate::models::{ObjectiveRequest, ObjectiveType};

    fn config(background: bool) -> JobsConfig {
        JobsConfig {
            initial_poll_ms: 5,
            max_poll_ms: 20,
            background_polling: background,
            ..Default::default()
        }
    }

    async fn submit(gateway: &InMemoryGateway, path: &str) -> String {
        gateway
            .create_objective(&ObjectiveRequest::new(
                ObjectiveType::PlaceOnTier,
                path,
                Some("tier0".into()),
            ))
            .await
            .unwrap()
            .job_uuid
            .unwrap()
    }

    fn tracker(gateway: &Arc<InMemoryGateway>, background: bool) -> JobTracker {
        JobTracker::new(gateway.clone(), &config(background), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_completed_on_first_poll_is_not_polled_again() {
        let gateway = Arc::new(InMemoryGateway::new());
        let tracker = tracker(&gateway, false);
        let job = submit(&gateway, "/hub/a").await;
        assert!(tracker.track(&job));
        assert!(!tracker.track(&job));

        let status = tracker
            .wait_until_terminal(&job, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(gateway.job_polls(&job), 1);

        tracker.status(&job).await.unwrap();
        tracker.wait_until_terminal(&job, Duration::from_secs(1)).await.unwrap();
        assert_eq!(gateway.job_polls(&job), 1);
    }

    #[tokio::test]
    async fn test_wait_follows_running_to_failed() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.script_jobs(2, JobState::Failed);
        let tracker = tracker(&gateway, false);
        let job = submit(&gateway, "/hub/a").await;
        tracker.track(&job);

        let status = tracker
            .wait_until_terminal(&job, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert!(status.error_message.is_some());
        assert_eq!(tracker.poll_count(&job), 3);
    }

    #[tokio::test]
    async fn test_wait_times_out_and_keeps_tracking() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.script_jobs(10_000, JobState::Completed);
        let tracker = tracker(&gateway, false);
        let job = submit(&gateway, "/hub/a").await;
        tracker.track(&job);

        let err = tracker
            .wait_until_terminal(&job, Duration::from_millis(60))
            .await
            .unwrap_err();
        assert!(matches!(err, TierflowError::Timeout { .. }));
        assert!(tracker.is_tracked(&job));
        assert_eq!(tracker.cached(&job).unwrap().state, JobState::Running);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_during_wait() {
        let gateway = Arc::new(InMemoryGateway::new());
        let tracker = tracker(&gateway, false);
        let job = submit(&gateway, "/hub/a").await;
        tracker.track(&job);
        gateway.fail_next(
            GatewayOp::GetJobStatus,
            TierflowError::Api {
                message: "busy".into(),
                status: Some(503),
            },
        );

        let status = tracker
            .wait_until_terminal(&job, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_untracked_job_is_not_found() {
        let gateway = Arc::new(InMemoryGateway::new());
        let tracker = tracker(&gateway, false);
        let err = tracker.status("nope").await.unwrap_err();
        assert!(matches!(err, TierflowError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_terminal_status_never_regresses() {
        let gateway = Arc::new(InMemoryGateway::new());
        let tracker = tracker(&gateway, false);
        tracker.track("j-1");

        let mut done = JobStatus::pending("j-1");
        done.state = JobState::Completed;
        tracker.record("j-1", done);
        let mut running = JobStatus::pending("j-1");
        running.state = JobState::Running;
        let kept = tracker.record("j-1", running);

        assert_eq!(kept.state, JobState::Completed);
        assert_eq!(tracker.cached("j-1").unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_oldest_finished_jobs_are_evicted() {
        let gateway = Arc::new(InMemoryGateway::new());
        let jobs = JobsConfig {
            max_finished_jobs: 2,
            ..config(false)
        };
        let tracker = JobTracker::new(gateway.clone(), &jobs, CancellationToken::new());
        for id in ["j-1", "j-2", "j-3", "j-4"] {
            tracker.track(id);
        }
        for id in ["j-1", "j-2", "j-3"] {
            let mut done = JobStatus::pending(id);
            done.state = JobState::Completed;
            tracker.record(id, done);
        }

        assert!(!tracker.is_tracked("j-1"));
        assert!(tracker.is_tracked("j-2"));
        assert!(tracker.is_tracked("j-3"));
        assert_eq!(tracker.cached("j-4").unwrap().state, JobState::Pending);
        assert_eq!(tracker.summary().total, 3);

        let err = tracker.status("j-1").await.unwrap_err();
        assert!(matches!(err, TierflowError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_tracker_stops_waiting() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.script_jobs(10_000, JobState::Completed);
        let cancel = CancellationToken::new();
        let tracker = JobTracker::new(gateway.clone(), &config(false), cancel.clone());
        let job = submit(&gateway, "/hub/a").await;
        tracker.track(&job);
        cancel.cancel();

        let err = tracker
            .wait_until_terminal(&job, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TierflowError::Cancelled));
        assert_eq!(gateway.job_polls(&job), 0);
    }

    #[tokio::test]
    async fn test_background_polling_resolves_jobs() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.script_jobs(1, JobState::Completed);
        let tracker = tracker(&gateway, true);
        let job = submit(&gateway, "/hub/a").await;
        tracker.track(&job);

        let deadline = Instant::now() + Duration::from_secs(5);
        while tracker.cached(&job).unwrap().state != JobState::Completed {
            assert!(Instant::now() < deadline, "background poller never finished");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let polls = gateway.job_polls(&job);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gateway.job_polls(&job), polls);
    }

    #[tokio::test]
    async fn test_list_refresh_and_summary() {
        let gateway = Arc::new(InMemoryGateway::new());
        let tracker = tracker(&gateway, false);
        let first = submit(&gateway, "/hub/a").await;
        let second = submit(&gateway, "/hub/b").await;
        tracker.track(&first);
        tracker.track(&second);

        assert_eq!(tracker.list_all(Some(JobState::Pending)).len(), 2);
        assert_eq!(tracker.refresh().await, 2);
        let all = tracker.list_all(None);
        assert_eq!(all[0].job_id, first);
        assert_eq!(all[1].job_id, second);

        let summary = tracker.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.active(), 0);
    }
}
