//! Task Scheduler: fires sweeps on a daily clock or when enough unrated
//! applications pile up.
//!
//! Two kinds of trigger:
//! - a per-job daily task for `scheduled` policies (UTC wall clock),
//! - one global poll for open `batch` jobs, comparing the unrated count with
//!   the job's threshold.
//!
//! The registry of daily triggers lives behind a single async mutex and is
//! only changed through `reconcile` / `remove`. Cancelling a trigger stops it
//! from firing again; a sweep it already started runs to completion.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ledger;
use crate::models::job::{AnalysisPolicy, PolicyKind, ScheduleTime, DEFAULT_BATCH_THRESHOLD};

/// What caused a scheduler-originated sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOrigin {
    Daily,
    Threshold,
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerOrigin::Daily => write!(f, "daily"),
            TriggerOrigin::Threshold => write!(f, "threshold"),
        }
    }
}

/// Runs a job's sweep on behalf of the scheduler. Implementations re-check
/// that the job is still open.
#[async_trait]
pub trait SweepRunner: Send + Sync {
    async fn run_sweep(&self, job_id: &str, origin: TriggerOrigin) -> anyhow::Result<()>;
}

struct TriggerHandle {
    time: ScheduleTime,
    cancel: CancellationToken,
}

pub struct Scheduler {
    db: SqlitePool,
    runner: Arc<dyn SweepRunner>,
    poll_interval: Duration,
    triggers: Mutex<HashMap<String, TriggerHandle>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
}

impl Scheduler {
    pub fn new(db: SqlitePool, runner: Arc<dyn SweepRunner>, poll_interval: Duration) -> Self {
        Self {
            db,
            runner,
            poll_interval,
            triggers: Mutex::new(HashMap::new()),
            poller: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Starts the threshold poll. Calling it twice is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            return;
        }

        let scheduler = Arc::clone(self);
        let token = self.shutdown_token.child_token();
        *poller = Some(tokio::spawn(async move { scheduler.poll_loop(token).await }));

        info!(
            "Scheduler started (batch poll every {}s)",
            self.poll_interval.as_secs()
        );
    }

    /// Stops the poll and every daily trigger. Sweeps already running finish.
    pub async fn shutdown(&self) {
        info!("Scheduler shutting down");
        self.shutdown_token.cancel();

        self.triggers.lock().await.clear();

        if let Some(poller) = self.poller.lock().await.take() {
            if let Err(e) = poller.await {
                warn!("Batch poll task ended abnormally: {e}");
            }
        }
        info!("Scheduler stopped");
    }

    async fn poll_loop(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("Batch poll failed: {e}");
                    }
                }
            }
        }
        debug!("Batch poll loop exited");
    }

    /// One pass of the threshold poll. Returns how many jobs were swept.
    pub async fn poll_once(&self) -> Result<usize, sqlx::Error> {
        let jobs = ledger::list_jobs_by_policy(&self.db, PolicyKind::Batch).await?;
        let mut triggered = 0;

        for job in jobs.into_iter().filter(|j| j.job_status == "open") {
            let threshold = job
                .analysis_batch_size
                .unwrap_or(i64::from(DEFAULT_BATCH_THRESHOLD))
                .max(1);

            let unrated = match ledger::count_unrated(&self.db, &job.job_id, true).await {
                Ok(count) => count,
                Err(e) => {
                    error!("Could not count unrated applications for job {}: {e}", job.job_id);
                    continue;
                }
            };

            if unrated < threshold {
                debug!(
                    "Job {}: {unrated}/{threshold} unrated, not triggering",
                    job.job_id
                );
                continue;
            }

            info!(
                "Job {}: {unrated} unrated reached threshold {threshold}, sweeping",
                job.job_id
            );
            triggered += 1;
            if let Err(e) = self
                .runner
                .run_sweep(&job.job_id, TriggerOrigin::Threshold)
                .await
            {
                error!("Threshold sweep for job {} failed: {e:#}", job.job_id);
            }
        }

        Ok(triggered)
    }

    /// Brings a job's daily trigger in line with its policy. Any existing
    /// trigger is dropped first; only an open job with a `scheduled` policy
    /// gets a new one.
    pub async fn reconcile(&self, job_id: &str, policy: &AnalysisPolicy, is_open: bool) {
        let mut triggers = self.triggers.lock().await;

        if let Some(previous) = triggers.remove(job_id) {
            previous.cancel.cancel();
            debug!("Removed daily trigger for job {job_id} at {}", previous.time);
        }

        match policy {
            AnalysisPolicy::Scheduled { time } if is_open => {
                let handle = self.spawn_daily(job_id, *time);
                triggers.insert(job_id.to_string(), handle);
                info!("Job {job_id} scheduled daily at {time} UTC");
            }
            _ => debug!("Job {job_id} has no daily trigger"),
        }
    }

    /// Drops a job's daily trigger if it has one.
    pub async fn remove(&self, job_id: &str) {
        if let Some(previous) = self.triggers.lock().await.remove(job_id) {
            previous.cancel.cancel();
            info!("Removed daily trigger for job {job_id}");
        }
    }

    pub async fn trigger_time(&self, job_id: &str) -> Option<ScheduleTime> {
        self.triggers.lock().await.get(job_id).map(|t| t.time)
    }

    pub async fn active_triggers(&self) -> Vec<(String, ScheduleTime)> {
        let triggers = self.triggers.lock().await;
        let mut active: Vec<_> = triggers
            .iter()
            .map(|(job_id, t)| (job_id.clone(), t.time))
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));
        active
    }

    fn spawn_daily(&self, job_id: &str, time: ScheduleTime) -> TriggerHandle {
        let cancel = self.shutdown_token.child_token();
        let token = cancel.clone();
        let runner = Arc::clone(&self.runner);
        let job_id = job_id.to_string();

        tokio::spawn(async move {
            let mut next = next_occurrence(time, Utc::now());
            loop {
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                debug!("Job {job_id}: next daily sweep in {}s", wait.as_secs());

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                // Not raced against the token: a started sweep always completes.
                if let Err(e) = runner.run_sweep(&job_id, TriggerOrigin::Daily).await {
                    error!("Daily sweep for job {job_id} failed: {e:#}");
                }
                next = next_occurrence(time, next.max(Utc::now()));
            }
            debug!("Daily trigger for job {job_id} stopped");
        });

        TriggerHandle { time, cancel }
    }
}

/// First instant strictly after `after` whose UTC time of day is `at`.
pub fn next_occurrence(at: ScheduleTime, after: DateTime<Utc>) -> DateTime<Utc> {
    let today = after.date_naive().and_time(at.time()).and_utc();
    if today > after {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}
