//! Policy Store: validates and persists each job's analysis policy and keeps
//! the scheduler's triggers in line with it.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::ledger::{self, JobUpsert};
use crate::models::job::{
    AnalysisPolicy, Job, JobRow, JobStatus, PolicyKind, ScheduleTime, DEFAULT_BATCH_THRESHOLD,
};
use crate::scheduler::Scheduler;

pub mod handlers;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid schedule time '{0}': expected HH:MM between 00:00 and 23:59")]
    InvalidSchedule(String),

    #[error("unknown analysis policy '{0}': expected manual, scheduled or batch")]
    UnknownKind(String),

    #[error("invalid job status '{0}': expected open, closed or filled")]
    InvalidStatus(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("ledger error: {0}")]
    Persistence(#[from] sqlx::Error),
}

/// Unvalidated policy as supplied by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyInput {
    pub kind: String,
    #[serde(default)]
    pub time: Option<String>,
    /// Any JSON value; coerced by [`coerce_threshold`].
    #[serde(default)]
    pub threshold: Option<Value>,
}

impl PolicyInput {
    pub fn manual() -> Self {
        Self {
            kind: PolicyKind::Manual.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<AnalysisPolicy, PolicyError> {
        let kind = self
            .kind
            .parse::<PolicyKind>()
            .map_err(|_| PolicyError::UnknownKind(self.kind.clone()))?;

        Ok(match kind {
            PolicyKind::Manual => AnalysisPolicy::Manual,
            PolicyKind::Scheduled => AnalysisPolicy::Scheduled {
                time: parse_schedule_time(self.time.as_deref().unwrap_or_default())?,
            },
            PolicyKind::Batch => AnalysisPolicy::Batch {
                threshold: coerce_threshold(self.threshold.as_ref()),
            },
        })
    }
}

/// Parses `H:MM` or `HH:MM` (24h clock).
pub fn parse_schedule_time(raw: &str) -> Result<ScheduleTime, PolicyError> {
    let invalid = || PolicyError::InvalidSchedule(raw.to_string());
    let trimmed = raw.trim();

    let (hour, minute) = trimmed.split_once(':').ok_or_else(invalid)?;
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(hour) || !digits(minute) || hour.len() > 2 || minute.len() != 2 {
        return Err(invalid());
    }

    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    ScheduleTime::from_hm(hour, minute).ok_or_else(invalid)
}

/// Batch thresholds are always positive: non-numeric or missing input falls
/// back to the default, numbers below 1 become 1.
pub fn coerce_threshold(raw: Option<&Value>) -> u32 {
    let number = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number.filter(|n| n.is_finite()) {
        Some(n) if n < 1.0 => 1,
        Some(n) => n.trunc().min(f64::from(u32::MAX)) as u32,
        None => DEFAULT_BATCH_THRESHOLD,
    }
}

/// Converts a stored row, re-validating its status and policy columns.
pub fn job_from_row(row: JobRow) -> Result<Job, PolicyError> {
    let status = row
        .job_status
        .parse::<JobStatus>()
        .map_err(|_| PolicyError::InvalidStatus(row.job_status.clone()))?;
    let kind = row
        .analysis_policy
        .parse::<PolicyKind>()
        .map_err(|_| PolicyError::UnknownKind(row.analysis_policy.clone()))?;

    let policy = match kind {
        PolicyKind::Manual => AnalysisPolicy::Manual,
        PolicyKind::Scheduled => AnalysisPolicy::Scheduled {
            time: parse_schedule_time(row.analysis_schedule.as_deref().unwrap_or_default())?,
        },
        PolicyKind::Batch => AnalysisPolicy::Batch {
            threshold: row
                .analysis_batch_size
                .map(|n| n.clamp(1, i64::from(u32::MAX)) as u32)
                .unwrap_or(DEFAULT_BATCH_THRESHOLD),
        },
    };

    Ok(Job {
        job_id: row.job_id,
        title: row.title,
        description: row.description_text,
        status,
        policy,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Everything needed to create or re-post a job.
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub job_id: String,
    pub title: String,
    pub description: Option<String>,
    pub structured_jd: Option<Value>,
    pub policy: PolicyInput,
}

pub struct PolicyStore {
    db: SqlitePool,
    scheduler: Arc<Scheduler>,
}

impl PolicyStore {
    pub fn new(db: SqlitePool, scheduler: Arc<Scheduler>) -> Self {
        Self { db, scheduler }
    }

    /// Creates or updates a job. The job is (re)opened.
    pub async fn upsert_job(&self, draft: &JobDraft) -> Result<Job, PolicyError> {
        let policy = draft.policy.validate()?;

        ledger::upsert_job(
            &self.db,
            &JobUpsert {
                job_id: &draft.job_id,
                title: &draft.title,
                description: draft.description.as_deref(),
                structured_jd: draft.structured_jd.as_ref(),
                policy: &policy,
            },
        )
        .await?;
        info!("Job {} saved with {} policy", draft.job_id, policy.kind().as_str());

        self.scheduler.reconcile(&draft.job_id, &policy, true).await;
        self.get_job(&draft.job_id).await
    }

    /// Replaces a job's policy. Nothing is written when validation fails.
    pub async fn set_policy(&self, job_id: &str, input: &PolicyInput) -> Result<Job, PolicyError> {
        let policy = input.validate()?;

        if ledger::update_job_policy(&self.db, job_id, &policy).await? == 0 {
            return Err(PolicyError::JobNotFound(job_id.to_string()));
        }

        let job = self.get_job(job_id).await?;
        self.scheduler
            .reconcile(job_id, &job.policy, job.status.is_open())
            .await;
        info!("Job {job_id} policy set to {}", policy.kind().as_str());
        Ok(job)
    }

    pub async fn get_policy(&self, job_id: &str) -> Result<AnalysisPolicy, PolicyError> {
        Ok(self.get_job(job_id).await?.policy)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, PolicyError> {
        let row = ledger::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| PolicyError::JobNotFound(job_id.to_string()))?;
        job_from_row(row)
    }

    /// Jobs with the given policy kind. Rows that fail validation are logged
    /// and left out.
    pub async fn list_by_policy_kind(&self, kind: PolicyKind) -> Result<Vec<Job>, PolicyError> {
        let rows = ledger::list_jobs_by_policy(&self.db, kind).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let job_id = row.job_id.clone();
                job_from_row(row)
                    .map_err(|e| warn!("Ignoring job {job_id} with invalid stored policy: {e}"))
                    .ok()
            })
            .collect())
    }

    /// Moves a job between open/closed/filled. Leaving `open` suspends its
    /// daily trigger; returning to `open` restores it.
    pub async fn set_job_status(&self, job_id: &str, raw_status: &str) -> Result<Job, PolicyError> {
        let status = raw_status
            .parse::<JobStatus>()
            .map_err(|_| PolicyError::InvalidStatus(raw_status.to_string()))?;

        if ledger::update_job_status(&self.db, job_id, status).await? == 0 {
            return Err(PolicyError::JobNotFound(job_id.to_string()));
        }

        match self.get_job(job_id).await {
            Ok(job) => {
                self.scheduler
                    .reconcile(job_id, &job.policy, job.status.is_open())
                    .await;
                info!("Job {job_id} is now {}", status.as_str());
                Ok(job)
            }
            Err(e) => {
                self.scheduler.remove(job_id).await;
                Err(e)
            }
        }
    }

    /// Currently installed daily triggers, by job id.
    pub async fn daily_triggers(&self) -> Vec<(String, ScheduleTime)> {
        self.scheduler.active_triggers().await
    }

    /// Rebuilds daily triggers from storage. Returns how many were installed.
    pub async fn restore_triggers(&self) -> Result<usize, PolicyError> {
        let rows = ledger::list_jobs_by_policy(&self.db, PolicyKind::Scheduled).await?;
        let mut installed = 0;

        for row in rows {
            let job_id = row.job_id.clone();
            match job_from_row(row) {
                Ok(job) => {
                    let is_open = job.status.is_open();
                    self.scheduler.reconcile(&job_id, &job.policy, is_open).await;
                    if is_open {
                        installed += 1;
                    }
                }
                Err(e) => {
                    warn!("Job {job_id} left untriggered, stored policy is invalid: {e}");
                    self.scheduler.remove(&job_id).await;
                }
            }
        }

        info!("Restored {installed} daily triggers");
        Ok(installed)
    }
}
