use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Serialize, Serializer};
use sqlx::FromRow;

/// Batch threshold used when none (or a non-numeric one) is supplied.
pub const DEFAULT_BATCH_THRESHOLD: u32 = 5;

/// Lifecycle status of a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Closed,
    Filled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Closed => "closed",
            JobStatus::Filled => "filled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, JobStatus::Open)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(JobStatus::Open),
            "closed" => Ok(JobStatus::Closed),
            "filled" => Ok(JobStatus::Filled),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Discriminant of an `AnalysisPolicy`, as stored in `jobs.analysis_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Manual,
    Scheduled,
    Batch,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Manual => "manual",
            PolicyKind::Scheduled => "scheduled",
            PolicyKind::Batch => "batch",
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(PolicyKind::Manual),
            "scheduled" => Ok(PolicyKind::Scheduled),
            "batch" => Ok(PolicyKind::Batch),
            other => Err(format!("unknown policy kind '{other}'")),
        }
    }
}

/// Time of day (UTC) at which a scheduled job is swept. Always rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime(NaiveTime);

impl ScheduleTime {
    /// Returns `None` when hour or minute is out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(ScheduleTime)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// When a job's applications are scored. Exactly one is active per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisPolicy {
    /// No automatic trigger; scoring happens only on operator request.
    Manual,
    /// One sweep per calendar day at `time`.
    Scheduled { time: ScheduleTime },
    /// Sweep once the unrated count reaches `threshold`.
    Batch { threshold: u32 },
}

impl AnalysisPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            AnalysisPolicy::Manual => PolicyKind::Manual,
            AnalysisPolicy::Scheduled { .. } => PolicyKind::Scheduled,
            AnalysisPolicy::Batch { .. } => PolicyKind::Batch,
        }
    }

    /// Storage columns `(analysis_schedule, analysis_batch_size)`; the
    /// column of the non-selected kind is always NULL.
    pub fn columns(&self) -> (Option<String>, Option<i64>) {
        match self {
            AnalysisPolicy::Manual => (None, None),
            AnalysisPolicy::Scheduled { time } => (Some(time.to_string()), None),
            AnalysisPolicy::Batch { threshold } => (None, Some(i64::from(*threshold))),
        }
    }
}

/// Raw `jobs` row. Policy columns are validated when converted to a `Job`.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: String,
    pub title: String,
    pub description_text: Option<String>,
    pub job_status: String,
    pub analysis_policy: String,
    pub analysis_schedule: Option<String>,
    pub analysis_batch_size: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A job posting with a validated policy.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub job_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: JobStatus,
    pub policy: AnalysisPolicy,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
