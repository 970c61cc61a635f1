use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Maximum entries kept in `fits` / `lacks`.
pub const MAX_DETAIL_ITEMS: usize = 5;

/// Operator-driven review status. The rating core never writes this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Shortlisted,
    Rejected,
    Selected,
    Hired,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Selected => "selected",
            ApplicationStatus::Hired => "hired",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ApplicationStatus::Pending),
            "shortlisted" => Ok(ApplicationStatus::Shortlisted),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "selected" => Ok(ApplicationStatus::Selected),
            "hired" => Ok(ApplicationStatus::Hired),
            other => Err(format!("unknown application status '{other}'")),
        }
    }
}

/// Narrative part of a rating, persisted as JSON in `applications.rating_detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingDetail {
    pub summary: String,
    pub fits: Vec<String>,
    pub lacks: Vec<String>,
}

/// A validated rating: `rating` is always within 0–100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingResult {
    pub rating: u8,
    pub summary: String,
    pub fits: Vec<String>,
    pub lacks: Vec<String>,
}

impl RatingResult {
    /// The default written when the model's rating output is unusable.
    pub fn zeroed(reason: &str) -> Self {
        Self {
            rating: 0,
            summary: format!("Rating unavailable: {reason}"),
            fits: vec![],
            lacks: vec![],
        }
    }

    pub fn detail(&self) -> RatingDetail {
        RatingDetail {
            summary: self.summary.clone(),
            fits: self.fits.clone(),
            lacks: self.lacks.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApplicationRow {
    pub application_id: i64,
    pub applicant_id: String,
    pub job_id: String,
    pub status: String,
    pub rating: Option<i64>,
    pub rating_detail: Option<Json<RatingDetail>>,
    pub applied_at: NaiveDateTime,
    pub rated_at: Option<NaiveDateTime>,
}

/// An application still waiting for a rating, in sweep order.
#[derive(Debug, Clone, FromRow)]
pub struct UnratedApplication {
    pub application_id: i64,
    pub applicant_id: String,
    pub resume_reference: Option<String>,
}

/// A rated applicant as read by the ranking query.
#[derive(Debug, Clone, FromRow)]
pub struct RankedRow {
    pub applicant_id: String,
    pub name: Option<String>,
    pub rating: i64,
}
