//! Rating Orchestrator: scores applications against a job's requirements.
//!
//! One application goes through: resume lookup → text extraction → resume
//! structuring → rating → persistence. Every model reply passes through the
//! response validator before it is used. A sweep runs that pipeline over all
//! unrated applications of a job, oldest first, and keeps going past
//! per-application failures.
//!
//! At most one rating run touches a job at a time: callers on the manual path
//! wait for the job's lock, scheduler-originated sweeps skip when it is held.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::extraction::{is_unusable, DocumentExtractor};
use crate::ledger;
use crate::llm_client::{LlmError, TextCompletion};
use crate::models::application::RatingResult;
use crate::models::job::JobStatus;
use crate::models::resume::StructuredResume;
use crate::ranking::{top_n, RankedApplicant};
use crate::rating::prompts::{RATING_PROMPT, RESUME_STRUCTURE_PROMPT};
use crate::scheduler::{SweepRunner, TriggerOrigin};
use crate::validation::parse_as;

pub mod handlers;
pub mod jd_parser;
pub mod prompts;
#[cfg(test)]
pub mod testing;

#[derive(Debug, Error)]
pub enum RatingError {
    #[error("{0}")]
    NotFound(String),

    #[error("job {0} is not open")]
    JobNotOpen(String),

    #[error("resume extraction failed: {0}")]
    Extraction(String),

    #[error("resume structuring failed: {reason}")]
    Structuring { raw: String, reason: String },

    #[error("rating output rejected: {reason}")]
    Validation {
        raw: String,
        reason: String,
        fallback: RatingResult,
    },

    #[error("ledger error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: &'static str, after: Duration },

    #[error("completion service failed: {0}")]
    Completion(#[from] LlmError),
}

/// Outcome counters of one sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepSummary {
    pub run_id: Uuid,
    pub job_id: String,
    pub rated: u32,
    pub errors: u32,
    pub skipped: u32,
}

/// Result of rate-and-rank.
#[derive(Debug, Clone, Serialize)]
pub struct RelevantApplicants {
    pub sweep: SweepSummary,
    pub ranked: Vec<RankedApplicant>,
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub extraction: Duration,
    pub completion: Duration,
}

pub struct RatingOrchestrator {
    db: SqlitePool,
    extractor: Arc<dyn DocumentExtractor>,
    llm: Arc<dyn TextCompletion>,
    timeouts: Timeouts,
    job_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RatingOrchestrator {
    pub fn new(
        db: SqlitePool,
        extractor: Arc<dyn DocumentExtractor>,
        llm: Arc<dyn TextCompletion>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            db,
            extractor,
            llm,
            timeouts,
            job_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.job_locks.lock().await;
        locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Hands back a lock taken with `job_lock`. The entry is dropped once no
    /// other caller holds or waits on it, so the map only tracks busy jobs.
    async fn release_job_lock(&self, job_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.job_locks.lock().await;
        drop(lock);
        if locks
            .get(job_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(job_id);
        }
    }

    #[cfg(test)]
    async fn tracked_jobs(&self) -> usize {
        self.job_locks.lock().await.len()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Public operations
    // ────────────────────────────────────────────────────────────────────────

    /// Scores a single application and persists the result.
    ///
    /// A rating reply that fails validation still persists a zeroed rating and
    /// is reported as `RatingError::Validation` carrying that fallback.
    pub async fn score_one(
        &self,
        applicant_id: &str,
        job_id: &str,
    ) -> Result<RatingResult, RatingError> {
        let lock = self.job_lock(job_id).await;
        let result = {
            let _guard = lock.lock().await;
            match ledger::get_structured_jd(&self.db, job_id).await {
                Ok(jd) => {
                    self.rate_application(applicant_id, job_id, jd.as_ref())
                        .await
                }
                Err(e) => Err(e.into()),
            }
        };
        self.release_job_lock(job_id, lock).await;
        result
    }

    /// Rates every unrated application of a job, waiting for any running
    /// rating work on the same job to finish first.
    pub async fn sweep(
        &self,
        job_id: &str,
        include_rejected: bool,
    ) -> Result<SweepSummary, RatingError> {
        let lock = self.job_lock(job_id).await;
        let summary = {
            let _guard = lock.lock().await;
            self.sweep_locked(job_id, include_rejected).await
        };
        self.release_job_lock(job_id, lock).await;
        summary
    }

    /// Full sweep for scheduler triggers: every unrated application,
    /// rejected ones included. Returns `None` immediately when the job is
    /// already being rated.
    pub async fn try_sweep(&self, job_id: &str) -> Result<Option<SweepSummary>, RatingError> {
        let lock = self.job_lock(job_id).await;
        let outcome = match lock.try_lock() {
            Ok(_guard) => self.sweep_locked(job_id, true).await.map(Some),
            Err(_) => {
                info!("Sweep for job {job_id} already running, skipping");
                Ok(None)
            }
        };
        self.release_job_lock(job_id, lock).await;
        outcome
    }

    /// Rates pending non-rejected applications of an open job, then returns
    /// the best `m`.
    pub async fn filter_relevant(
        &self,
        job_id: &str,
        m: i64,
    ) -> Result<RelevantApplicants, RatingError> {
        let job = ledger::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| RatingError::NotFound(format!("job {job_id} not found")))?;
        if job.job_status.parse::<JobStatus>() != Ok(JobStatus::Open) {
            return Err(RatingError::JobNotOpen(job_id.to_string()));
        }

        let sweep = self.sweep(job_id, false).await?;
        let ranked = top_n(&self.db, job_id, m, false).await?;

        Ok(RelevantApplicants { sweep, ranked })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Pipeline (callers hold the job lock)
    // ────────────────────────────────────────────────────────────────────────

    async fn sweep_locked(
        &self,
        job_id: &str,
        include_rejected: bool,
    ) -> Result<SweepSummary, RatingError> {
        let run_id = Uuid::new_v4();

        if ledger::get_job(&self.db, job_id).await?.is_none() {
            return Err(RatingError::NotFound(format!("job {job_id} not found")));
        }
        let jd = ledger::get_structured_jd(&self.db, job_id).await?;
        let pending = ledger::list_unrated(&self.db, job_id, include_rejected).await?;

        info!(
            "Sweep {run_id} for job {job_id}: {} unrated applications",
            pending.len()
        );

        let mut summary = SweepSummary {
            run_id,
            job_id: job_id.to_string(),
            rated: 0,
            errors: 0,
            skipped: 0,
        };

        for application in pending {
            let applicant_id = application.applicant_id.as_str();

            if application.resume_reference.is_none() {
                warn!("Skipping {applicant_id} for job {job_id}: no resume on file");
                summary.skipped += 1;
                continue;
            }

            match self.rate_application(applicant_id, job_id, jd.as_ref()).await {
                Ok(_) => summary.rated += 1,
                Err(RatingError::Extraction(reason)) => {
                    warn!("Skipping {applicant_id} for job {job_id}: {reason}");
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("Rating {applicant_id} for job {job_id} failed: {e}");
                    summary.errors += 1;
                }
            }
        }

        info!(
            "Sweep {run_id} for job {job_id} finished: rated={} errors={} skipped={}",
            summary.rated, summary.errors, summary.skipped
        );
        Ok(summary)
    }

    async fn rate_application(
        &self,
        applicant_id: &str,
        job_id: &str,
        jd: Option<&Value>,
    ) -> Result<RatingResult, RatingError> {
        let reference = ledger::get_resume_reference(&self.db, applicant_id, job_id)
            .await?
            .ok_or_else(|| {
                RatingError::NotFound(format!(
                    "no application from {applicant_id} for job {job_id}"
                ))
            })?
            .ok_or_else(|| {
                RatingError::NotFound(format!("applicant {applicant_id} has no resume on file"))
            })?;

        let resume_text = self.extract(&reference).await?;

        let resume = self.structure_resume(&resume_text).await?;
        let resume_json = serde_json::to_value(&resume).map_err(|e| RatingError::Structuring {
            raw: String::new(),
            reason: e.to_string(),
        })?;
        if let Err(e) = ledger::save_structured_resume(&self.db, applicant_id, &resume_json).await {
            warn!("Could not cache structured resume for {applicant_id}: {e}");
        }

        let jd = jd.ok_or_else(|| {
            RatingError::NotFound(format!("job {job_id} has no structured description"))
        })?;

        let prompt = RATING_PROMPT
            .replace("{resume_json}", &format!("{resume_json:#}"))
            .replace("{jd_json}", &format!("{jd:#}"));
        let raw = self.complete(&prompt).await?;

        let (result, failure) = match parse_as::<RatingResult>(&raw) {
            Ok(result) => (result, None),
            Err(failure) => {
                let reason = failure.to_string();
                warn!("Rating reply for {applicant_id} on job {job_id} rejected: {reason}");
                (RatingResult::zeroed(&reason), Some(reason))
            }
        };

        let written = ledger::update_rating(&self.db, applicant_id, job_id, &result).await?;
        if written == 0 {
            return Err(RatingError::NotFound(format!(
                "application from {applicant_id} for job {job_id} disappeared"
            )));
        }

        match failure {
            None => {
                info!(
                    "Rated {applicant_id} for job {job_id}: {}",
                    result.rating
                );
                Ok(result)
            }
            Some(reason) => Err(RatingError::Validation {
                raw,
                reason,
                fallback: result,
            }),
        }
    }

    async fn extract(&self, reference: &str) -> Result<String, RatingError> {
        let after = self.timeouts.extraction;
        let text = match timeout(after, self.extractor.extract(reference)).await {
            Ok(extracted) => {
                extracted.map_err(|e| RatingError::Extraction(format!("{e:#}")))?
            }
            Err(_) => {
                return Err(RatingError::Timeout {
                    stage: "extraction",
                    after,
                })
            }
        };

        if is_unusable(&text) {
            return Err(RatingError::Extraction(text.trim().to_string()));
        }
        Ok(text)
    }

    async fn structure_resume(&self, resume_text: &str) -> Result<StructuredResume, RatingError> {
        let prompt = RESUME_STRUCTURE_PROMPT.replace("{resume_text}", resume_text);
        let raw = self.complete(&prompt).await?;

        parse_as::<StructuredResume>(&raw).map_err(|failure| RatingError::Structuring {
            reason: failure.to_string(),
            raw,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, RatingError> {
        let after = self.timeouts.completion;
        match timeout(after, self.llm.complete(prompt)).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(RatingError::Timeout {
                stage: "completion",
                after,
            }),
        }
    }
}

#[async_trait]
impl SweepRunner for RatingOrchestrator {
    async fn run_sweep(&self, job_id: &str, origin: TriggerOrigin) -> anyhow::Result<()> {
        let job = ledger::get_job(&self.db, job_id).await?;
        let is_open = job
            .as_ref()
            .is_some_and(|j| j.job_status.parse::<JobStatus>() == Ok(JobStatus::Open));
        if !is_open {
            info!("{origin} trigger for job {job_id} ignored: job is not open");
            return Ok(());
        }

        if let Some(summary) = self.try_sweep(job_id).await? {
            info!(
                "{origin} sweep for job {job_id} done: rated={} errors={} skipped={}",
                summary.rated, summary.errors, summary.skipped
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::in_memory_pool;
    use crate::ledger::{
        add_application, get_application, update_application_status, upsert_applicant,
        upsert_job, JobUpsert,
    };
    use crate::models::application::ApplicationStatus;
    use crate::models::job::AnalysisPolicy;
    use crate::rating::testing::{
        by_candidate, rating_reply, resume_reply, FakeExtractor, ScriptedCompletion,
    };
    use serde_json::json;

    fn timeouts() -> Timeouts {
        Timeouts {
            extraction: Duration::from_secs(5),
            completion: Duration::from_secs(5),
        }
    }

    async fn seed_job(pool: &SqlitePool, job_id: &str) {
        let jd = json!({
            "job_title": "Data Analyst",
            "required_skills": ["SQL"],
            "preferred_skills": [],
            "required_experience_years": 2,
            "required_education": null,
            "key_responsibilities": []
        });
        upsert_job(
            pool,
            &JobUpsert {
                job_id,
                title: "Data Analyst",
                description: Some("SQL-heavy analyst role"),
                structured_jd: Some(&jd),
                policy: &AnalysisPolicy::Manual,
            },
        )
        .await
        .unwrap();
    }

    async fn apply(pool: &SqlitePool, applicant_id: &str, job_id: &str, resume: Option<&str>) {
        upsert_applicant(pool, applicant_id, Some(applicant_id), resume)
            .await
            .unwrap();
        add_application(pool, applicant_id, job_id).await.unwrap();
    }

    fn orchestrator(
        pool: &SqlitePool,
        extractor: FakeExtractor,
        llm: ScriptedCompletion,
    ) -> (RatingOrchestrator, Arc<FakeExtractor>, Arc<ScriptedCompletion>) {
        let extractor = Arc::new(extractor);
        let llm = Arc::new(llm);
        let orchestrator =
            RatingOrchestrator::new(pool.clone(), extractor.clone(), llm.clone(), timeouts());
        (orchestrator, extractor, llm)
    }

    async fn stored_rating(pool: &SqlitePool, applicant_id: &str, job_id: &str) -> Option<i64> {
        get_application(pool, applicant_id, job_id)
            .await
            .unwrap()
            .unwrap()
            .rating
    }

    #[tokio::test]
    async fn test_score_one_persists_validated_rating() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, _, llm) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee\nSQL, Python"),
            ScriptedCompletion::new(vec![
                Ok(format!("```json\n{}\n```", resume_reply("Ann Lee", &["SQL"]))),
                Ok(format!("Here is my evaluation: {} Hope this helps!", rating_reply(81))),
            ]),
        );

        let result = orchestrator.score_one("ann@x.com", "J1").await.unwrap();
        assert_eq!(result.rating, 81);
        assert_eq!(stored_rating(&pool, "ann@x.com", "J1").await, Some(81));

        let prompts = llm.prompts();
        assert!(prompts[0].contains("Ann Lee\nSQL, Python"));
        assert!(prompts[1].contains("\"required_skills\""));
    }

    #[tokio::test]
    async fn test_invalid_rating_reply_persists_zero_fallback() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, _, _) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            ScriptedCompletion::new(vec![
                Ok(resume_reply("Ann Lee", &[])),
                Ok(r#"{"rating": 88, "summary": "great"}"#.to_string()),
            ]),
        );

        match orchestrator.score_one("ann@x.com", "J1").await {
            Err(RatingError::Validation { raw, fallback, .. }) => {
                assert!(raw.contains("great"));
                assert_eq!(fallback.rating, 0);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(stored_rating(&pool, "ann@x.com", "J1").await, Some(0));
    }

    #[tokio::test]
    async fn test_out_of_range_rating_is_clamped_before_storage() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, _, _) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            ScriptedCompletion::new(vec![
                Ok(resume_reply("Ann Lee", &[])),
                Ok(rating_reply(140)),
            ]),
        );

        let result = orchestrator.score_one("ann@x.com", "J1").await.unwrap();
        assert_eq!(result.rating, 100);
        assert_eq!(stored_rating(&pool, "ann@x.com", "J1").await, Some(100));
    }

    #[tokio::test]
    async fn test_structuring_failure_leaves_rating_null() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, _, llm) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            ScriptedCompletion::new(vec![Ok("Sorry, I can't read this resume.".to_string())]),
        );

        let err = orchestrator.score_one("ann@x.com", "J1").await.unwrap_err();
        assert!(matches!(err, RatingError::Structuring { .. }));
        assert_eq!(llm.calls(), 1);
        assert_eq!(stored_rating(&pool, "ann@x.com", "J1").await, None);
    }

    #[tokio::test]
    async fn test_score_one_unknown_application_is_not_found() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        let (orchestrator, extractor, _) =
            orchestrator(&pool, FakeExtractor::default(), ScriptedCompletion::new(vec![]));

        let err = orchestrator.score_one("ghost@x.com", "J1").await.unwrap_err();
        assert!(matches!(err, RatingError::NotFound(_)));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_warning_tagged_extraction_is_extraction_error() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("scan.pdf")).await;

        let (orchestrator, _, llm) = orchestrator(
            &pool,
            FakeExtractor::default()
                .with_document("scan.pdf", crate::extraction::EMPTY_PDF_WARNING),
            ScriptedCompletion::new(vec![]),
        );

        let err = orchestrator.score_one("ann@x.com", "J1").await.unwrap_err();
        assert!(matches!(err, RatingError::Extraction(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_completion_error_surfaces_as_completion() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, _, _) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            ScriptedCompletion::new(vec![Err(LlmError::Api {
                status: 400,
                message: "bad request".into(),
            })]),
        );

        let err = orchestrator.score_one("ann@x.com", "J1").await.unwrap_err();
        assert!(matches!(err, RatingError::Completion(_)));
    }

    #[tokio::test]
    async fn test_slow_completion_times_out() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let orchestrator = RatingOrchestrator::new(
            pool.clone(),
            Arc::new(FakeExtractor::default().with_document("ann.pdf", "Ann Lee")),
            Arc::new(
                ScriptedCompletion::new(vec![Ok(resume_reply("Ann Lee", &[]))])
                    .with_delay(Duration::from_secs(30)),
            ),
            Timeouts {
                extraction: Duration::from_secs(5),
                completion: Duration::from_millis(50),
            },
        );

        let err = orchestrator.score_one("ann@x.com", "J1").await.unwrap_err();
        assert!(matches!(
            err,
            RatingError::Timeout {
                stage: "completion",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_structured_jd_is_not_found() {
        let pool = in_memory_pool().await;
        upsert_job(
            &pool,
            &JobUpsert {
                job_id: "J2",
                title: "Untitled",
                description: None,
                structured_jd: None,
                policy: &AnalysisPolicy::Manual,
            },
        )
        .await
        .unwrap();
        apply(&pool, "ann@x.com", "J2", Some("ann.pdf")).await;

        let (orchestrator, _, llm) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            ScriptedCompletion::new(vec![Ok(resume_reply("Ann Lee", &[]))]),
        );

        let err = orchestrator.score_one("ann@x.com", "J2").await.unwrap_err();
        assert!(matches!(err, RatingError::NotFound(_)));
        assert_eq!(llm.calls(), 1);
        assert_eq!(stored_rating(&pool, "ann@x.com", "J2").await, None);
    }

    #[tokio::test]
    async fn test_sweep_counts_rated_errors_and_skipped() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;
        apply(&pool, "bob@x.com", "J1", None).await;
        apply(&pool, "cy@x.com", "J1", Some("missing.pdf")).await;
        apply(&pool, "dee@x.com", "J1", Some("dee.pdf")).await;
        apply(&pool, "eve@x.com", "J1", Some("eve.pdf")).await;
        update_application_status(&pool, "eve@x.com", "J1", ApplicationStatus::Rejected)
            .await
            .unwrap();

        let (orchestrator, _, _) = orchestrator(
            &pool,
            FakeExtractor::default()
                .with_document("ann.pdf", "Ann Lee")
                .with_document("dee.pdf", "Dee Dee")
                .with_document("eve.pdf", "Eve Park"),
            ScriptedCompletion::from_fn(|prompt| {
                if prompt.contains("Dee Dee") {
                    Ok("not json".to_string())
                } else if prompt.contains("Structured Job Requirements") {
                    Ok(rating_reply(70))
                } else {
                    Ok(resume_reply("Ann Lee", &["SQL"]))
                }
            }),
        );

        let summary = orchestrator.sweep("J1", false).await.unwrap();
        assert_eq!(summary.rated, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(stored_rating(&pool, "ann@x.com", "J1").await, Some(70));
        assert_eq!(stored_rating(&pool, "eve@x.com", "J1").await, None);
    }

    #[tokio::test]
    async fn test_sweep_unknown_job_aborts() {
        let pool = in_memory_pool().await;
        let (orchestrator, _, _) =
            orchestrator(&pool, FakeExtractor::default(), ScriptedCompletion::new(vec![]));
        assert!(matches!(
            orchestrator.sweep("nope", false).await,
            Err(RatingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_second_sweep_has_nothing_left() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, _, llm) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            by_candidate(&[("Ann Lee", 55)]),
        );

        assert_eq!(orchestrator.sweep("J1", false).await.unwrap().rated, 1);
        let again = orchestrator.sweep("J1", false).await.unwrap();
        assert_eq!((again.rated, again.errors, again.skipped), (0, 0, 0));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_try_sweep_skips_while_job_is_being_rated() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, _, llm) = orchestrator(
            &pool,
            FakeExtractor::default()
                .with_document("ann.pdf", "Ann Lee")
                .with_delay(Duration::from_millis(300)),
            by_candidate(&[("Ann Lee", 60)]),
        );
        let orchestrator = Arc::new(orchestrator);

        let running = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.sweep("J1", false).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(orchestrator.try_sweep("J1").await.unwrap(), None);

        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.rated, 1);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_manual_sweeps_rate_once() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;

        let (orchestrator, extractor, _) = orchestrator(
            &pool,
            FakeExtractor::default()
                .with_document("ann.pdf", "Ann Lee")
                .with_delay(Duration::from_millis(100)),
            by_candidate(&[("Ann Lee", 60)]),
        );

        let (first, second) = tokio::join!(
            orchestrator.sweep("J1", false),
            orchestrator.sweep("J1", false)
        );
        let rated = first.unwrap().rated + second.unwrap().rated;
        assert_eq!(rated, 1);
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn test_job_locks_are_dropped_once_idle() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        seed_job(&pool, "J2").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;
        apply(&pool, "bob@x.com", "J2", Some("bob.pdf")).await;

        let (orchestrator, _, _) = orchestrator(
            &pool,
            FakeExtractor::default()
                .with_document("ann.pdf", "Ann Lee")
                .with_document("bob.pdf", "Bob Ray")
                .with_delay(Duration::from_millis(100)),
            by_candidate(&[("Ann Lee", 60), ("Bob Ray", 40)]),
        );

        let (first, second, skipped) = tokio::join!(
            orchestrator.score_one("ann@x.com", "J1"),
            orchestrator.sweep("J1", false),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                orchestrator.try_sweep("J1").await
            }
        );
        assert_eq!(first.unwrap().rating, 60);
        assert_eq!(second.unwrap().rated, 0);
        assert_eq!(skipped.unwrap(), None);
        assert_eq!(orchestrator.tracked_jobs().await, 0);

        assert_eq!(orchestrator.try_sweep("J2").await.unwrap().unwrap().rated, 1);
        assert!(orchestrator.score_one("nobody", "J2").await.is_err());
        assert_eq!(orchestrator.tracked_jobs().await, 0);
    }

    #[tokio::test]
    async fn test_filter_relevant_requires_open_job() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        ledger::update_job_status(&pool, "J1", JobStatus::Filled)
            .await
            .unwrap();

        let (orchestrator, _, _) =
            orchestrator(&pool, FakeExtractor::default(), ScriptedCompletion::new(vec![]));
        assert!(matches!(
            orchestrator.filter_relevant("J1", 3).await,
            Err(RatingError::JobNotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_filter_relevant_rates_then_ranks() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;
        apply(&pool, "bob@x.com", "J1", Some("bob.pdf")).await;
        apply(&pool, "cy@x.com", "J1", Some("cy.pdf")).await;

        let (orchestrator, _, _) = orchestrator(
            &pool,
            FakeExtractor::default()
                .with_document("ann.pdf", "Ann Lee")
                .with_document("bob.pdf", "Bob Stone")
                .with_document("cy.pdf", "Cy Young"),
            by_candidate(&[("Ann Lee", 50), ("Bob Stone", 90), ("Cy Young", 70)]),
        );

        let outcome = orchestrator.filter_relevant("J1", 2).await.unwrap();
        assert_eq!(outcome.sweep.rated, 3);
        let ids: Vec<_> = outcome
            .ranked
            .iter()
            .map(|r| r.applicant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["bob@x.com", "cy@x.com"]);
    }

    #[tokio::test]
    async fn test_scheduled_run_ignores_closed_job() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;
        ledger::update_job_status(&pool, "J1", JobStatus::Closed)
            .await
            .unwrap();

        let (orchestrator, extractor, _) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            by_candidate(&[("Ann Lee", 60)]),
        );

        orchestrator
            .run_sweep("J1", TriggerOrigin::Daily)
            .await
            .unwrap();
        assert_eq!(extractor.calls(), 0);
        assert_eq!(stored_rating(&pool, "ann@x.com", "J1").await, None);
    }

    #[tokio::test]
    async fn test_scheduled_run_rates_rejected_applications() {
        let pool = in_memory_pool().await;
        seed_job(&pool, "J1").await;
        apply(&pool, "ann@x.com", "J1", Some("ann.pdf")).await;
        update_application_status(&pool, "ann@x.com", "J1", ApplicationStatus::Rejected)
            .await
            .unwrap();

        let (orchestrator, _, _) = orchestrator(
            &pool,
            FakeExtractor::default().with_document("ann.pdf", "Ann Lee"),
            by_candidate(&[("Ann Lee", 60)]),
        );

        assert_eq!(orchestrator.sweep("J1", false).await.unwrap().rated, 0);
        orchestrator
            .run_sweep("J1", TriggerOrigin::Threshold)
            .await
            .unwrap();
        assert_eq!(stored_rating(&pool, "ann@x.com", "J1").await, Some(60));
    }
}
