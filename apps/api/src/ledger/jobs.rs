use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::models::job::{AnalysisPolicy, JobRow, JobStatus, PolicyKind};

const JOB_COLUMNS: &str = "job_id, title, description_text, job_status, analysis_policy, \
     analysis_schedule, analysis_batch_size, created_at, updated_at";

/// Parameters for creating or re-posting a job.
pub struct JobUpsert<'a> {
    pub job_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub structured_jd: Option<&'a Value>,
    pub policy: &'a AnalysisPolicy,
}

/// Inserts or updates a job. Re-posting always reopens it (`job_status = 'open'`).
/// A missing structured JD keeps the previously stored one.
pub async fn upsert_job(pool: &SqlitePool, job: &JobUpsert<'_>) -> Result<(), sqlx::Error> {
    let (schedule, batch_size) = job.policy.columns();

    sqlx::query(
        r#"
        INSERT INTO jobs
            (job_id, title, description_text, structured_jd, job_status,
             analysis_policy, analysis_schedule, analysis_batch_size)
        VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?6, ?7)
        ON CONFLICT(job_id) DO UPDATE SET
            title = excluded.title,
            description_text = excluded.description_text,
            structured_jd = COALESCE(excluded.structured_jd, jobs.structured_jd),
            job_status = 'open',
            analysis_policy = excluded.analysis_policy,
            analysis_schedule = excluded.analysis_schedule,
            analysis_batch_size = excluded.analysis_batch_size,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(job.job_id)
    .bind(job.title)
    .bind(job.description)
    .bind(job.structured_jd.map(Json))
    .bind(job.policy.kind().as_str())
    .bind(schedule)
    .bind(batch_size)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_job(pool: &SqlitePool, job_id: &str) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_jobs_by_policy(
    pool: &SqlitePool,
    kind: PolicyKind,
) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE analysis_policy = ?1 ORDER BY job_id"
    ))
    .bind(kind.as_str())
    .fetch_all(pool)
    .await
}

/// Replaces the policy columns only. Returns the number of rows touched.
pub async fn update_job_policy(
    pool: &SqlitePool,
    job_id: &str,
    policy: &AnalysisPolicy,
) -> Result<u64, sqlx::Error> {
    let (schedule, batch_size) = policy.columns();

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET analysis_policy = ?1,
            analysis_schedule = ?2,
            analysis_batch_size = ?3,
            updated_at = CURRENT_TIMESTAMP
        WHERE job_id = ?4
        "#,
    )
    .bind(policy.kind().as_str())
    .bind(schedule)
    .bind(batch_size)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn update_job_status(
    pool: &SqlitePool,
    job_id: &str,
    status: JobStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET job_status = ?1, updated_at = CURRENT_TIMESTAMP WHERE job_id = ?2",
    )
    .bind(status.as_str())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Structured requirements for a job. `None` when the job is unknown or was
/// never structured.
pub async fn get_structured_jd(
    pool: &SqlitePool,
    job_id: &str,
) -> Result<Option<Value>, sqlx::Error> {
    let stored: Option<Option<Json<Value>>> =
        sqlx::query_scalar("SELECT structured_jd FROM jobs WHERE job_id = ?1")
            .bind(job_id)
            .fetch_optional(pool)
            .await?;

    Ok(stored.flatten().map(|json| json.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::in_memory_pool;
    use crate::models::job::ScheduleTime;
    use serde_json::json;

    fn scheduled(hour: u32, minute: u32) -> AnalysisPolicy {
        AnalysisPolicy::Scheduled {
            time: ScheduleTime::from_hm(hour, minute).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_job_reopens_closed_job() {
        let pool = in_memory_pool().await;
        let policy = AnalysisPolicy::Manual;
        let job = JobUpsert {
            job_id: "DEV001",
            title: "Backend Engineer",
            description: Some("Rust services"),
            structured_jd: None,
            policy: &policy,
        };
        upsert_job(&pool, &job).await.unwrap();
        update_job_status(&pool, "DEV001", JobStatus::Closed)
            .await
            .unwrap();

        upsert_job(&pool, &job).await.unwrap();

        let row = get_job(&pool, "DEV001").await.unwrap().unwrap();
        assert_eq!(row.job_status, "open");
    }

    #[tokio::test]
    async fn test_policy_update_nulls_unselected_columns() {
        let pool = in_memory_pool().await;
        let policy = scheduled(22, 0);
        upsert_job(
            &pool,
            &JobUpsert {
                job_id: "J1",
                title: "Analyst",
                description: None,
                structured_jd: None,
                policy: &policy,
            },
        )
        .await
        .unwrap();

        let touched = update_job_policy(&pool, "J1", &AnalysisPolicy::Batch { threshold: 4 })
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let row = get_job(&pool, "J1").await.unwrap().unwrap();
        assert_eq!(row.analysis_policy, "batch");
        assert_eq!(row.analysis_schedule, None);
        assert_eq!(row.analysis_batch_size, Some(4));
    }

    #[tokio::test]
    async fn test_structured_jd_survives_reupsert_without_one() {
        let pool = in_memory_pool().await;
        let jd = json!({"job_title": "Analyst", "required_skills": ["SQL"]});
        let policy = AnalysisPolicy::Manual;
        upsert_job(
            &pool,
            &JobUpsert {
                job_id: "J1",
                title: "Analyst",
                description: Some("SQL analyst"),
                structured_jd: Some(&jd),
                policy: &policy,
            },
        )
        .await
        .unwrap();
        upsert_job(
            &pool,
            &JobUpsert {
                job_id: "J1",
                title: "Senior Analyst",
                description: None,
                structured_jd: None,
                policy: &policy,
            },
        )
        .await
        .unwrap();

        assert_eq!(get_structured_jd(&pool, "J1").await.unwrap(), Some(jd));
        assert_eq!(get_structured_jd(&pool, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_jobs_by_policy_filters_kind() {
        let pool = in_memory_pool().await;
        for (id, policy) in [
            ("A", scheduled(1, 0)),
            ("B", AnalysisPolicy::Batch { threshold: 5 }),
            ("C", scheduled(2, 30)),
        ] {
            upsert_job(
                &pool,
                &JobUpsert {
                    job_id: id,
                    title: id,
                    description: None,
                    structured_jd: None,
                    policy: &policy,
                },
            )
            .await
            .unwrap();
        }

        let rows = list_jobs_by_policy(&pool, PolicyKind::Scheduled)
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(rows[1].analysis_schedule.as_deref(), Some("02:30"));
    }
}
