use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::models::application::{
    ApplicationRow, ApplicationStatus, RankedRow, RatingResult, UnratedApplication,
};

// ────────────────────────────────────────────────────────────────────────────
// Applicants
// ────────────────────────────────────────────────────────────────────────────

/// Inserts or updates an applicant. A `None` resume reference keeps the stored one.
pub async fn upsert_applicant(
    pool: &SqlitePool,
    applicant_id: &str,
    name: Option<&str>,
    resume_reference: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO applicants (applicant_id, name, resume_reference)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(applicant_id) DO UPDATE SET
            name = COALESCE(excluded.name, applicants.name),
            resume_reference = COALESCE(excluded.resume_reference, applicants.resume_reference)
        "#,
    )
    .bind(applicant_id)
    .bind(name)
    .bind(resume_reference)
    .execute(pool)
    .await?;

    Ok(())
}

/// Caches the structured form of an applicant's resume.
pub async fn save_structured_resume(
    pool: &SqlitePool,
    applicant_id: &str,
    structured: &Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE applicants SET structured_resume = ?1 WHERE applicant_id = ?2")
        .bind(Json(structured))
        .bind(applicant_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Applications
// ────────────────────────────────────────────────────────────────────────────

/// Links an applicant to a job. Returns `false` when the pair already existed.
pub async fn add_application(
    pool: &SqlitePool,
    applicant_id: &str,
    job_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO applications (applicant_id, job_id)
        VALUES (?1, ?2)
        ON CONFLICT(applicant_id, job_id) DO NOTHING
        "#,
    )
    .bind(applicant_id)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_application(
    pool: &SqlitePool,
    applicant_id: &str,
    job_id: &str,
) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(
        r#"
        SELECT application_id, applicant_id, job_id, status, rating, rating_detail,
               applied_at, rated_at
        FROM applications
        WHERE applicant_id = ?1 AND job_id = ?2
        "#,
    )
    .bind(applicant_id)
    .bind(job_id)
    .fetch_optional(pool)
    .await
}

pub async fn update_application_status(
    pool: &SqlitePool,
    applicant_id: &str,
    job_id: &str,
    status: ApplicationStatus,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE applications SET status = ?1 WHERE applicant_id = ?2 AND job_id = ?3")
            .bind(status.as_str())
            .bind(applicant_id)
            .bind(job_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

/// Resume reference for an application.
///
/// The outer `Option` is `None` when no application exists; the inner one is
/// `None` when the applicant never supplied a resume.
pub async fn get_resume_reference(
    pool: &SqlitePool,
    applicant_id: &str,
    job_id: &str,
) -> Result<Option<Option<String>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT a.resume_reference
        FROM applications app
        JOIN applicants a ON a.applicant_id = app.applicant_id
        WHERE app.applicant_id = ?1 AND app.job_id = ?2
        "#,
    )
    .bind(applicant_id)
    .bind(job_id)
    .fetch_optional(pool)
    .await
}

/// Applications with no rating yet, oldest first.
pub async fn list_unrated(
    pool: &SqlitePool,
    job_id: &str,
    include_rejected: bool,
) -> Result<Vec<UnratedApplication>, sqlx::Error> {
    sqlx::query_as::<_, UnratedApplication>(
        r#"
        SELECT app.application_id, app.applicant_id, a.resume_reference
        FROM applications app
        JOIN applicants a ON a.applicant_id = app.applicant_id
        WHERE app.job_id = ?1
          AND app.rating IS NULL
          AND (?2 OR app.status != 'rejected')
        ORDER BY app.application_id ASC
        "#,
    )
    .bind(job_id)
    .bind(include_rejected)
    .fetch_all(pool)
    .await
}

pub async fn count_unrated(
    pool: &SqlitePool,
    job_id: &str,
    include_rejected: bool,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM applications
        WHERE job_id = ?1
          AND rating IS NULL
          AND (?2 OR status != 'rejected')
        "#,
    )
    .bind(job_id)
    .bind(include_rejected)
    .fetch_one(pool)
    .await
}

/// Writes a validated rating. Returns the number of rows touched.
pub async fn update_rating(
    pool: &SqlitePool,
    applicant_id: &str,
    job_id: &str,
    result: &RatingResult,
) -> Result<u64, sqlx::Error> {
    let written = sqlx::query(
        r#"
        UPDATE applications
        SET rating = ?1,
            rating_detail = ?2,
            rated_at = CURRENT_TIMESTAMP
        WHERE applicant_id = ?3 AND job_id = ?4
        "#,
    )
    .bind(i64::from(result.rating))
    .bind(Json(result.detail()))
    .bind(applicant_id)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(written.rows_affected())
}

/// Rated applications, best first. Ties go to the earlier application.
pub async fn ranked_applicants(
    pool: &SqlitePool,
    job_id: &str,
    limit: i64,
    include_rejected: bool,
) -> Result<Vec<RankedRow>, sqlx::Error> {
    sqlx::query_as::<_, RankedRow>(
        r#"
        SELECT app.applicant_id, a.name, app.rating
        FROM applications app
        JOIN applicants a ON a.applicant_id = app.applicant_id
        WHERE app.job_id = ?1
          AND app.rating IS NOT NULL
          AND (?2 OR app.status != 'rejected')
        ORDER BY app.rating DESC, app.application_id ASC
        LIMIT ?3
        "#,
    )
    .bind(job_id)
    .bind(include_rejected)
    .bind(limit)
    .fetch_all(pool)
    .await
}
