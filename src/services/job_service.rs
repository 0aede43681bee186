use sqlx::PgPool;

use crate::dto::job_dto::{CreateJobPayload, ReviewJobPayload};
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::middleware::rate_limit::KeyedRateLimiter;
use crate::models::job::{Job, JobStatus};
use crate::services::access::ensure_job_owner;
use crate::services::job_source::JOB_COLUMNS;

#[derive(Clone)]
pub struct JobService {
    pool: PgPool,
    post_limiter: KeyedRateLimiter,
}

impl JobService {
    pub fn new(pool: PgPool, posts_per_day: u32) -> Self {
        Self {
            pool,
            post_limiter: KeyedRateLimiter::per_day("job_posts", posts_per_day),
        }
    }

    /// New postings start `pending` and active. The caller's daily quota is
    /// charged before anything is written.
    pub async fn submit(&self, poster: &AuthUser, payload: &CreateJobPayload) -> Result<Job> {
        self.post_limiter.check(&format!("user:{}", poster.id))?;

        let skills: Vec<String> = payload.skills.iter().map(|s| s.trim().to_string()).collect();
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (title, location, job_type, description, skills, deadline, posted_by, status, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', TRUE)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(payload.title.trim())
        .bind(payload.location.trim())
        .bind(payload.job_type.as_str())
        .bind(&payload.description)
        .bind(&skills)
        .bind(payload.deadline)
        .bind(poster.id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(job_id = job.id, posted_by = poster.id, "Job submitted for review");
        Ok(job)
    }

    pub async fn get(&self, id: i32) -> Result<Job> {
        sqlx::query_as::<_, Job>(&format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Job not found".into()))
    }

    /// Records the admin decision. Visibility (`is_active`) is left alone.
    pub async fn review(&self, id: i32, payload: &ReviewJobPayload, reviewer_id: i32) -> Result<Job> {
        if payload.status == JobStatus::Pending {
            return Err(Error::field("status", "Status must be approved or declined"));
        }
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = $2, review_comments = $3, reviewed_by = $4, reviewed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(payload.status.as_str())
        .bind(&payload.review_comments)
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Job not found".into()))?;

        tracing::info!(job_id = id, reviewer_id, status = job.status.as_str(), "Job reviewed");
        Ok(job)
    }

    pub async fn set_active(&self, id: i32, is_active: bool, actor: &AuthUser) -> Result<Job> {
        let job = self.get(id).await?;
        ensure_job_owner(actor, job.posted_by)?;

        let job = sqlx::query_as::<_, Job>(&format!(
            "UPDATE jobs SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(job_id = id, is_active, actor_id = actor.id, "Job visibility changed");
        Ok(job)
    }

    pub async fn list_own(&self, poster_id: i32) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE posted_by = $1 ORDER BY created_at DESC, id DESC",
            JOB_COLUMNS
        ))
        .bind(poster_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    pub async fn list_all(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC, id DESC",
            JOB_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }
}
