use std::collections::BTreeSet;

use sqlx::PgPool;

use crate::dto::application_dto::{ApplicationForm, BulkStatusPayload, InterviewPayload, MoveStagePayload, UpdateStatusPayload};
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::application::{Application, ApplicationNote, ApplicationStatus, ApplicationWithJob};
use crate::models::pipeline_stage::{ApplicationStageHistory, PipelineStage};
use crate::services::access::{ensure_job_owner, ensure_owns_all};

const APPLICATION_COLUMNS: &str = "id, job_id, name, email, phone, resume_url, cover_letter, status, notes, last_viewed_at, downloaded_at, current_stage, stage_changed_at, stage_changed_by, interview_date, interview_time, interview_location, interview_notes, rating, created_at, updated_at";

/// Status implied by entering a stage. Stages not listed leave the status as is.
pub fn status_for_stage(stage_name: &str) -> Option<ApplicationStatus> {
    match stage_name {
        "Rejected" => Some(ApplicationStatus::Rejected),
        "Offer Extended" | "Hired" => Some(ApplicationStatus::Shortlisted),
        _ => None,
    }
}

/// Ids that were requested but have no matching row, ascending.
pub fn missing_ids(requested: &BTreeSet<i32>, found: &[i32]) -> Vec<i32> {
    requested
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect()
}

/// Candidates withdraw only their own applications (matched on email) and
/// only before a decision has been made.
pub fn check_withdrawal(candidate: &AuthUser, email: &str, status: ApplicationStatus) -> Result<()> {
    if !candidate.username.trim().eq_ignore_ascii_case(email.trim()) {
        return Err(Error::Forbidden(
            "You can only withdraw your own applications".into(),
        ));
    }
    if !status.is_withdrawable() {
        return Err(Error::Conflict(format!(
            "Applications that are {} can no longer be withdrawn",
            status
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ApplicationService {
    pool: PgPool,
}

impl ApplicationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a `submitted` application placed in the first pipeline stage.
    pub async fn submit(&self, job_id: i32, form: &ApplicationForm, resume_url: &str) -> Result<Application> {
        let cover_letter = form
            .cover_letter
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let application = sqlx::query_as::<_, Application>(&format!(
            r#"
            INSERT INTO applications (job_id, name, email, phone, resume_url, cover_letter, status, current_stage)
            VALUES (
                $1, $2, $3, $4, $5, $6, 'submitted',
                (SELECT id FROM pipeline_stages ORDER BY stage_order ASC, id ASC LIMIT 1)
            )
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(form.name.trim())
        .bind(form.email.trim())
        .bind(form.phone.trim())
        .bind(resume_url)
        .bind(cover_letter)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(application_id = application.id, job_id, "Application submitted");
        Ok(application)
    }

    async fn owner_of(&self, id: i32) -> Result<i32> {
        sqlx::query_scalar::<_, i32>(
            "SELECT j.posted_by FROM applications a JOIN jobs j ON j.id = a.job_id WHERE a.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Application not found".into()))
    }

    async fn authorize(&self, id: i32, actor: &AuthUser) -> Result<()> {
        let owner = self.owner_of(id).await?;
        ensure_job_owner(actor, owner)
    }

    async fn fetch(&self, id: i32) -> Result<Application> {
        sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM applications WHERE id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Application not found".into()))
    }

    pub async fn get(&self, id: i32, actor: &AuthUser) -> Result<Application> {
        self.authorize(id, actor).await?;
        self.fetch(id).await
    }

    pub async fn list_for_job(&self, job_id: i32, actor: &AuthUser) -> Result<Vec<Application>> {
        let owner = sqlx::query_scalar::<_, i32>("SELECT posted_by FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Job not found".into()))?;
        ensure_job_owner(actor, owner)?;

        let rows = sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM applications WHERE job_id = $1 ORDER BY created_at DESC, id DESC",
            APPLICATION_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Applications whose email matches the caller's username.
    pub async fn list_own(&self, email: &str) -> Result<Vec<ApplicationWithJob>> {
        let rows = sqlx::query_as::<_, ApplicationWithJob>(
            r#"
            SELECT a.id, a.job_id, j.title AS job_title, j.location AS job_location,
                   a.status, a.current_stage, a.interview_date, a.interview_time,
                   a.interview_location, a.created_at
            FROM applications a
            JOIN jobs j ON j.id = a.job_id
            WHERE LOWER(a.email) = LOWER($1)
            ORDER BY a.created_at DESC, a.id DESC
            "#,
        )
        .bind(email.trim())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_status(
        &self,
        id: i32,
        payload: &UpdateStatusPayload,
        actor: &AuthUser,
    ) -> Result<Application> {
        self.authorize(id, actor).await?;
        let application = sqlx::query_as::<_, Application>(&format!(
            r#"
            UPDATE applications
            SET status = $2, notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .bind(payload.status.as_str())
        .bind(&payload.notes)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(application_id = id, status = %payload.status, actor_id = actor.id, "Application status updated");
        Ok(application)
    }

    /// All-or-nothing: every id must exist and belong to the caller before
    /// the single update runs.
    pub async fn bulk_update_status(&self, payload: &BulkStatusPayload, actor: &AuthUser) -> Result<u64> {
        let requested: BTreeSet<i32> = payload.application_ids.iter().copied().collect();
        let ids: Vec<i32> = requested.iter().copied().collect();

        let owners: Vec<(i32, i32)> = sqlx::query_as(
            "SELECT a.id, j.posted_by FROM applications a JOIN jobs j ON j.id = a.job_id WHERE a.id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let found: Vec<i32> = owners.iter().map(|(id, _)| *id).collect();
        let missing = missing_ids(&requested, &found);
        if !missing.is_empty() {
            return Err(Error::NotFound(format!(
                "Applications not found: {}",
                missing
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        ensure_owns_all(actor, owners.iter().map(|(_, owner)| *owner))?;

        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = $2, notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .bind(payload.status.as_str())
        .bind(&payload.notes)
        .execute(&self.pool)
        .await?;
        tracing::info!(
            count = result.rows_affected(),
            status = %payload.status,
            actor_id = actor.id,
            "Bulk application status update"
        );
        Ok(result.rows_affected())
    }

    pub async fn mark_viewed(&self, id: i32, actor: &AuthUser) -> Result<Application> {
        self.authorize(id, actor).await?;
        let application = sqlx::query_as::<_, Application>(&format!(
            "UPDATE applications SET status = 'reviewed', last_viewed_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING {}",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(application)
    }

    pub async fn mark_downloaded(&self, id: i32, actor: &AuthUser) -> Result<Application> {
        self.authorize(id, actor).await?;
        let application = sqlx::query_as::<_, Application>(&format!(
            "UPDATE applications SET status = 'downloaded', downloaded_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING {}",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(application)
    }

    /// Moves the application to `stage_id` and writes the matching history row
    /// in one transaction. Any early return rolls both back.
    pub async fn move_stage(
        &self,
        id: i32,
        payload: &MoveStagePayload,
        actor: &AuthUser,
    ) -> Result<(Application, PipelineStage)> {
        let mut tx = self.pool.begin().await?;

        let (from_stage, owner): (Option<i32>, i32) = sqlx::query_as(
            r#"
            SELECT a.current_stage, j.posted_by
            FROM applications a
            JOIN jobs j ON j.id = a.job_id
            WHERE a.id = $1
            FOR UPDATE OF a
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Application not found".into()))?;
        ensure_job_owner(actor, owner)?;

        let stage = sqlx::query_as::<_, PipelineStage>(
            "SELECT id, name, stage_order, color, is_default, created_by, created_at FROM pipeline_stages WHERE id = $1",
        )
        .bind(payload.stage_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Pipeline stage not found".into()))?;

        let implied_status = status_for_stage(&stage.name);
        let application = sqlx::query_as::<_, Application>(&format!(
            r#"
            UPDATE applications
            SET current_stage = $2,
                stage_changed_at = NOW(),
                stage_changed_by = $3,
                status = COALESCE($4, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .bind(stage.id)
        .bind(actor.id)
        .bind(implied_status.map(|s| s.as_str()))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO application_stage_history (application_id, from_stage, to_stage, changed_by, notes)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(from_stage)
        .bind(stage.id)
        .bind(actor.id)
        .bind(&payload.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            application_id = id,
            from_stage = ?from_stage,
            to_stage = stage.id,
            actor_id = actor.id,
            "Application moved to new stage"
        );
        Ok((application, stage))
    }

    pub async fn stage_history(&self, id: i32, actor: &AuthUser) -> Result<Vec<ApplicationStageHistory>> {
        self.authorize(id, actor).await?;
        let rows = sqlx::query_as::<_, ApplicationStageHistory>(
            r#"
            SELECT id, application_id, from_stage, to_stage, changed_by, notes, changed_at
            FROM application_stage_history
            WHERE application_id = $1
            ORDER BY changed_at ASC, id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Fields absent from the request keep their stored values.
    pub async fn schedule_interview(
        &self,
        id: i32,
        payload: &InterviewPayload,
        actor: &AuthUser,
    ) -> Result<Application> {
        self.authorize(id, actor).await?;
        let application = sqlx::query_as::<_, Application>(&format!(
            r#"
            UPDATE applications
            SET interview_date = COALESCE($2, interview_date),
                interview_time = COALESCE($3, interview_time),
                interview_location = COALESCE($4, interview_location),
                interview_notes = COALESCE($5, interview_notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .bind(payload.date)
        .bind(&payload.time)
        .bind(&payload.location)
        .bind(&payload.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(application)
    }

    pub async fn add_note(&self, id: i32, note: &str, actor: &AuthUser) -> Result<ApplicationNote> {
        self.authorize(id, actor).await?;
        let note = sqlx::query_as::<_, ApplicationNote>(
            r#"
            INSERT INTO application_notes (application_id, author_id, note)
            VALUES ($1, $2, $3)
            RETURNING id, application_id, author_id, note, created_at
            "#,
        )
        .bind(id)
        .bind(actor.id)
        .bind(note.trim())
        .fetch_one(&self.pool)
        .await?;
        Ok(note)
    }

    pub async fn list_notes(&self, id: i32, actor: &AuthUser) -> Result<Vec<ApplicationNote>> {
        self.authorize(id, actor).await?;
        let notes = sqlx::query_as::<_, ApplicationNote>(
            r#"
            SELECT id, application_id, author_id, note, created_at
            FROM application_notes
            WHERE application_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    pub async fn set_rating(&self, id: i32, rating: i32, actor: &AuthUser) -> Result<Application> {
        if !(1..=5).contains(&rating) {
            return Err(Error::field("rating", "Rating must be an integer between 1 and 5"));
        }
        self.authorize(id, actor).await?;
        let application = sqlx::query_as::<_, Application>(&format!(
            "UPDATE applications SET rating = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .bind(rating)
        .fetch_one(&self.pool)
        .await?;
        Ok(application)
    }

    /// Hard delete. The status guard is repeated in the DELETE so a decision
    /// made concurrently still wins.
    pub async fn withdraw(&self, id: i32, candidate: &AuthUser) -> Result<()> {
        let (email, status): (String, String) =
            sqlx::query_as("SELECT email, status FROM applications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::NotFound("Application not found".into()))?;
        let status: ApplicationStatus = status
            .parse()
            .map_err(|e: crate::models::UnknownVariant| Error::Internal(e.to_string()))?;
        check_withdrawal(candidate, &email, status)?;

        let result = sqlx::query(
            "DELETE FROM applications WHERE id = $1 AND status IN ('submitted', 'reviewed', 'downloaded')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::Conflict(
                "Application can no longer be withdrawn".into(),
            ));
        }
        tracing::info!(application_id = id, candidate_id = candidate.id, "Application withdrawn");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn candidate(username: &str) -> AuthUser {
        AuthUser {
            id: 11,
            username: username.into(),
            role: Role::Candidate,
        }
    }

    #[test]
    fn stage_names_map_to_statuses() {
        assert_eq!(status_for_stage("Rejected"), Some(ApplicationStatus::Rejected));
        assert_eq!(status_for_stage("Offer Extended"), Some(ApplicationStatus::Shortlisted));
        assert_eq!(status_for_stage("Hired"), Some(ApplicationStatus::Shortlisted));
        assert_eq!(status_for_stage("Screening"), None);
        assert_eq!(status_for_stage("Interview Scheduled"), None);
    }

    #[test]
    fn missing_ids_are_reported_in_order() {
        let requested: BTreeSet<i32> = [5, 1, 3, 9].into_iter().collect();
        assert_eq!(missing_ids(&requested, &[3, 1]), vec![5, 9]);
        assert!(missing_ids(&requested, &[1, 3, 5, 9]).is_empty());
    }

    #[test]
    fn withdrawal_requires_matching_email() {
        let err = check_withdrawal(
            &candidate("someone@example.com"),
            "ada@example.com",
            ApplicationStatus::Submitted,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(check_withdrawal(
            &candidate("Ada@Example.com"),
            "ada@example.com",
            ApplicationStatus::Reviewed
        )
        .is_ok());
    }

    #[test]
    fn withdrawal_after_decision_conflicts() {
        for status in [ApplicationStatus::Shortlisted, ApplicationStatus::Rejected] {
            let err = check_withdrawal(&candidate("ada@example.com"), "ada@example.com", status)
                .unwrap_err();
            assert!(matches!(err, Error::Conflict(_)));
        }
    }
}
