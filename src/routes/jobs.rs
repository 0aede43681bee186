use std::net::SocketAddr;

use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use validator::Validate;

use crate::{
    dto::{
        application_dto::{ApplicationForm, ApplyResponse},
        job_dto::{AdminJobQuery, CreateJobPayload, JobActivePayload, JobListQuery, ReviewJobPayload},
    },
    error::{field_errors, Error, FieldError, Result},
    middleware::{auth::AuthUser, rate_limit::client_ip},
    services::resume_store::validate_resume,
    utils::validation::{query_rejection, ValidatedJson},
    AppState,
};

/// Request cap for the multipart apply route; the resume itself is capped lower.
pub const APPLY_BODY_LIMIT: usize = 6 * 1024 * 1024;

#[utoipa::path(
    get,
    path = "/api/jobs",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("limit" = Option<i64>, Query, description = "Items per page, default 10, max 50"),
        ("location" = Option<String>, Query, description = "Case-insensitive location substring"),
        ("type" = Option<String>, Query, description = "full-time, part-time, contract or remote"),
        ("search" = Option<String>, Query, description = "Substring of title or description"),
        ("skills" = Option<String>, Query, description = "Comma-separated skills, any overlap matches")
    ),
    responses(
        (status = 200, description = "Active jobs, newest first, with pagination"),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    query: std::result::Result<Query<JobListQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(query_rejection)?;
    let page = state.job_source.list(&query).await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = i32, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job found"),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i32>) -> Result<impl IntoResponse> {
    let job = state
        .job_source
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound("Job not found".into()))?;

    if state.job_source.is_local() {
        if let Err(err) = state.analytics_service.record_view(job.id).await {
            tracing::warn!(job_id = job.id, error = %err, "Failed to record job view");
        }
    }
    Ok(Json(job))
}

#[utoipa::path(
    post,
    path = "/api/jobs",
    responses(
        (status = 201, description = "Job submitted for review"),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not a recruiter"),
        (status = 429, description = "Daily posting limit reached")
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateJobPayload>,
) -> Result<impl IntoResponse> {
    let job = state.job_service.submit(&user, &payload).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn my_jobs(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let jobs = state.job_service.list_own(user.id).await?;
    Ok(Json(jobs))
}

#[utoipa::path(
    patch,
    path = "/api/jobs/{id}/status",
    params(("id" = i32, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Visibility updated"),
        (status = 403, description = "Caller does not own the job"),
        (status = 404, description = "Job not found")
    )
)]
pub async fn set_job_active(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<JobActivePayload>,
) -> Result<impl IntoResponse> {
    let job = state.job_service.set_active(id, payload.is_active, &user).await?;
    Ok(Json(job))
}

pub async fn job_applications(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let applications = state.application_service.list_for_job(id, &user).await?;
    Ok(Json(applications))
}

pub async fn admin_list_jobs(
    State(state): State<AppState>,
    query: std::result::Result<Query<AdminJobQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(query_rejection)?;
    let jobs = state.job_service.list_all(query.status).await?;
    Ok(Json(jobs))
}

#[utoipa::path(
    patch,
    path = "/api/admin/jobs/{id}/review",
    params(("id" = i32, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Review recorded"),
        (status = 400, description = "Decision must be approved or declined"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Job not found")
    )
)]
pub async fn review_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<ReviewJobPayload>,
) -> Result<impl IntoResponse> {
    let job = state.job_service.review(id, &payload, user.id).await?;
    Ok(Json(job))
}

struct ResumeUpload {
    file_name: String,
    data: Bytes,
}

/// Reads the apply form. Text fields are accepted in camelCase or snake_case.
async fn read_application_form(multipart: &mut Multipart) -> Result<(ApplicationForm, Option<ResumeUpload>)> {
    let mut form = ApplicationForm::default();
    let mut resume = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => form.name = field.text().await?,
            "email" => form.email = field.text().await?,
            "phone" => form.phone = field.text().await?,
            "coverLetter" | "cover_letter" => form.cover_letter = Some(field.text().await?),
            "resume" => {
                let file_name = field.file_name().unwrap_or("resume").to_string();
                let data = field.bytes().await?;
                resume = Some(ResumeUpload { file_name, data });
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }
    form.normalize();
    Ok((form, resume))
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/apply",
    params(("id" = i32, Path, description = "Job ID")),
    responses(
        (status = 201, description = "Application submitted"),
        (status = 400, description = "Invalid form or resume"),
        (status = 404, description = "Job not found"),
        (status = 429, description = "Too many applications from this address"),
        (status = 503, description = "Resume storage unavailable")
    )
)]
pub async fn apply(
    State(state): State<AppState>,
    Path(job_id): Path<i32>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let (form, resume) = read_application_form(&mut multipart).await?;

    let mut details: Vec<FieldError> = match form.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => field_errors(&errors),
    };
    match &resume {
        None => details.push(FieldError::new("resume", "Resume file is required")),
        Some(upload) => {
            if let Err(Error::InvalidFields(resume_errors)) = validate_resume(&upload.file_name, &upload.data) {
                details.extend(resume_errors);
            }
        }
    }
    let resume = match resume {
        Some(upload) if details.is_empty() => upload,
        _ => {
            details.sort_by(|a, b| a.field.cmp(&b.field));
            return Err(Error::InvalidFields(details));
        }
    };

    let ip = client_ip(&headers, connect_info.as_ref());
    state.application_limiter.check(&ip)?;

    state.job_service.get(job_id).await?;

    let resume_url = state.resume_store.save(&resume.data).await?;
    let application = state
        .application_service
        .submit(job_id, &form, &resume_url)
        .await?;

    if let Err(err) = state.analytics_service.record_apply_click(job_id).await {
        tracing::warn!(job_id, error = %err, "Failed to record apply click");
    }
    state
        .notification_service
        .application_received(application.id)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(ApplyResponse {
            application_id: application.id,
        }),
    ))
}
