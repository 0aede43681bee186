use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    dto::{
        application_dto::CreateStagePayload,
        template_dto::{CreateTemplatePayload, TemplateListQuery},
    },
    error::Result,
    middleware::auth::AuthUser,
    utils::validation::{query_rejection, ValidatedJson},
    AppState,
};

pub async fn list_stages(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stages = state.stage_service.list().await?;
    Ok(Json(stages))
}

pub async fn create_stage(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateStagePayload>,
) -> Result<impl IntoResponse> {
    let stage = state.stage_service.create(&payload, user.id).await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

pub async fn list_templates(
    State(state): State<AppState>,
    query: std::result::Result<Query<TemplateListQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(query_rejection)?;
    let templates = state.template_service.list(query.template_type).await?;
    Ok(Json(templates))
}

pub async fn create_template(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateTemplatePayload>,
) -> Result<impl IntoResponse> {
    let template = state.template_service.create(&payload, user.id).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// Recruiters see their own jobs, admins see every job.
pub async fn job_analytics(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let poster = if user.is_admin() { None } else { Some(user.id) };
    let summaries = state.analytics_service.summaries(poster).await?;
    Ok(Json(summaries))
}
