use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    dto::{
        application_dto::{
            BulkStatusPayload, BulkUpdateResponse, InterviewPayload, MoveStagePayload, NotePayload,
            RatingPayload, UpdateStatusPayload,
        },
        template_dto::{SendEmailPayload, SendEmailResponse},
    },
    error::Result,
    middleware::auth::AuthUser,
    utils::validation::ValidatedJson,
    AppState,
};

pub async fn get_application(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let application = state.application_service.get(id, &user).await?;
    Ok(Json(application))
}

pub async fn my_applications(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let applications = state.application_service.list_own(&user.username).await?;
    Ok(Json(applications))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<UpdateStatusPayload>,
) -> Result<impl IntoResponse> {
    let application = state
        .application_service
        .update_status(id, &payload, &user)
        .await?;
    state
        .notification_service
        .status_changed(application.id, application.status)
        .await;
    Ok(Json(application))
}

pub async fn bulk_update_status(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<BulkStatusPayload>,
) -> Result<impl IntoResponse> {
    let updated = state
        .application_service
        .bulk_update_status(&payload, &user)
        .await?;
    let ids: BTreeSet<i32> = payload.application_ids.iter().copied().collect();
    for id in ids {
        state
            .notification_service
            .status_changed(id, payload.status)
            .await;
    }
    Ok(Json(BulkUpdateResponse { updated }))
}

pub async fn mark_viewed(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let application = state.application_service.mark_viewed(id, &user).await?;
    Ok(Json(application))
}

pub async fn mark_downloaded(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let application = state.application_service.mark_downloaded(id, &user).await?;
    Ok(Json(application))
}

pub async fn move_stage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<MoveStagePayload>,
) -> Result<impl IntoResponse> {
    let (application, stage) = state
        .application_service
        .move_stage(id, &payload, &user)
        .await?;
    state
        .notification_service
        .stage_changed(application.id, &stage.name)
        .await;
    Ok(Json(application))
}

pub async fn stage_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let history = state.application_service.stage_history(id, &user).await?;
    Ok(Json(history))
}

pub async fn schedule_interview(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<InterviewPayload>,
) -> Result<impl IntoResponse> {
    let application = state
        .application_service
        .schedule_interview(id, &payload, &user)
        .await?;
    // Invites only go out when this request carried the full schedule.
    if payload.is_complete() {
        state
            .notification_service
            .interview_scheduled(application.id)
            .await;
    }
    Ok(Json(application))
}

pub async fn list_notes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let notes = state.application_service.list_notes(id, &user).await?;
    Ok(Json(notes))
}

pub async fn add_note(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<NotePayload>,
) -> Result<impl IntoResponse> {
    let note = state
        .application_service
        .add_note(id, &payload.note, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn set_rating(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<RatingPayload>,
) -> Result<impl IntoResponse> {
    let application = state
        .application_service
        .set_rating(id, payload.rating, &user)
        .await?;
    Ok(Json(application))
}

pub async fn send_email(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<SendEmailPayload>,
) -> Result<impl IntoResponse> {
    state.application_service.get(id, &user).await?;
    let notification_id = state
        .notification_service
        .send_templated_email(id, payload.template_id, &payload.variables)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SendEmailResponse { notification_id })))
}

pub async fn withdraw(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    state.application_service.withdraw(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
