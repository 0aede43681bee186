use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    dto::auth_dto::{AuthResponse, ChangeRolePayload, LoginPayload, RegisterPayload},
    error::Result,
    middleware::auth::{issue_token, AuthUser},
    utils::validation::ValidatedJson,
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterPayload>,
) -> Result<impl IntoResponse> {
    let user = state.user_service.register(&payload).await?;
    let token = issue_token(&state.config, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginPayload>,
) -> Result<impl IntoResponse> {
    let user = state.user_service.login(&payload).await?;
    let token = issue_token(&state.config, &user)?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(AuthResponse { token, user }))
}

pub async fn current_user(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let user = state.user_service.get(user.id).await?;
    Ok(Json(user))
}

pub async fn change_role(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<i32>,
    ValidatedJson(payload): ValidatedJson<ChangeRolePayload>,
) -> Result<impl IntoResponse> {
    let user = state.user_service.change_role(id, payload.role).await?;
    tracing::info!(admin_id = admin.id, user_id = id, role = %payload.role, "Role changed by admin");
    Ok(Json(user))
}
