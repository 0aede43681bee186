use axum::{
    extract::State,
    response::{IntoResponse, Json},
};

use crate::{
    dto::auth_dto::ProfilePayload,
    error::{Error, Result},
    middleware::auth::AuthUser,
    utils::validation::ValidatedJson,
    AppState,
};

pub async fn get_profile(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let profile = state
        .profile_service
        .get(user.id)
        .await?
        .ok_or_else(|| Error::NotFound("Profile not found".into()))?;
    Ok(Json(profile))
}

pub async fn save_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<ProfilePayload>,
) -> Result<impl IntoResponse> {
    let profile = state.profile_service.upsert(user.id, &payload).await?;
    Ok(Json(profile))
}
