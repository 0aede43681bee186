use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{Error, Result},
    models::user::{Role, User},
    AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub exp: usize,
}

/// The caller resolved from a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn issue_token(config: &Config, user: &User) -> Result<String> {
    let exp = Utc::now() + Duration::hours(config.jwt_ttl_hours.max(1));
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        role: user.role.as_str().to_string(),
        exp: exp.timestamp() as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
}

fn authenticate(config: &Config, req: &Request) -> Result<AuthUser> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| Error::Unauthorized("missing_authorization".into()))?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| Error::Unauthorized("bad_authorization".into()))?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("unsupported_scheme".into()))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| Error::Unauthorized("invalid_token".into()))?;

    let id = data
        .claims
        .sub
        .parse::<i32>()
        .map_err(|_| Error::Unauthorized("invalid_token".into()))?;
    let role = data
        .claims
        .role
        .parse::<Role>()
        .map_err(|_| Error::Unauthorized("invalid_token".into()))?;

    Ok(AuthUser {
        id,
        username: data.claims.username,
        role,
    })
}

fn permits(allowed: &[Role], role: Role) -> bool {
    allowed.is_empty() || allowed.contains(&role)
}

/// Reloads the caller from `users` so role changes and deleted accounts take
/// effect before the token expires.
async fn current_user(state: &AppState, claimed: &AuthUser) -> Result<AuthUser> {
    let user = state.user_service.get(claimed.id).await.map_err(|err| match err {
        Error::NotFound(_) => Error::Unauthorized("unknown_user".into()),
        other => other,
    })?;
    Ok(AuthUser {
        id: user.id,
        username: user.username,
        role: user.role,
    })
}

async fn authorize(state: &AppState, mut req: Request, next: Next, allowed: &[Role]) -> Response {
    let claimed = match authenticate(&state.config, &req) {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    // A claim that already fails the gate is rejected without a lookup.
    // Promoted users sign in again to pick up the new role.
    if !permits(allowed, claimed.role) {
        tracing::debug!(user_id = claimed.id, role = %claimed.role, "Role not permitted for route");
        return Error::Forbidden("forbidden".into()).into_response();
    }
    let user = match current_user(state, &claimed).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    if !permits(allowed, user.role) {
        tracing::info!(
            user_id = user.id,
            token_role = %claimed.role,
            role = %user.role,
            "Role changed since token was issued"
        );
        return Error::Forbidden("forbidden".into()).into_response();
    }
    req.extensions_mut().insert(user);
    next.run(req).await
}

pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[]).await
}

pub async fn require_recruiter(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[Role::Recruiter, Role::Admin]).await
}

pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[Role::Admin]).await
}

pub async fn require_candidate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[Role::Candidate]).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| Error::Unauthorized("missing_authorization".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_gate_admits_every_role() {
        assert!(permits(&[], Role::Candidate));
        assert!(permits(&[Role::Recruiter, Role::Admin], Role::Admin));
        assert!(!permits(&[Role::Recruiter, Role::Admin], Role::Candidate));
        assert!(!permits(&[Role::Candidate], Role::Recruiter));
    }
}
