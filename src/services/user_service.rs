use sqlx::PgPool;

use crate::dto::auth_dto::{LoginPayload, RegisterPayload};
use crate::error::{Error, Result};
use crate::models::user::{Role, User};
use crate::utils::crypto::{hash_password, verify_password};

const USER_COLUMNS: &str = "id, username, password_hash, first_name, last_name, role, created_at, updated_at";

/// Roles a caller may pick for themselves at registration.
pub fn self_service_role(requested: Option<Role>) -> Result<Role> {
    match requested.unwrap_or(Role::Candidate) {
        Role::Admin => Err(Error::field("role", "Role must be candidate or recruiter")),
        role => Ok(role),
    }
}

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<User> {
        let role = self_service_role(payload.role)?;
        let username = payload.username.trim().to_lowercase();

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(&username)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Err(Error::Conflict("Username is already registered".into()));
        }

        let password_hash = hash_password(&payload.password)?;
        let user = self
            .insert(
                &username,
                &password_hash,
                payload.first_name.as_deref(),
                payload.last_name.as_deref(),
                role,
            )
            .await?;
        tracing::info!(user_id = user.id, role = %user.role, "User registered");
        Ok(user)
    }

    async fn insert(
        &self,
        username: &str,
        password_hash: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        role: Role,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash, first_name, last_name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(username)
        .bind(password_hash)
        .bind(first_name)
        .bind(last_name)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Conflict("Username is already registered".into())
            }
            other => other.into(),
        })?;
        Ok(user)
    }

    /// Unknown usernames and wrong passwords are indistinguishable to the caller.
    pub async fn login(&self, payload: &LoginPayload) -> Result<User> {
        let username = payload.username.trim().to_lowercase();
        let user = self.find_by_username(&username).await?;
        match user {
            Some(user) if verify_password(&payload.password, &user.password_hash) => Ok(user),
            _ => {
                tracing::debug!(username = %username, "Login rejected");
                Err(Error::Unauthorized("Invalid username or password".into()))
            }
        }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get(&self, id: i32) -> Result<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("User not found".into()))
    }

    pub async fn change_role(&self, id: i32, role: Role) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("User not found".into()))?;
        tracing::info!(user_id = id, role = %role, "User role changed");
        Ok(user)
    }

    /// Creates the bootstrap admin when it does not exist yet. An existing
    /// account keeps its password and is promoted to admin.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<User> {
        let username = username.trim().to_lowercase();
        if let Some(existing) = self.find_by_username(&username).await? {
            if existing.role == Role::Admin {
                return Ok(existing);
            }
            tracing::warn!(user_id = existing.id, "Promoting bootstrap user to admin");
            return self.change_role(existing.id, Role::Admin).await;
        }
        let password_hash = hash_password(password)?;
        let user = self
            .insert(&username, &password_hash, None, None, Role::Admin)
            .await?;
        tracing::info!(user_id = user.id, "Bootstrap admin created");
        Ok(user)
    }
}
