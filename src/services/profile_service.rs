use sqlx::PgPool;

use crate::dto::auth_dto::ProfilePayload;
use crate::error::Result;
use crate::models::profile::UserProfile;

const PROFILE_COLUMNS: &str = "id, user_id, bio, skills, linkedin, location, created_at, updated_at";

#[derive(Clone)]
pub struct ProfileService {
    pool: PgPool,
}

impl ProfileService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i32) -> Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM user_profiles WHERE user_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    /// Replaces the caller's profile, creating it on first save.
    pub async fn upsert(&self, user_id: i32, payload: &ProfilePayload) -> Result<UserProfile> {
        let skills: Vec<String> = payload.skills.iter().map(|s| s.trim().to_string()).collect();
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO user_profiles (user_id, bio, skills, linkedin, location)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET bio = EXCLUDED.bio,
                skills = EXCLUDED.skills,
                linkedin = EXCLUDED.linkedin,
                location = EXCLUDED.location,
                updated_at = NOW()
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(&payload.bio)
        .bind(&skills)
        .bind(&payload.linkedin)
        .bind(&payload.location)
        .fetch_one(&self.pool)
        .await?;
        tracing::debug!(user_id, "Profile saved");
        Ok(profile)
    }
}
