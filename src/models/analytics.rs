use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalytics {
    pub id: i32,
    pub job_id: i32,
    pub views: i32,
    pub apply_clicks: i32,
    pub conversion_rate: Decimal,
    pub ai_score: Option<i32>,
    pub ai_model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalyticsSummary {
    pub job_id: i32,
    pub title: String,
    pub is_active: bool,
    pub views: i32,
    pub apply_clicks: i32,
    pub conversion_rate: Decimal,
}
