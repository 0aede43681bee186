use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub id: i32,
    pub name: String,
    #[serde(rename = "order")]
    pub stage_order: i32,
    pub color: String,
    pub is_default: bool,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStageHistory {
    pub id: i32,
    pub application_id: i32,
    pub from_stage: Option<i32>,
    pub to_stage: i32,
    pub changed_by: i32,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}
