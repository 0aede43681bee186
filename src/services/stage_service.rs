use sqlx::PgPool;

use crate::dto::application_dto::CreateStagePayload;
use crate::error::{Error, Result};
use crate::models::pipeline_stage::PipelineStage;

const STAGE_COLUMNS: &str = "id, name, stage_order, color, is_default, created_by, created_at";
const DEFAULT_COLOR: &str = "#3b82f6";

#[derive(Clone)]
pub struct StageService {
    pool: PgPool,
}

impl StageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<PipelineStage>> {
        let stages = sqlx::query_as::<_, PipelineStage>(&format!(
            "SELECT {} FROM pipeline_stages ORDER BY stage_order ASC, id ASC",
            STAGE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(stages)
    }

    pub async fn get(&self, id: i32) -> Result<PipelineStage> {
        sqlx::query_as::<_, PipelineStage>(&format!(
            "SELECT {} FROM pipeline_stages WHERE id = $1",
            STAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Pipeline stage not found".into()))
    }

    /// Custom stages go to the end of the pipeline unless an order is given.
    pub async fn create(&self, payload: &CreateStagePayload, created_by: i32) -> Result<PipelineStage> {
        let stage = sqlx::query_as::<_, PipelineStage>(&format!(
            r#"
            INSERT INTO pipeline_stages (name, stage_order, color, is_default, created_by)
            VALUES (
                $1,
                COALESCE($2, (SELECT COALESCE(MAX(stage_order), 0) + 1 FROM pipeline_stages)),
                $3,
                FALSE,
                $4
            )
            RETURNING {}
            "#,
            STAGE_COLUMNS
        ))
        .bind(payload.name.trim())
        .bind(payload.order)
        .bind(payload.color.as_deref().unwrap_or(DEFAULT_COLOR))
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(stage_id = stage.id, order = stage.stage_order, "Pipeline stage created");
        Ok(stage)
    }
}
