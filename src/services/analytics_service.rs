use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::models::analytics::{JobAnalytics, JobAnalyticsSummary};

const ANALYTICS_COLUMNS: &str = "id, job_id, views, apply_clicks, conversion_rate, ai_score, ai_model_version, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    View,
    ApplyClick,
}

/// `apply_clicks / views * 100`, two decimals, `0.00` while there are no views.
pub fn conversion_rate(views: i64, apply_clicks: i64) -> Decimal {
    if views <= 0 {
        return Decimal::new(0, 2);
    }
    let mut rate = (Decimal::from(apply_clicks) * Decimal::from(100) / Decimal::from(views))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rate.rescale(2);
    rate
}

#[derive(Clone)]
pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_view(&self, job_id: i32) -> Result<JobAnalytics> {
        self.increment(job_id, Counter::View).await
    }

    pub async fn record_apply_click(&self, job_id: i32) -> Result<JobAnalytics> {
        self.increment(job_id, Counter::ApplyClick).await
    }

    /// Update the existing row first; on a miss insert it, and if a concurrent
    /// first event won the insert, fall back to the update again. The rate is
    /// computed in the same statement as the counter so it never lags.
    pub async fn increment(&self, job_id: i32, counter: Counter) -> Result<JobAnalytics> {
        if let Some(row) = self.try_update(job_id, counter).await? {
            return Ok(row);
        }

        let (views, clicks) = match counter {
            Counter::View => (1, 0),
            Counter::ApplyClick => (0, 1),
        };
        let inserted = sqlx::query_as::<_, JobAnalytics>(&format!(
            r#"
            INSERT INTO job_analytics (job_id, views, apply_clicks, conversion_rate)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO NOTHING
            RETURNING {}
            "#,
            ANALYTICS_COLUMNS
        ))
        .bind(job_id)
        .bind(views)
        .bind(clicks)
        .bind(conversion_rate(views as i64, clicks as i64))
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = inserted {
            tracing::debug!(job_id, ?counter, "Created analytics row");
            return Ok(row);
        }

        tracing::debug!(job_id, ?counter, "Analytics row created concurrently, retrying update");
        self.try_update(job_id, counter).await?.ok_or_else(|| {
            Error::Internal(format!("Analytics row for job {} vanished during increment", job_id))
        })
    }

    async fn try_update(&self, job_id: i32, counter: Counter) -> Result<Option<JobAnalytics>> {
        let set_clause = match counter {
            Counter::View => {
                "views = views + 1,
                 conversion_rate = ROUND(apply_clicks::numeric * 100 / (views + 1), 2)"
            }
            Counter::ApplyClick => {
                "apply_clicks = apply_clicks + 1,
                 conversion_rate = CASE WHEN views = 0 THEN 0.00
                                        ELSE ROUND((apply_clicks + 1)::numeric * 100 / views, 2) END"
            }
        };
        let row = sqlx::query_as::<_, JobAnalytics>(&format!(
            "UPDATE job_analytics SET {}, updated_at = NOW() WHERE job_id = $1 RETURNING {}",
            set_clause, ANALYTICS_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_for_job(&self, job_id: i32) -> Result<Option<JobAnalytics>> {
        let row = sqlx::query_as::<_, JobAnalytics>(&format!(
            "SELECT {} FROM job_analytics WHERE job_id = $1",
            ANALYTICS_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Per-job counters; `poster` narrows to one recruiter's jobs.
    pub async fn summaries(&self, poster: Option<i32>) -> Result<Vec<JobAnalyticsSummary>> {
        let rows = sqlx::query_as::<_, JobAnalyticsSummary>(
            r#"
            SELECT j.id AS job_id,
                   j.title,
                   j.is_active,
                   COALESCE(a.views, 0) AS views,
                   COALESCE(a.apply_clicks, 0) AS apply_clicks,
                   COALESCE(a.conversion_rate, 0.00) AS conversion_rate
            FROM jobs j
            LEFT JOIN job_analytics a ON a.job_id = j.id
            WHERE ($1::int IS NULL OR j.posted_by = $1)
            ORDER BY j.created_at DESC
            "#,
        )
        .bind(poster)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_views_reads_as_zero_point_zero_zero() {
        assert_eq!(conversion_rate(0, 0).to_string(), "0.00");
        assert_eq!(conversion_rate(0, 4).to_string(), "0.00");
    }

    #[test]
    fn rate_is_rounded_to_two_decimals() {
        assert_eq!(conversion_rate(3, 1).to_string(), "33.33");
        assert_eq!(conversion_rate(3, 2).to_string(), "66.67");
        assert_eq!(conversion_rate(4, 1).to_string(), "25.00");
        assert_eq!(conversion_rate(8, 1).to_string(), "12.50");
        assert_eq!(conversion_rate(200, 1).to_string(), "0.50");
    }

    #[test]
    fn rate_matches_any_interleaving_of_events() {
        // Applying the events in either order must land on the same final rate.
        let events = [Counter::View, Counter::ApplyClick, Counter::View, Counter::View];
        let mut forward = (0i64, 0i64);
        for event in events {
            match event {
                Counter::View => forward.0 += 1,
                Counter::ApplyClick => forward.1 += 1,
            }
        }
        let mut backward = (0i64, 0i64);
        for event in events.iter().rev() {
            match event {
                Counter::View => backward.0 += 1,
                Counter::ApplyClick => backward.1 += 1,
            }
        }
        assert_eq!(
            conversion_rate(forward.0, forward.1),
            conversion_rate(backward.0, backward.1)
        );
        assert_eq!(conversion_rate(forward.0, forward.1).to_string(), "33.33");
    }
}
