use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownVariant;

/// Jobs older than this are deactivated by the daily sweep.
pub const RETENTION_DAYS: i64 = 60;
/// Declined jobs older than this are archived by the weekly sweep.
pub const DECLINED_ARCHIVE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Remote,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "full-time",
            JobType::PartTime => "part-time",
            JobType::Contract => "contract",
            JobType::Remote => "remote",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full-time" => Ok(JobType::FullTime),
            "part-time" => Ok(JobType::PartTime),
            "contract" => Ok(JobType::Contract),
            "remote" => Ok(JobType::Remote),
            other => Err(UnknownVariant::new("job type", other)),
        }
    }
}

impl TryFrom<String> for JobType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Approved,
    Declined,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Approved => "approved",
            JobStatus::Declined => "declined",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "approved" => Ok(JobStatus::Approved),
            "declined" => Ok(JobStatus::Declined),
            other => Err(UnknownVariant::new("job status", other)),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i32,
    pub title: String,
    pub location: String,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub job_type: JobType,
    pub description: String,
    pub skills: Vec<String>,
    pub deadline: Option<NaiveDate>,
    pub posted_by: i32,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub review_comments: Option<String>,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// True once the posting has outlived the retention window, whatever its status.
    pub fn is_past_retention(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::days(RETENTION_DAYS)
    }

    pub fn is_archivable_decline(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Declined
            && now - self.created_at > Duration::days(DECLINED_ARCHIVE_DAYS)
    }
}
