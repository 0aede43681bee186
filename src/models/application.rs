use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Submitted,
    Reviewed,
    Shortlisted,
    Rejected,
    Downloaded,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Reviewed => "reviewed",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Downloaded => "downloaded",
        }
    }

    /// A candidate may pull an application back until a recruiter has
    /// shortlisted or rejected it.
    pub fn is_withdrawable(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::Reviewed | ApplicationStatus::Downloaded
        )
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(ApplicationStatus::Submitted),
            "reviewed" => Ok(ApplicationStatus::Reviewed),
            "shortlisted" => Ok(ApplicationStatus::Shortlisted),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "downloaded" => Ok(ApplicationStatus::Downloaded),
            other => Err(UnknownVariant::new("application status", other)),
        }
    }
}

impl TryFrom<String> for ApplicationStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i32,
    pub job_id: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub resume_url: String,
    pub cover_letter: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ApplicationStatus,
    pub notes: Option<String>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub current_stage: Option<i32>,
    pub stage_changed_at: Option<DateTime<Utc>>,
    pub stage_changed_by: Option<i32>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<String>,
    pub interview_location: Option<String>,
    pub interview_notes: Option<String>,
    pub rating: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationNote {
    pub id: i32,
    pub application_id: i32,
    pub author_id: Option<i32>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Candidate-facing row: the application plus the job it was filed against.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationWithJob {
    pub id: i32,
    pub job_id: i32,
    pub job_title: String,
    pub job_location: String,
    #[sqlx(try_from = "String")]
    pub status: ApplicationStatus,
    pub current_stage: Option<i32>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<String>,
    pub interview_location: Option<String>,
    pub created_at: DateTime<Utc>,
}
