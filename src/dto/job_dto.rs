use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::job::{Job, JobStatus, JobType};
use crate::utils::validation::validate_skills;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateJobPayload {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Location must be between 1 and 100 characters"))]
    pub location: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[validate(length(
        min = 10,
        max = 5000,
        message = "Description must be between 10 and 5000 characters"
    ))]
    pub description: String,
    #[serde(default)]
    #[validate(custom(function = "validate_skills"))]
    pub skills: Vec<String>,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReviewJobPayload {
    pub status: JobStatus,
    #[validate(length(max = 1000, message = "Review comments must be at most 1000 characters"))]
    pub review_comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobActivePayload {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct JobListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<JobType>,
    pub search: Option<String>,
    /// Comma-separated; a job matches when it shares at least one skill.
    pub skills: Option<String>,
}

impl JobListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 50)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    pub fn skill_list(&self) -> Option<Vec<String>> {
        let skills: Vec<String> = self
            .skills
            .as_deref()?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if skills.is_empty() {
            None
        } else {
            Some(skills)
        }
    }

    fn non_blank(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn location_filter(&self) -> Option<String> {
        Self::non_blank(&self.location)
    }

    pub fn search_filter(&self) -> Option<String> {
        Self::non_blank(&self.search)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdminJobQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "title": "Backend Engineer",
            "location": "Berlin",
            "type": "full-time",
            "description": "Own the application pipeline services.",
            "skills": ["rust", "postgres"]
        })
    }

    #[test]
    fn valid_job_payload_passes() {
        let job: CreateJobPayload = serde_json::from_value(payload()).unwrap();
        assert_eq!(job.job_type, JobType::FullTime);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn field_limits_are_enforced() {
        let mut value = payload();
        value["title"] = serde_json::json!("x".repeat(101));
        value["description"] = serde_json::json!("too short");
        let job: CreateJobPayload = serde_json::from_value(value).unwrap();
        let errors = job.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("description"));
    }

    #[test]
    fn unknown_type_and_fields_are_rejected() {
        let mut value = payload();
        value["type"] = serde_json::json!("freelance");
        assert!(serde_json::from_value::<CreateJobPayload>(value).is_err());

        let mut value = payload();
        value["salary"] = serde_json::json!(100);
        assert!(serde_json::from_value::<CreateJobPayload>(value).is_err());
    }

    #[test]
    fn pagination_math() {
        let query = JobListQuery {
            page: Some(3),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(query.limit(), 50);
        assert_eq!(query.offset(), 100);
        assert_eq!(Pagination::new(1, 10, 21).total_pages, 3);
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
    }

    #[test]
    fn skills_query_is_split_and_trimmed() {
        let query = JobListQuery {
            skills: Some(" rust, ,sql ".into()),
            ..Default::default()
        };
        assert_eq!(query.skill_list(), Some(vec!["rust".to_string(), "sql".to_string()]));
        assert_eq!(JobListQuery::default().skill_list(), None);
    }
}
