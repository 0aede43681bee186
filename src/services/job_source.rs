use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use sqlx::PgPool;
use url::Url;

use crate::dto::job_dto::{JobListQuery, JobListResponse, Pagination};
use crate::error::{Error, Result};
use crate::models::job::{Job, JobStatus, JobType};

pub(crate) const JOB_COLUMNS: &str = "id, title, location, job_type, description, skills, deadline, posted_by, status, is_active, expires_at, review_comments, reviewed_by, reviewed_at, created_at, updated_at";

/// Backing store for the public job listing and lookup.
#[async_trait]
pub trait JobSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether lookups refer to local rows that analytics can be attached to.
    fn is_local(&self) -> bool;

    async fn list(&self, query: &JobListQuery) -> Result<JobListResponse>;

    async fn get(&self, id: i32) -> Result<Option<Job>>;
}

/// `ILIKE` pattern matching `value` anywhere, with wildcards in the input escaped.
pub fn contains_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub struct LocalJobSource {
    pool: PgPool,
}

impl LocalJobSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LISTING_FILTER: &str = r#"
    is_active = TRUE
    AND ($1::text IS NULL OR location ILIKE $1)
    AND ($2::text IS NULL OR job_type = $2)
    AND ($3::text IS NULL OR title ILIKE $3 OR description ILIKE $3)
    AND ($4::text[] IS NULL OR skills && $4)
"#;

#[async_trait]
impl JobSource for LocalJobSource {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn list(&self, query: &JobListQuery) -> Result<JobListResponse> {
        let location = query.location_filter().map(|l| contains_pattern(&l));
        let job_type = query.job_type.map(|t| t.as_str());
        let search = query.search_filter().map(|s| contains_pattern(&s));
        let skills = query.skill_list();

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM jobs WHERE {}",
            LISTING_FILTER
        ))
        .bind(&location)
        .bind(job_type)
        .bind(&search)
        .bind(&skills)
        .fetch_one(&self.pool)
        .await?;

        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE {} ORDER BY created_at DESC, id DESC LIMIT $5 OFFSET $6",
            JOB_COLUMNS, LISTING_FILTER
        ))
        .bind(&location)
        .bind(job_type)
        .bind(&search)
        .bind(&skills)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(JobListResponse {
            jobs,
            pagination: Pagination::new(query.page(), query.limit(), total),
        })
    }

    async fn get(&self, id: i32) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }
}

fn deserialize_id_flexible<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i32),
        String(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(i) => Ok(i),
        IntOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("Invalid job id: {}", s))),
    }
}

/// Posting as published by the remote board.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJob {
    #[serde(deserialize_with = "deserialize_id_flexible")]
    pub id: i32,
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub deadline: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteJob {
    /// Remote postings are read-only mirrors: always approved and active, with
    /// no local poster.
    pub fn into_job(self) -> Job {
        let job_type = self
            .job_type
            .as_deref()
            .and_then(|t| t.parse::<JobType>().ok())
            .unwrap_or(JobType::FullTime);
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Job {
            id: self.id,
            title: self.title,
            location: self.location,
            job_type,
            description: self.description,
            skills: self.skills,
            deadline: self.deadline,
            posted_by: 0,
            status: JobStatus::Approved,
            is_active: true,
            expires_at: None,
            review_comments: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteJobPage {
    jobs: Vec<RemoteJob>,
    #[serde(default)]
    total: Option<i64>,
}

pub struct RemoteJobSource {
    client: Client,
    base_url: Url,
}

impl RemoteJobSource {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid REMOTE_JOBS_URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn listing_url(&self, query: &JobListQuery) -> Result<Url> {
        let mut url = self
            .base_url
            .join("jobs")
            .map_err(|e| Error::Internal(format!("Failed to build remote url: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &query.page().to_string());
            pairs.append_pair("limit", &query.limit().to_string());
            if let Some(location) = query.location_filter() {
                pairs.append_pair("location", &location);
            }
            if let Some(job_type) = query.job_type {
                pairs.append_pair("type", job_type.as_str());
            }
            if let Some(search) = query.search_filter() {
                pairs.append_pair("search", &search);
            }
            if let Some(skills) = query.skill_list() {
                pairs.append_pair("skills", &skills.join(","));
            }
        }
        Ok(url)
    }

    fn detail_url(&self, id: i32) -> Result<Url> {
        self.base_url
            .join(&format!("jobs/{}", id))
            .map_err(|e| Error::Internal(format!("Failed to build remote url: {}", e)))
    }
}

#[async_trait]
impl JobSource for RemoteJobSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn list(&self, query: &JobListQuery) -> Result<JobListResponse> {
        let url = self.listing_url(query)?;
        tracing::debug!(%url, "Fetching remote job listing");
        let page = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<RemoteJobPage>()
            .await?;
        let total = page.total.unwrap_or(page.jobs.len() as i64);
        let jobs = page.jobs.into_iter().map(RemoteJob::into_job).collect();
        Ok(JobListResponse {
            jobs,
            pagination: Pagination::new(query.page(), query.limit(), total),
        })
    }

    async fn get(&self, id: i32) -> Result<Option<Job>> {
        let url = self.detail_url(id)?;
        tracing::info!(%url, "Fetching remote job");
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let job = response.error_for_status()?.json::<RemoteJob>().await?;
        Ok(Some(job.into_job()))
    }
}
