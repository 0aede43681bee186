pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sqlx::PgPool;

use crate::config::{Config, JobSourceKind};
use crate::error::{Error, Result};
use crate::middleware::rate_limit::KeyedRateLimiter;
use crate::services::{
    analytics_service::AnalyticsService,
    application_service::ApplicationService,
    job_service::JobService,
    job_source::{JobSource, LocalJobSource, RemoteJobSource},
    mail_transport::MailTransport,
    maintenance_service::MaintenanceService,
    notification_service::NotificationService,
    profile_service::ProfileService,
    resume_store::ResumeStore,
    stage_service::StageService,
    template_service::TemplateService,
    user_service::UserService,
};

/// Shared HTTP client for outbound calls (remote job board, mail API).
pub fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub user_service: UserService,
    pub profile_service: ProfileService,
    pub job_service: JobService,
    pub job_source: Arc<dyn JobSource>,
    pub application_service: ApplicationService,
    pub stage_service: StageService,
    pub template_service: TemplateService,
    pub notification_service: NotificationService,
    pub analytics_service: AnalyticsService,
    pub maintenance_service: MaintenanceService,
    pub resume_store: ResumeStore,
    pub application_limiter: KeyedRateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: Arc<Config>, mail_transport: Arc<dyn MailTransport>) -> Result<Self> {
        let job_source: Arc<dyn JobSource> = match config.job_source {
            JobSourceKind::Local => Arc::new(LocalJobSource::new(pool.clone())),
            JobSourceKind::Remote => {
                let url = config.remote_jobs_url.as_deref().ok_or_else(|| {
                    Error::Config("REMOTE_JOBS_URL is required for JOB_SOURCE=remote".into())
                })?;
                Arc::new(RemoteJobSource::new(http_client()?, url)?)
            }
        };
        tracing::info!(job_source = job_source.name(), "Job source selected");

        Ok(Self {
            user_service: UserService::new(pool.clone()),
            profile_service: ProfileService::new(pool.clone()),
            job_service: JobService::new(pool.clone(), config.job_posts_per_day),
            job_source,
            application_service: ApplicationService::new(pool.clone()),
            stage_service: StageService::new(pool.clone()),
            template_service: TemplateService::new(pool.clone()),
            notification_service: NotificationService::new(
                pool.clone(),
                mail_transport,
                config.mail_from.clone(),
                config.email_automation_enabled,
            ),
            analytics_service: AnalyticsService::new(pool.clone()),
            maintenance_service: MaintenanceService::new(pool.clone()),
            resume_store: ResumeStore::new(&config.uploads_dir, &config.public_base_url),
            application_limiter: KeyedRateLimiter::per_hour("applications", config.applications_per_hour),
            pool,
            config,
        })
    }
}
