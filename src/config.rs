use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSourceKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTransportKind {
    Log,
    Http,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub public_rps: u32,
    pub uploads_dir: String,
    pub public_base_url: String,
    pub job_source: JobSourceKind,
    pub remote_jobs_url: Option<String>,
    pub email_automation_enabled: bool,
    pub mail_transport: MailTransportKind,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub job_posts_per_day: u32,
    pub applications_per_hour: u32,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let job_source = match get_env_or("JOB_SOURCE", "local").to_lowercase().as_str() {
            "local" => JobSourceKind::Local,
            "remote" => JobSourceKind::Remote,
            other => {
                return Err(Error::Config(format!(
                    "Invalid value for JOB_SOURCE: {} (expected local or remote)",
                    other
                )))
            }
        };
        let mail_transport = match get_env_or("MAIL_TRANSPORT", "log").to_lowercase().as_str() {
            "log" => MailTransportKind::Log,
            "http" => MailTransportKind::Http,
            other => {
                return Err(Error::Config(format!(
                    "Invalid value for MAIL_TRANSPORT: {} (expected log or http)",
                    other
                )))
            }
        };

        let config = Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            jwt_ttl_hours: get_env_parse_or("JWT_TTL_HOURS", 24)?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 50)?,
            uploads_dir: get_env_or("UPLOADS_DIR", "./uploads"),
            public_base_url: get_env_or("PUBLIC_BASE_URL", ""),
            job_source,
            remote_jobs_url: env::var("REMOTE_JOBS_URL").ok(),
            email_automation_enabled: get_env_parse_or("EMAIL_AUTOMATION_ENABLED", false)?,
            mail_transport,
            mail_api_url: env::var("MAIL_API_URL").ok(),
            mail_api_key: env::var("MAIL_API_KEY").ok(),
            mail_from: get_env_or("MAIL_FROM", "noreply@vantahire.com"),
            job_posts_per_day: get_env_parse_or("JOB_POSTS_PER_DAY", 10)?,
            applications_per_hour: get_env_parse_or("APPLICATIONS_PER_HOUR", 3)?,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        };
        config.check()?;
        Ok(config)
    }

    /// Cross-field requirements that a single variable lookup can't express.
    pub fn check(&self) -> Result<()> {
        if self.job_source == JobSourceKind::Remote && self.remote_jobs_url.is_none() {
            return Err(Error::Config(
                "REMOTE_JOBS_URL is required when JOB_SOURCE=remote".to_string(),
            ));
        }
        if self.mail_transport == MailTransportKind::Http && self.mail_api_url.is_none() {
            return Err(Error::Config(
                "MAIL_API_URL is required when MAIL_TRANSPORT=http".to_string(),
            ));
        }
        if self.jwt_secret.len() < 16 {
            return Err(Error::Config(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
