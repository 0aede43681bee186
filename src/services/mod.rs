pub mod access;
pub mod analytics_service;
pub mod application_service;
pub mod job_service;
pub mod job_source;
pub mod mail_transport;
pub mod maintenance_service;
pub mod notification_service;
pub mod profile_service;
pub mod resume_store;
pub mod stage_service;
pub mod template_service;
pub mod user_service;
