use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::application::ApplicationStatus;
use crate::models::email_template::TemplateType;
use crate::models::notification::OutboxEntry;
use crate::services::mail_transport::{MailTransport, OutgoingMail};
use crate::services::template_service::{ApplicationContext, TemplateService, COMPANY_NAME};

const OUTBOX_COLUMNS: &str = "id, application_id, template_type, recipient, subject, body, status, attempts, max_attempts, next_retry_at, last_error, created_at, updated_at";

/// Rows stuck in `sending` longer than this are assumed orphaned by a crash.
const STALE_SENDING_MINUTES: i32 = 10;

/// Seconds to wait before the next delivery attempt: 30s doubled per failed
/// attempt, capped at one hour.
pub fn retry_backoff_secs(attempts: i32) -> i32 {
    let exponent = (attempts.max(1) - 1).min(12) as u32;
    (30i32 * 2i32.pow(exponent)).min(3600)
}

/// Default template for a stage or status transition.
pub fn template_for_status(status: ApplicationStatus) -> TemplateType {
    match status {
        ApplicationStatus::Rejected => TemplateType::Rejection,
        _ => TemplateType::StatusUpdate,
    }
}

pub fn template_for_stage(stage_name: &str) -> TemplateType {
    match stage_name {
        "Offer Extended" => TemplateType::OfferExtended,
        "Rejected" => TemplateType::Rejection,
        _ => TemplateType::StatusUpdate,
    }
}

#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    transport: Arc<dyn MailTransport>,
    templates: TemplateService,
    from: String,
    automation_enabled: bool,
}

impl NotificationService {
    pub fn new(
        pool: PgPool,
        transport: Arc<dyn MailTransport>,
        from: String,
        automation_enabled: bool,
    ) -> Self {
        Self {
            templates: TemplateService::new(pool.clone()),
            pool,
            transport,
            from,
            automation_enabled,
        }
    }

    pub async fn enqueue(
        &self,
        application_id: Option<i32>,
        template_type: Option<TemplateType>,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notification_outbox (application_id, template_type, recipient, subject, body)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(application_id)
        .bind(template_type.map(|t| t.as_str()))
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        tracing::debug!(notification_id = %id, recipient, "Notification enqueued");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<OutboxEntry> {
        sqlx::query_as::<_, OutboxEntry>(&format!(
            "SELECT {} FROM notification_outbox WHERE id = $1",
            OUTBOX_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Notification not found".into()))
    }

    /// Renders `template_id` against the application and queues it for the
    /// candidate. Runs regardless of the automation flag.
    pub async fn send_templated_email(
        &self,
        application_id: i32,
        template_id: i32,
        variables: &HashMap<String, String>,
    ) -> Result<Uuid> {
        let context = self
            .templates
            .application_context(application_id)
            .await?
            .ok_or_else(|| Error::NotFound("Application not found".into()))?;
        let template = self.templates.get(template_id).await?;
        let email = TemplateService::compose(&template, &context, variables);
        self.enqueue(
            Some(application_id),
            Some(email.template_type),
            &context.candidate_email,
            &email.subject,
            &email.body,
        )
        .await
    }

    /// Claims the oldest due row and attempts delivery. Returns false when the
    /// queue had nothing to do.
    pub async fn run_once(&self) -> Result<bool> {
        let claimed = sqlx::query_as::<_, OutboxEntry>(&format!(
            r#"
            UPDATE notification_outbox
            SET status = 'sending', attempts = attempts + 1, updated_at = NOW()
            WHERE id = (
                SELECT id FROM notification_outbox
                WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {}
            "#,
            OUTBOX_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        let Some(entry) = claimed else { return Ok(false) };

        let mail = OutgoingMail {
            from: self.from.clone(),
            to: entry.recipient.clone(),
            subject: entry.subject.clone(),
            text: entry.body.clone(),
        };
        match self.transport.send(&mail).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE notification_outbox SET status = 'sent', last_error = NULL, updated_at = NOW() WHERE id = $1",
                )
                .bind(entry.id)
                .execute(&self.pool)
                .await?;
                tracing::info!(notification_id = %entry.id, recipient = %entry.recipient, "Notification sent");
            }
            Err(err) => self.record_failure(&entry, &err.to_string()).await?,
        }
        Ok(true)
    }

    async fn record_failure(&self, entry: &OutboxEntry, error: &str) -> Result<()> {
        if entry.attempts >= entry.max_attempts {
            sqlx::query(
                "UPDATE notification_outbox SET status = 'failed', last_error = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(entry.id)
            .bind(error)
            .execute(&self.pool)
            .await?;
            tracing::error!(
                notification_id = %entry.id,
                attempts = entry.attempts,
                error,
                "Notification failed permanently"
            );
        } else {
            let delay = retry_backoff_secs(entry.attempts);
            sqlx::query(
                r#"
                UPDATE notification_outbox
                SET status = 'pending',
                    last_error = $2,
                    next_retry_at = NOW() + ($3::int * INTERVAL '1 second'),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(entry.id)
            .bind(error)
            .bind(delay)
            .execute(&self.pool)
            .await?;
            tracing::warn!(
                notification_id = %entry.id,
                attempts = entry.attempts,
                retry_in_secs = delay,
                error,
                "Notification delivery failed, will retry"
            );
        }
        Ok(())
    }

    /// Returns rows left in `sending` by a previous process to the queue.
    pub async fn recover_stale(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'pending', updated_at = NOW()
            WHERE status = 'sending' AND updated_at < NOW() - ($1::int * INTERVAL '1 minute')
            "#,
        )
        .bind(STALE_SENDING_MINUTES)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Worker loop: drains the queue, idles briefly when it is empty.
    pub async fn run_worker(self) {
        match self.recover_stale().await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(recovered = n, "Requeued stale outbox rows"),
            Err(e) => tracing::error!(error = ?e, "Failed to recover stale outbox rows"),
        }
        loop {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(Duration::from_millis(1000)).await,
                Err(e) => {
                    tracing::error!(error = ?e, "Outbox worker error");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    pub fn automation_enabled(&self) -> bool {
        self.automation_enabled
    }

    /// Candidate confirmation plus an alert to the job owner.
    pub async fn application_received(&self, application_id: i32) {
        if !self.automation_enabled {
            return;
        }
        if let Err(err) = self
            .trigger(application_id, TemplateType::ApplicationReceived, HashMap::new())
            .await
        {
            tracing::warn!(application_id, error = %err, "Application confirmation not queued");
        }
        if let Err(err) = self.owner_alert(application_id).await {
            tracing::warn!(application_id, error = %err, "Owner alert not queued");
        }
    }

    pub async fn status_changed(&self, application_id: i32, status: ApplicationStatus) {
        if !self.automation_enabled {
            return;
        }
        let mut extra = HashMap::new();
        extra.insert("status".to_string(), status.as_str().to_string());
        if let Err(err) = self
            .trigger(application_id, template_for_status(status), extra)
            .await
        {
            tracing::warn!(application_id, status = %status, error = %err, "Status notification not queued");
        }
    }

    pub async fn stage_changed(&self, application_id: i32, stage_name: &str) {
        if !self.automation_enabled {
            return;
        }
        let mut extra = HashMap::new();
        extra.insert("status".to_string(), stage_name.to_string());
        if let Err(err) = self
            .trigger(application_id, template_for_stage(stage_name), extra)
            .await
        {
            tracing::warn!(application_id, stage = stage_name, error = %err, "Stage notification not queued");
        }
    }

    pub async fn interview_scheduled(&self, application_id: i32) {
        if !self.automation_enabled {
            return;
        }
        if let Err(err) = self
            .trigger(application_id, TemplateType::InterviewInvite, HashMap::new())
            .await
        {
            tracing::warn!(application_id, error = %err, "Interview invite not queued");
        }
    }

    async fn trigger(
        &self,
        application_id: i32,
        template_type: TemplateType,
        extra: HashMap<String, String>,
    ) -> Result<Uuid> {
        let context = self.context(application_id).await?;
        let template = self
            .templates
            .default_for(template_type)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("No {} template configured", template_type.as_str()))
            })?;
        let email = TemplateService::compose(&template, &context, &extra);
        self.enqueue(
            Some(application_id),
            Some(template_type),
            &context.candidate_email,
            &email.subject,
            &email.body,
        )
        .await
    }

    async fn owner_alert(&self, application_id: i32) -> Result<Uuid> {
        let context = self.context(application_id).await?;
        let subject = format!("New application for {}", context.job_title);
        let body = format!(
            "Hi {},\n\n{} ({}) applied to {}. Review the application in your {} dashboard.",
            context.recruiter_name(),
            context.candidate_name,
            context.candidate_email,
            context.job_title,
            COMPANY_NAME
        );
        self.enqueue(
            Some(application_id),
            None,
            &context.recruiter_username,
            &subject,
            &body,
        )
        .await
    }

    async fn context(&self, application_id: i32) -> Result<ApplicationContext> {
        self.templates
            .application_context(application_id)
            .await?
            .ok_or_else(|| Error::NotFound("Application not found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mail_transport::MockMailTransport;

    #[test]
    fn backoff_doubles_and_caps_at_an_hour() {
        assert_eq!(retry_backoff_secs(1), 30);
        assert_eq!(retry_backoff_secs(2), 60);
        assert_eq!(retry_backoff_secs(3), 120);
        assert_eq!(retry_backoff_secs(7), 1920);
        assert_eq!(retry_backoff_secs(8), 3600);
        assert_eq!(retry_backoff_secs(40), 3600);
        assert_eq!(retry_backoff_secs(0), 30);
    }

    #[test]
    fn transition_templates() {
        assert_eq!(template_for_status(ApplicationStatus::Rejected), TemplateType::Rejection);
        assert_eq!(template_for_status(ApplicationStatus::Shortlisted), TemplateType::StatusUpdate);
        assert_eq!(template_for_stage("Offer Extended"), TemplateType::OfferExtended);
        assert_eq!(template_for_stage("Rejected"), TemplateType::Rejection);
        assert_eq!(template_for_stage("Screening"), TemplateType::StatusUpdate);
    }

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap()
    }

    #[tokio::test]
    async fn disabled_automation_never_touches_store_or_transport() {
        let mut transport = MockMailTransport::new();
        transport.expect_send().never();
        let service = NotificationService::new(
            lazy_pool(),
            Arc::new(transport),
            "noreply@vantahire.com".into(),
            false,
        );
        // With automation off these return before any query against the lazy pool.
        service.application_received(1).await;
        service.status_changed(1, ApplicationStatus::Rejected).await;
        service.stage_changed(1, "Hired").await;
        service.interview_scheduled(1).await;
        assert!(!service.automation_enabled());
    }

    #[tokio::test]
    async fn mock_transport_reports_recipient() {
        let mut transport = MockMailTransport::new();
        transport
            .expect_send()
            .withf(|mail| mail.to == "ada@example.com" && mail.subject == "Hi")
            .times(1)
            .returning(|_| Err(Error::ServiceUnavailable("smtp down".into())));
        let mail = OutgoingMail {
            from: "noreply@vantahire.com".into(),
            to: "ada@example.com".into(),
            subject: "Hi".into(),
            text: "Body".into(),
        };
        let err = transport.send(&mail).await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }
}
