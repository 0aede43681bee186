use std::collections::HashMap;

use sqlx::PgPool;

use crate::dto::template_dto::CreateTemplatePayload;
use crate::error::{Error, Result};
use crate::models::email_template::{EmailTemplate, TemplateType};

pub const COMPANY_NAME: &str = "VantaHire";

const TEMPLATE_COLUMNS: &str = "id, name, subject, body, template_type, is_default, created_by, created_at";

/// Substitutes `{{ key }}` placeholders. Unknown keys render as empty text and
/// an unterminated `{{` is left as written.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let key = after_open[..end].trim();
                if let Some(value) = vars.get(key) {
                    out.push_str(value);
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// A rendered message ready for the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedEmail {
    pub template_type: TemplateType,
    pub subject: String,
    pub body: String,
}

/// Values every template can reference about an application.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApplicationContext {
    pub application_id: i32,
    pub candidate_name: String,
    pub candidate_email: String,
    pub job_title: String,
    pub posted_by: i32,
    pub recruiter_username: String,
    pub recruiter_first_name: Option<String>,
    pub recruiter_last_name: Option<String>,
    pub status: String,
    pub interview_date: Option<chrono::NaiveDate>,
    pub interview_time: Option<String>,
    pub interview_location: Option<String>,
    pub interview_notes: Option<String>,
}

impl ApplicationContext {
    pub fn recruiter_name(&self) -> String {
        let full = [&self.recruiter_first_name, &self.recruiter_last_name]
            .iter()
            .filter_map(|part| part.as_deref())
            .collect::<Vec<_>>()
            .join(" ");
        if full.trim().is_empty() {
            self.recruiter_username.clone()
        } else {
            full
        }
    }

    pub fn variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("candidate_name".to_string(), self.candidate_name.clone());
        vars.insert("candidate_email".to_string(), self.candidate_email.clone());
        vars.insert("job_title".to_string(), self.job_title.clone());
        vars.insert("company_name".to_string(), COMPANY_NAME.to_string());
        vars.insert("recruiter_name".to_string(), self.recruiter_name());
        vars.insert("status".to_string(), self.status.clone());
        vars.insert(
            "interview_date".to_string(),
            self.interview_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        );
        vars.insert(
            "interview_time".to_string(),
            self.interview_time.clone().unwrap_or_default(),
        );
        vars.insert(
            "interview_location".to_string(),
            self.interview_location.clone().unwrap_or_default(),
        );
        vars.insert(
            "interview_notes".to_string(),
            self.interview_notes.clone().unwrap_or_default(),
        );
        vars
    }
}

#[derive(Clone)]
pub struct TemplateService {
    pool: PgPool,
}

impl TemplateService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, template_type: Option<TemplateType>) -> Result<Vec<EmailTemplate>> {
        let rows = sqlx::query_as::<_, EmailTemplate>(&format!(
            r#"
            SELECT {}
            FROM email_templates
            WHERE ($1::text IS NULL OR template_type = $1)
            ORDER BY template_type, is_default DESC, created_at
            "#,
            TEMPLATE_COLUMNS
        ))
        .bind(template_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i32) -> Result<EmailTemplate> {
        sqlx::query_as::<_, EmailTemplate>(&format!(
            "SELECT {} FROM email_templates WHERE id = $1",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Email template not found".into()))
    }

    pub async fn create(&self, payload: &CreateTemplatePayload, created_by: i32) -> Result<EmailTemplate> {
        let row = sqlx::query_as::<_, EmailTemplate>(&format!(
            r#"
            INSERT INTO email_templates (name, subject, body, template_type, is_default, created_by)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING {}
            "#,
            TEMPLATE_COLUMNS
        ))
        .bind(&payload.name)
        .bind(&payload.subject)
        .bind(&payload.body)
        .bind(payload.template_type.as_str())
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(template_id = row.id, template_type = row.template_type.as_str(), "Email template created");
        Ok(row)
    }

    /// Prefers the seeded default for a type, falling back to the oldest one.
    pub async fn default_for(&self, template_type: TemplateType) -> Result<Option<EmailTemplate>> {
        let row = sqlx::query_as::<_, EmailTemplate>(&format!(
            r#"
            SELECT {}
            FROM email_templates
            WHERE template_type = $1
            ORDER BY is_default DESC, created_at ASC
            LIMIT 1
            "#,
            TEMPLATE_COLUMNS
        ))
        .bind(template_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn application_context(&self, application_id: i32) -> Result<Option<ApplicationContext>> {
        let row = sqlx::query_as::<_, ApplicationContext>(
            r#"
            SELECT a.id AS application_id,
                   a.name AS candidate_name,
                   a.email AS candidate_email,
                   j.title AS job_title,
                   j.posted_by,
                   u.username AS recruiter_username,
                   u.first_name AS recruiter_first_name,
                   u.last_name AS recruiter_last_name,
                   a.status,
                   a.interview_date,
                   a.interview_time,
                   a.interview_location,
                   a.interview_notes
            FROM applications a
            JOIN jobs j ON j.id = a.job_id
            JOIN users u ON u.id = j.posted_by
            WHERE a.id = $1
            "#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Renders `template` with the application's variables, letting `overrides`
    /// replace or extend them.
    pub fn compose(
        template: &EmailTemplate,
        context: &ApplicationContext,
        overrides: &HashMap<String, String>,
    ) -> ComposedEmail {
        let mut vars = context.variables();
        for (key, value) in overrides {
            vars.insert(key.clone(), value.clone());
        }
        ComposedEmail {
            template_type: template.template_type,
            subject: render_template(&template.subject, &vars),
            body: render_template(&template.body, &vars),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let out = render_template(
            "Hi {{candidate_name}}, thanks for applying to {{ job_title }}.",
            &vars(&[("candidate_name", "Ada"), ("job_title", "Engineer")]),
        );
        assert_eq!(out, "Hi Ada, thanks for applying to Engineer.");
    }

    #[test]
    fn missing_variables_render_empty() {
        let out = render_template("Date: {{interview_date}}!", &HashMap::new());
        assert_eq!(out, "Date: !");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        let out = render_template("Hello {{name", &vars(&[("name", "x")]));
        assert_eq!(out, "Hello {{name");
    }

    #[test]
    fn repeated_placeholders_all_substituted() {
        let out = render_template("{{a}}-{{a}}-{{b}}", &vars(&[("a", "1"), ("b", "2")]));
        assert_eq!(out, "1-1-2");
    }

    fn context() -> ApplicationContext {
        ApplicationContext {
            application_id: 9,
            candidate_name: "Grace Hopper".into(),
            candidate_email: "grace@example.com".into(),
            job_title: "Compiler Engineer".into(),
            posted_by: 2,
            recruiter_username: "rec@example.com".into(),
            recruiter_first_name: Some("Rita".into()),
            recruiter_last_name: None,
            status: "shortlisted".into(),
            interview_date: NaiveDate::from_ymd_opt(2025, 5, 2),
            interview_time: Some("10:00".into()),
            interview_location: Some("Room 4".into()),
            interview_notes: None,
        }
    }

    #[test]
    fn compose_uses_context_and_overrides() {
        let template = EmailTemplate {
            id: 1,
            name: "Invite".into(),
            subject: "Interview for {{job_title}}".into(),
            body: "{{candidate_name}} / {{interview_date}} {{interview_time}} @ {{interview_location}} / {{recruiter_name}} at {{company_name}} {{extra}}".into(),
            template_type: TemplateType::InterviewInvite,
            is_default: true,
            created_by: None,
            created_at: Utc::now(),
        };
        let email = TemplateService::compose(&template, &context(), &vars(&[("extra", "P.S.")]));
        assert_eq!(email.subject, "Interview for Compiler Engineer");
        assert_eq!(
            email.body,
            "Grace Hopper / 2025-05-02 10:00 @ Room 4 / Rita at VantaHire P.S."
        );
        assert_eq!(email.template_type, TemplateType::InterviewInvite);
    }

    #[test]
    fn recruiter_name_falls_back_to_username() {
        let mut ctx = context();
        ctx.recruiter_first_name = None;
        assert_eq!(ctx.recruiter_name(), "rec@example.com");
    }
}
