use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    InterviewInvite,
    ApplicationReceived,
    StatusUpdate,
    OfferExtended,
    Rejection,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::InterviewInvite => "interview_invite",
            TemplateType::ApplicationReceived => "application_received",
            TemplateType::StatusUpdate => "status_update",
            TemplateType::OfferExtended => "offer_extended",
            TemplateType::Rejection => "rejection",
        }
    }
}

impl std::str::FromStr for TemplateType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interview_invite" => Ok(TemplateType::InterviewInvite),
            "application_received" => Ok(TemplateType::ApplicationReceived),
            "status_update" => Ok(TemplateType::StatusUpdate),
            "offer_extended" => Ok(TemplateType::OfferExtended),
            "rejection" => Ok(TemplateType::Rejection),
            other => Err(UnknownVariant::new("template type", other)),
        }
    }
}

impl TryFrom<String> for TemplateType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub id: i32,
    pub name: String,
    pub subject: String,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub template_type: TemplateType,
    pub is_default: bool,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}
