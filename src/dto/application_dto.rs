use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::application::ApplicationStatus;

/// Text fields of the multipart apply form; the resume travels separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationForm {
    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters"))]
    pub name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 10, max = 15, message = "Phone must be between 10 and 15 characters"))]
    pub phone: String,
    #[validate(length(max = 2000, message = "Cover letter must be at most 2000 characters"))]
    pub cover_letter: Option<String>,
}

impl ApplicationForm {
    /// Trims every text field so limits apply to what gets stored. A blank
    /// cover letter becomes `None`.
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self.phone = self.phone.trim().to_string();
        self.cover_letter = self
            .cover_letter
            .take()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub application_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateStatusPayload {
    pub status: ApplicationStatus,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BulkStatusPayload {
    #[validate(length(min = 1, max = 500, message = "Between 1 and 500 application ids are required"))]
    pub application_ids: Vec<i32>,
    pub status: ApplicationStatus,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateResponse {
    pub updated: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MoveStagePayload {
    pub stage_id: i32,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InterviewPayload {
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 20, message = "Time must be between 1 and 20 characters"))]
    pub time: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Location must be between 1 and 200 characters"))]
    pub location: Option<String>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

impl InterviewPayload {
    /// Date, time and place are all known, so an invitation can go out.
    pub fn is_complete(&self) -> bool {
        self.date.is_some() && self.time.is_some() && self.location.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotePayload {
    #[validate(length(min = 1, max = 2000, message = "Note must be between 1 and 2000 characters"))]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RatingPayload {
    #[validate(range(min = 1, max = 5, message = "Rating must be an integer between 1 and 5"))]
    pub rating: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateStagePayload {
    #[validate(length(min = 1, max = 50, message = "Stage name must be between 1 and 50 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "Color must be between 1 and 20 characters"))]
    pub color: Option<String>,
    #[validate(range(min = 1, message = "Order must be positive"))]
    pub order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ApplicationForm {
        ApplicationForm {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+15551234567".into(),
            cover_letter: None,
        }
    }

    #[test]
    fn application_form_limits() {
        assert!(form().validate().is_ok());

        let mut bad = form();
        bad.phone = "12345".into();
        bad.name = "n".repeat(51);
        bad.cover_letter = Some("c".repeat(2001));
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("phone"));
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("cover_letter"));
    }

    #[test]
    fn padded_phone_is_measured_after_trimming() {
        let mut padded = form();
        padded.phone = "  123456789 ".into();
        padded.cover_letter = Some("   ".into());
        assert!(padded.validate().is_ok());

        padded.normalize();
        assert_eq!(padded.phone, "123456789");
        assert_eq!(padded.cover_letter, None);
        assert!(padded.validate().unwrap_err().field_errors().contains_key("phone"));
    }

    #[test]
    fn rating_must_be_between_one_and_five() {
        assert!(RatingPayload { rating: 5 }.validate().is_ok());
        assert!(RatingPayload { rating: 0 }.validate().is_err());
        assert!(RatingPayload { rating: 6 }.validate().is_err());
        assert!(serde_json::from_str::<RatingPayload>(r#"{"rating": 3.5}"#).is_err());
    }

    #[test]
    fn interview_completeness_needs_date_time_and_location() {
        let mut payload = InterviewPayload {
            date: NaiveDate::from_ymd_opt(2025, 3, 14),
            time: Some("14:30".into()),
            ..Default::default()
        };
        assert!(!payload.is_complete());
        payload.location = Some("Office 2B".into());
        assert!(payload.is_complete());
    }

    #[test]
    fn bulk_payload_requires_ids() {
        let payload: BulkStatusPayload =
            serde_json::from_str(r#"{"applicationIds": [], "status": "shortlisted"}"#).unwrap();
        assert!(payload.validate().is_err());
    }
}
