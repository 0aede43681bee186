use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, Request,
    },
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::error::Error;

/// JSON body that has been deserialized and passed `Validate` before the
/// handler sees it. Malformed or unknown shapes become a 400 with details.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(rejection_to_error)?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

const DESERIALIZE_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// Data errors carry the offending path (`type: unknown variant ...`); surface it
/// as the field name so clients get the same shape as `Validate` failures.
fn rejection_to_error(rejection: JsonRejection) -> Error {
    let text = rejection.body_text();
    if let JsonRejection::JsonDataError(_) = rejection {
        if let Some(rest) = text.strip_prefix(DESERIALIZE_PREFIX) {
            return match rest.split_once(": ") {
                Some((path, message)) if path != "." && !path.contains(' ') => {
                    Error::field(path, message)
                }
                _ => Error::field("body", rest),
            };
        }
    }
    Error::field("body", text)
}

/// Query strings that fail to deserialize (`type=freelance`) are reported
/// against the `query` field.
pub fn query_rejection(rejection: QueryRejection) -> Error {
    Error::field("query", rejection.body_text())
}

pub const MAX_SKILLS: usize = 20;
pub const MAX_SKILL_LEN: usize = 50;

pub fn validate_skills(skills: &Vec<String>) -> Result<(), ValidationError> {
    if skills.len() > MAX_SKILLS {
        let mut err = ValidationError::new("too_many_skills");
        err.message = Some(format!("At most {} skills are allowed", MAX_SKILLS).into());
        return Err(err);
    }
    if skills
        .iter()
        .any(|s| s.trim().is_empty() || s.chars().count() > MAX_SKILL_LEN)
    {
        let mut err = ValidationError::new("invalid_skill");
        err.message = Some(
            format!("Each skill must be between 1 and {} characters", MAX_SKILL_LEN).into(),
        );
        return Err(err);
    }
    Ok(())
}
