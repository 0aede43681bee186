pub mod analytics;
pub mod application;
pub mod email_template;
pub mod job;
pub mod notification;
pub mod pipeline_stage;
pub mod profile;
pub mod user;

/// Returned when a stored or submitted value doesn't name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
