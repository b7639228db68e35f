//! FHIR wire/boundary support for the SMART client.
//!
//! The client treats most resources as opaque JSON. This crate holds the few places where
//! it looks inside them:
//! - resource kinds and id validation for building REST paths
//! - the patient summary shown in the view
//! - questionnaire templates and the completed QuestionnaireResponse handed to the server
//!
//! Nothing here performs I/O; transport lives in `smart-core`.

pub mod patient;
pub mod questionnaire;
pub mod resource;

pub use patient::{AddressLine, ContactLine, PatientSummary, SummaryLine, VitalStatus};
pub use questionnaire::{QuestionnaireResponse, QuestionnaireTemplate};
pub use resource::{validate_resource_id, ResourceKind, FHIR_JSON_CONTENT_TYPE};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("unexpected resourceType: expected '{expected}', got '{actual}'")]
    UnexpectedResourceType { expected: String, actual: String },

    #[error("invalid resource id: {0:?}")]
    InvalidResourceId(String),

    #[error("unknown resource kind: {0}")]
    UnknownResourceKind(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
