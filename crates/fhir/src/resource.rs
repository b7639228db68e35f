//! Resource kinds the client reads or writes, and FHIR id validation.

use crate::{FhirError, FhirResult};
use std::str::FromStr;

/// Media type for FHIR JSON request and response bodies.
pub const FHIR_JSON_CONTENT_TYPE: &str = "application/fhir+json";

/// Maximum length of a FHIR logical id.
const MAX_ID_LEN: usize = 64;

/// FHIR resource types this client talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Patient,
    Questionnaire,
    CarePlan,
    QuestionnaireResponse,
}

impl ResourceKind {
    /// Resource kinds that are fetched after sign-in, in display order.
    pub const READABLE: [ResourceKind; 3] = [
        ResourceKind::Patient,
        ResourceKind::Questionnaire,
        ResourceKind::CarePlan,
    ];

    /// The FHIR `resourceType` name, which is also the REST path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Questionnaire => "Questionnaire",
            ResourceKind::CarePlan => "CarePlan",
            ResourceKind::QuestionnaireResponse => "QuestionnaireResponse",
        }
    }

    /// Parse a comma-separated list such as `Patient, CarePlan`.
    ///
    /// Blank entries are skipped and duplicates collapse onto their first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::UnknownResourceKind`] for any entry that is not a known kind.
    pub fn parse_list(input: &str) -> FhirResult<Vec<ResourceKind>> {
        let mut kinds = Vec::new();
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind = part.parse::<ResourceKind>()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceKind::Patient),
            "Questionnaire" => Ok(ResourceKind::Questionnaire),
            "CarePlan" => Ok(ResourceKind::CarePlan),
            "QuestionnaireResponse" => Ok(ResourceKind::QuestionnaireResponse),
            other => Err(FhirError::UnknownResourceKind(other.to_string())),
        }
    }
}

/// Check that `id` is a FHIR logical id (`[A-Za-z0-9\-\.]{1,64}`).
///
/// Ids are interpolated into request paths, so anything else is rejected rather than
/// escaped.
pub fn validate_resource_id(id: &str) -> FhirResult<&str> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

    if valid {
        Ok(id)
    } else {
        Err(FhirError::InvalidResourceId(id.to_string()))
    }
}
