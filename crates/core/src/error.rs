use crate::constants::MAX_ERROR_BODY_CHARS;

#[derive(Debug, thiserror::Error)]
pub enum SmartError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClientBuild(reqwest::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("token response missing or invalid access_token")]
    InvalidAccessToken,
    #[error("FHIR server returned {status}: {body}")]
    FhirServer {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("authorization server returned error: {0}")]
    AuthorizationDenied(String),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("token response did not include a patient context")]
    MissingPatientContext,
    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type SmartResult<T> = std::result::Result<T, SmartError>;

/// Truncate a response body for inclusion in an error value.
pub(crate) fn truncate_body(body: String) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body;
    }
    let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push('…');
    truncated
}
