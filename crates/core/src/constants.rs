//! Constants used throughout the SMART core crate.
//!
//! Endpoint defaults point at the Epic public sandbox. None of them is a credential: the
//! client id always comes from configuration.

/// Default OAuth2 authorize endpoint.
pub const DEFAULT_AUTHORIZE_URL: &str =
    "https://fhir.epic.com/interconnect-fhir-oauth/oauth2/authorize";

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://fhir.epic.com/interconnect-fhir-oauth/oauth2/token";

/// Default FHIR R4 base URL.
pub const DEFAULT_FHIR_BASE_URL: &str =
    "https://fhir.epic.com/interconnect-fhir-oauth/api/FHIR/R4/";

/// Redirect URI used in development when none is configured.
pub const DEFAULT_DEV_REDIRECT_URI: &str = "http://localhost:3000/callback";

/// Scopes requested at sign-in when none are configured.
pub const DEFAULT_SCOPE: &str = "launch/patient openid fhirUser patient/*.read \
Questionnaire.read Questionnaire.search QuestionnaireResponse.read \
QuestionnaireResponse.create QuestionnaireResponse.search Patient.read Patient.search";

/// Resource types fetched after sign-in when none are configured.
pub const DEFAULT_RESOURCES: &str = "Patient,Questionnaire,CarePlan";

/// Timeout applied to every outbound HTTP request.
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Timeout for establishing outbound connections.
pub const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Upper bound on error bodies kept in [`crate::SmartError`] values.
pub const MAX_ERROR_BODY_CHARS: usize = 512;
