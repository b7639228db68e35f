//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Request handling never reads environment variables.
//!
//! Binaries collect raw values with [`ConfigValues::from_env`] (or build them directly in
//! tests) and turn them into a validated [`SmartConfig`] with [`SmartConfig::resolve`].

use crate::constants::{
    DEFAULT_AUTHORIZE_URL, DEFAULT_DEV_REDIRECT_URI, DEFAULT_FHIR_BASE_URL, DEFAULT_RESOURCES,
    DEFAULT_SCOPE, DEFAULT_TOKEN_URL,
};
use crate::{SmartError, SmartResult};
use fhir::{validate_resource_id, ResourceKind};
use smart_types::NonEmptyText;
use url::Url;

/// Deployment environment, which selects the redirect URI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse the environment name. `None` or blank means development.
    pub fn from_env_value(value: Option<&str>) -> SmartResult<Self> {
        match value.map(str::trim).unwrap_or("") {
            "" | "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(SmartError::InvalidConfig(format!(
                "unknown environment {other:?} (expected development or production)"
            ))),
        }
    }
}

/// Raw, unvalidated configuration values.
#[derive(Clone, Debug, Default)]
pub struct ConfigValues {
    pub client_id: Option<String>,
    pub environment: Option<String>,
    pub redirect_uri_dev: Option<String>,
    pub redirect_uri_prod: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub fhir_base_url: Option<String>,
    pub scope: Option<String>,
    pub resources: Option<String>,
    pub questionnaire_id: Option<String>,
    pub care_plan_id: Option<String>,
}

impl ConfigValues {
    /// Read the `SMART_*` variables from the process environment.
    ///
    /// Call once at startup.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            client_id: var("SMART_CLIENT_ID"),
            environment: var("SMART_ENV"),
            redirect_uri_dev: var("SMART_REDIRECT_URI_DEV"),
            redirect_uri_prod: var("SMART_REDIRECT_URI_PROD"),
            authorize_url: var("SMART_AUTHORIZE_URL"),
            token_url: var("SMART_TOKEN_URL"),
            fhir_base_url: var("SMART_FHIR_BASE_URL"),
            scope: var("SMART_SCOPE"),
            resources: var("SMART_RESOURCES"),
            questionnaire_id: var("SMART_QUESTIONNAIRE_ID"),
            care_plan_id: var("SMART_CARE_PLAN_ID"),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct SmartConfig {
    client_id: NonEmptyText,
    environment: Environment,
    redirect_uri: Url,
    authorize_url: Url,
    token_url: Url,
    fhir_base_url: Url,
    scope: String,
    resources: Vec<ResourceKind>,
    questionnaire_id: Option<String>,
    care_plan_id: Option<String>,
}

impl SmartConfig {
    /// Validate raw values and fill in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::InvalidConfig`] if:
    /// - the client id is missing,
    /// - the environment is production and no production redirect URI is set,
    /// - any URL is malformed or not http(s),
    /// - the resource list names an unknown or non-readable resource type,
    /// - a configured questionnaire or care plan id is not a valid FHIR id.
    pub fn resolve(values: ConfigValues) -> SmartResult<Self> {
        let client_id = NonEmptyText::from_optional(values.client_id)
            .ok_or_else(|| SmartError::InvalidConfig("SMART_CLIENT_ID is required".into()))?;

        let environment = Environment::from_env_value(values.environment.as_deref())?;

        let redirect_uri = match environment {
            Environment::Development => parse_http_url(
                "SMART_REDIRECT_URI_DEV",
                &or_default(values.redirect_uri_dev, DEFAULT_DEV_REDIRECT_URI),
            )?,
            Environment::Production => {
                let value = NonEmptyText::from_optional(values.redirect_uri_prod).ok_or_else(
                    || {
                        SmartError::InvalidConfig(
                            "SMART_REDIRECT_URI_PROD is required in production".into(),
                        )
                    },
                )?;
                parse_http_url("SMART_REDIRECT_URI_PROD", value.as_str())?
            }
        };

        let authorize_url = parse_http_url(
            "SMART_AUTHORIZE_URL",
            &or_default(values.authorize_url, DEFAULT_AUTHORIZE_URL),
        )?;
        let token_url = parse_http_url(
            "SMART_TOKEN_URL",
            &or_default(values.token_url, DEFAULT_TOKEN_URL),
        )?;

        // Url::join drops the last path segment unless the base ends in '/'.
        let mut base = or_default(values.fhir_base_url, DEFAULT_FHIR_BASE_URL);
        if !base.ends_with('/') {
            base.push('/');
        }
        let fhir_base_url = parse_http_url("SMART_FHIR_BASE_URL", &base)?;

        let scope = or_default(values.scope, DEFAULT_SCOPE);

        let resources = ResourceKind::parse_list(&or_default(values.resources, DEFAULT_RESOURCES))
            .map_err(|e| SmartError::InvalidConfig(format!("SMART_RESOURCES: {e}")))?;
        if let Some(kind) = resources
            .iter()
            .find(|k| !ResourceKind::READABLE.contains(k))
        {
            return Err(SmartError::InvalidConfig(format!(
                "SMART_RESOURCES: {kind} cannot be fetched at sign-in"
            )));
        }

        let questionnaire_id = optional_id("SMART_QUESTIONNAIRE_ID", values.questionnaire_id)?;
        let care_plan_id = optional_id("SMART_CARE_PLAN_ID", values.care_plan_id)?;

        Ok(Self {
            client_id,
            environment,
            redirect_uri,
            authorize_url,
            token_url,
            fhir_base_url,
            scope,
            resources,
            questionnaire_id,
            care_plan_id,
        })
    }

    pub fn client_id(&self) -> &str {
        self.client_id.as_str()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// FHIR base URL, always ending in `/`.
    pub fn fhir_base_url(&self) -> &Url {
        &self.fhir_base_url
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Resource types fetched after sign-in, in configured order.
    pub fn resources(&self) -> &[ResourceKind] {
        &self.resources
    }

    pub fn questionnaire_id(&self) -> Option<&str> {
        self.questionnaire_id.as_deref()
    }

    pub fn care_plan_id(&self) -> Option<&str> {
        self.care_plan_id.as_deref()
    }

    /// Resolve a path relative to the FHIR base URL.
    pub fn fhir_url(&self, path: &str) -> SmartResult<Url> {
        Ok(self.fhir_base_url.join(path)?)
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    NonEmptyText::from_optional(value)
        .map(|v| v.as_str().to_string())
        .unwrap_or_else(|| default.to_string())
}

fn parse_http_url(name: &str, value: &str) -> SmartResult<Url> {
    let parsed = Url::parse(value)
        .map_err(|e| SmartError::InvalidConfig(format!("{name}: invalid URL {value:?}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SmartError::InvalidConfig(format!(
            "{name}: URL must use http or https scheme, got: {}",
            parsed.scheme()
        )));
    }

    Ok(parsed)
}

fn optional_id(name: &str, value: Option<String>) -> SmartResult<Option<String>> {
    NonEmptyText::from_optional(value)
        .map(|id| {
            validate_resource_id(id.as_str())
                .map(str::to_string)
                .map_err(|e| SmartError::InvalidConfig(format!("{name}: {e}")))
        })
        .transpose()
}
