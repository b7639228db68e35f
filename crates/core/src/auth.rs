//! OAuth2 authorization-code flow: the authorize URL and the token exchange.

use crate::error::truncate_body;
use crate::{SmartConfig, SmartError, SmartResult};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use smart_types::{AccessToken, NonEmptyText};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Successful token endpoint response.
///
/// `patient` is the SMART launch context: the id of the patient the token is scoped to.
/// Only `access_token` is required. The remaining fields are read leniently: servers that
/// send `expires_in` as a string still sign in, and a mistyped field is dropped with a warning.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: AccessToken,
    #[serde(default, deserialize_with = "lenient_string")]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub patient: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_token: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            warn!("ignoring token response field of unexpected type: {other}");
            None
        }
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let parsed = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    if parsed.is_none() {
        warn!("ignoring unreadable expires_in in token response");
    }
    Ok(parsed)
}

/// Generate a fresh `state` value for an authorize request.
pub fn new_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Build the URL the browser is sent to for sign-in.
///
/// `aud` carries the FHIR base URL, which SMART authorization servers require.
pub fn authorize_url(cfg: &SmartConfig, state: &str) -> Url {
    let mut url = cfg.authorize_url().clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", cfg.client_id())
        .append_pair("redirect_uri", cfg.redirect_uri().as_str())
        .append_pair("scope", cfg.scope())
        .append_pair("state", state)
        .append_pair("aud", cfg.fhir_base_url().as_str());
    url
}

/// Exchanges authorization codes for access tokens.
#[derive(Clone, Debug)]
pub struct TokenExchange {
    http: reqwest::Client,
    cfg: Arc<SmartConfig>,
}

impl TokenExchange {
    pub fn new(http: reqwest::Client, cfg: Arc<SmartConfig>) -> Self {
        Self { http, cfg }
    }

    /// Form body sent to the token endpoint.
    pub fn form_params<'a>(&'a self, code: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.cfg.redirect_uri().as_str()),
            ("code", code),
            ("client_id", self.cfg.client_id()),
        ]
    }

    /// POST the code to the token endpoint as `application/x-www-form-urlencoded`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the request fails in transport,
    /// - the endpoint answers with a non-2xx status ([`SmartError::TokenEndpoint`]),
    /// - the body has no usable `access_token` ([`SmartError::InvalidAccessToken`]).
    pub async fn exchange(&self, code: &NonEmptyText) -> SmartResult<TokenResponse> {
        info!("exchanging authorization code at {}", self.cfg.token_url());

        let response = self
            .http
            .post(self.cfg.token_url().clone())
            .form(&self.form_params(code.as_str()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmartError::TokenEndpoint {
                status,
                body: truncate_body(body),
            });
        }

        let body: Value = serde_json::from_slice(&response.bytes().await?)?;
        let has_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .is_some_and(|t| AccessToken::new(t).is_ok());
        if !has_token {
            return Err(SmartError::InvalidAccessToken);
        }

        let token: TokenResponse = serde_json::from_value(body)?;
        info!(
            patient = token.patient.as_deref().unwrap_or("<none>"),
            "token exchange succeeded"
        );
        Ok(token)
    }
}
