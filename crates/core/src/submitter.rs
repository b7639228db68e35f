//! QuestionnaireResponse submission.

use crate::error::truncate_body;
use crate::{SmartConfig, SmartError, SmartResult};
use fhir::{QuestionnaireResponse, ResourceKind, FHIR_JSON_CONTENT_TYPE};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use serde_json::Value;
use smart_types::AccessToken;
use std::sync::Arc;
use tracing::info;

/// What the server told us about a created QuestionnaireResponse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub status: u16,
    /// Server-assigned id, from the body or the `Location` header.
    pub id: Option<String>,
    pub location: Option<String>,
}

/// POSTs completed responses to the FHIR server unchanged.
#[derive(Clone, Debug)]
pub struct ResponseSubmitter {
    http: reqwest::Client,
    cfg: Arc<SmartConfig>,
}

impl ResponseSubmitter {
    pub fn new(http: reqwest::Client, cfg: Arc<SmartConfig>) -> Self {
        Self { http, cfg }
    }

    /// POST `response` to `[base]/QuestionnaireResponse` as `application/fhir+json`.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::FhirServer`] for non-2xx statuses and [`SmartError::Http`] for
    /// transport failures.
    pub async fn submit(
        &self,
        token: &AccessToken,
        response: &QuestionnaireResponse,
    ) -> SmartResult<SubmissionReceipt> {
        let url = self.cfg.fhir_url(ResourceKind::QuestionnaireResponse.as_str())?;
        let body = serde_json::to_vec(response)?;

        let reply = self
            .http
            .post(url)
            .bearer_auth(token.expose())
            .header(CONTENT_TYPE, FHIR_JSON_CONTENT_TYPE)
            .header(ACCEPT, FHIR_JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = reply.status();
        let location = reply
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = reply.text().await.unwrap_or_default();
            return Err(SmartError::FhirServer {
                status,
                body: truncate_body(body),
            });
        }

        // Servers may answer 201 with an empty body (Prefer: return=minimal).
        let bytes = reply.bytes().await?;
        let body_id = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
        let id = body_id.or_else(|| location.as_deref().and_then(id_from_location));

        info!(
            status = status.as_u16(),
            id = id.as_deref().unwrap_or("<unknown>"),
            "QuestionnaireResponse submitted"
        );

        Ok(SubmissionReceipt {
            status: status.as_u16(),
            id,
            location,
        })
    }
}

/// Extract the id from `.../QuestionnaireResponse/{id}[/_history/{vid}]`.
fn id_from_location(location: &str) -> Option<String> {
    let marker = "QuestionnaireResponse/";
    let start = location.rfind(marker)? + marker.len();
    location[start..]
        .split('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, FakeServer, Reply};
    use crate::ConfigValues;
    use serde_json::json;

    fn completed() -> QuestionnaireResponse {
        QuestionnaireResponse::from_value(json!({
            "resourceType": "QuestionnaireResponse",
            "status": "completed",
            "item": [{ "linkId": "1", "answer": [{ "valueString": "yes" }] }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn posts_once_with_fhir_content_type_and_bearer() {
        let server = FakeServer::start(vec![(
            "/fhir/R4/QuestionnaireResponse",
            Reply::json(201, json!({ "resourceType": "QuestionnaireResponse", "id": "qr-1" })),
        )])
        .await;
        let submitter = ResponseSubmitter::new(
            crate::http::build_client().unwrap(),
            Arc::new(test_config(&server)),
        );

        let receipt = submitter
            .submit(&AccessToken::new("tok").unwrap(), &completed())
            .await
            .expect("submit");

        assert_eq!(receipt.status, 201);
        assert_eq!(receipt.id.as_deref(), Some("qr-1"));

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/fhir/R4/QuestionnaireResponse");
        assert_eq!(req.content_type.as_deref(), Some(FHIR_JSON_CONTENT_TYPE));
        assert_eq!(req.authorization.as_deref(), Some("Bearer tok"));

        let sent: Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(sent, completed().into_value());
    }

    #[tokio::test]
    async fn id_falls_back_to_location_header() {
        let server = FakeServer::start(vec![(
            "/fhir/R4/QuestionnaireResponse",
            Reply::empty(201).with_location("https://x/fhir/QuestionnaireResponse/qr-9/_history/1"),
        )])
        .await;
        let submitter = ResponseSubmitter::new(
            crate::http::build_client().unwrap(),
            Arc::new(test_config(&server)),
        );

        let receipt = submitter
            .submit(&AccessToken::new("tok").unwrap(), &completed())
            .await
            .unwrap();
        assert_eq!(receipt.id.as_deref(), Some("qr-9"));
    }

    #[tokio::test]
    async fn server_rejection_is_fhir_server_error() {
        let server = FakeServer::start(vec![(
            "/fhir/R4/QuestionnaireResponse",
            Reply::json(422, json!({ "resourceType": "OperationOutcome" })),
        )])
        .await;
        let submitter = ResponseSubmitter::new(
            crate::http::build_client().unwrap(),
            Arc::new(test_config(&server)),
        );

        let err = submitter
            .submit(&AccessToken::new("tok").unwrap(), &completed())
            .await
            .unwrap_err();
        assert!(matches!(err, SmartError::FhirServer { status, .. } if status.as_u16() == 422));
    }

    #[tokio::test]
    async fn network_failure_is_an_error_not_a_panic() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cfg = SmartConfig::resolve(ConfigValues {
            client_id: Some("c".into()),
            fhir_base_url: Some(format!("http://{addr}/fhir/R4/")),
            ..Default::default()
        })
        .unwrap();
        let submitter = ResponseSubmitter::new(crate::http::build_client().unwrap(), Arc::new(cfg));

        let err = submitter
            .submit(&AccessToken::new("tok").unwrap(), &completed())
            .await
            .unwrap_err();
        assert!(matches!(err, SmartError::Http(_)));
    }

    #[test]
    fn parses_location_ids() {
        assert_eq!(
            id_from_location("/QuestionnaireResponse/abc").as_deref(),
            Some("abc")
        );
        assert_eq!(id_from_location("/QuestionnaireResponse/"), None);
        assert_eq!(id_from_location("/Patient/abc"), None);
    }
}
