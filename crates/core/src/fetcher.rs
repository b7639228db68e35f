//! Read-only FHIR resource fetches made after sign-in.

use crate::http::fhir_json;
use crate::session::FetchedResources;
use crate::{SmartConfig, SmartResult};
use fhir::{validate_resource_id, ResourceKind, FHIR_JSON_CONTENT_TYPE};
use futures_util::future::join_all;
use reqwest::header::ACCEPT;
use serde_json::Value;
use smart_types::AccessToken;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// A single GET against the FHIR server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRequest {
    pub kind: ResourceKind,
    pub url: Url,
}

/// Issues one GET per configured resource kind with the bearer token.
#[derive(Clone, Debug)]
pub struct ResourceFetcher {
    http: reqwest::Client,
    cfg: Arc<SmartConfig>,
}

impl ResourceFetcher {
    pub fn new(http: reqwest::Client, cfg: Arc<SmartConfig>) -> Self {
        Self { http, cfg }
    }

    /// The URL to read `kind` for `patient_id`.
    ///
    /// Questionnaire and CarePlan are read by configured id when one is set, and searched
    /// otherwise (CarePlan scoped to the patient).
    pub fn request_for(&self, kind: ResourceKind, patient_id: &str) -> SmartResult<ResourceRequest> {
        let patient_id = validate_resource_id(patient_id)?;

        let url = match kind {
            ResourceKind::Patient => self.cfg.fhir_url(&format!("Patient/{patient_id}"))?,
            ResourceKind::Questionnaire => match self.cfg.questionnaire_id() {
                Some(id) => self.cfg.fhir_url(&format!("Questionnaire/{id}"))?,
                None => self.cfg.fhir_url("Questionnaire")?,
            },
            ResourceKind::CarePlan => match self.cfg.care_plan_id() {
                Some(id) => self.cfg.fhir_url(&format!("CarePlan/{id}"))?,
                None => {
                    let mut url = self.cfg.fhir_url("CarePlan")?;
                    url.query_pairs_mut().append_pair("patient", patient_id);
                    url
                }
            },
            ResourceKind::QuestionnaireResponse => {
                return Err(crate::SmartError::InvalidInput(
                    "QuestionnaireResponse is submitted, not fetched".into(),
                ))
            }
        };

        Ok(ResourceRequest { kind, url })
    }

    /// GET one resource and return its raw JSON.
    pub async fn fetch(&self, token: &AccessToken, request: &ResourceRequest) -> SmartResult<Value> {
        let response = self
            .http
            .get(request.url.clone())
            .bearer_auth(token.expose())
            .header(ACCEPT, FHIR_JSON_CONTENT_TYPE)
            .send()
            .await?;

        fhir_json(response).await
    }

    /// Fetch every configured resource kind concurrently.
    ///
    /// Failures are logged and leave the corresponding slot empty.
    pub async fn fetch_all(&self, token: &AccessToken, patient_id: &str) -> FetchedResources {
        let mut resources = FetchedResources::default();

        let requests: Vec<ResourceRequest> = self
            .cfg
            .resources()
            .iter()
            .filter_map(|kind| match self.request_for(*kind, patient_id) {
                Ok(request) => Some(request),
                Err(e) => {
                    warn!("skipping {kind} fetch: {e}");
                    None
                }
            })
            .collect();

        let results = join_all(requests.iter().map(|request| async move {
            (request, self.fetch(token, request).await)
        }))
        .await;

        for (request, result) in results {
            match result {
                Ok(value) => {
                    info!("fetched {} from {}", request.kind, request.url.path());
                    resources.set(request.kind, value);
                }
                Err(e) => warn!("error fetching {}: {e}", request.kind),
            }
        }

        resources
    }
}
