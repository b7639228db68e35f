//! Outbound HTTP client construction and response decoding.

use crate::constants::{CONNECT_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::truncate_body;
use crate::{SmartError, SmartResult};
use serde_json::Value;

/// Build the HTTP client shared by token exchange, fetches and submissions.
pub fn build_client() -> SmartResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(SmartError::HttpClientBuild)
}

/// Decode a FHIR server response body, mapping non-2xx statuses to
/// [`SmartError::FhirServer`].
pub(crate) async fn fhir_json(response: reqwest::Response) -> SmartResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SmartError::FhirServer {
            status,
            body: truncate_body(body),
        });
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
