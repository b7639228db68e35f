//! In-process fake OAuth/FHIR server for tests.
//!
//! Binds an axum router to `127.0.0.1:0`, answers configured paths with canned replies and
//! records every request it sees.

use crate::{ConfigValues, SmartConfig};
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    /// Decode an `application/x-www-form-urlencoded` body.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .into_owned()
            .collect()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Reply {
    status: u16,
    body: Option<Value>,
    location: Option<String>,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
            location: None,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: None,
            location: None,
        }
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
}

#[derive(Clone)]
struct FakeState {
    routes: Arc<HashMap<String, Reply>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub(crate) struct FakeServer {
    base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeServer {
    /// Start a server answering `routes` (path → reply). Unknown paths get 404.
    pub async fn start(routes: Vec<(&str, Reply)>) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            routes: Arc::new(
                routes
                    .into_iter()
                    .map(|(path, reply)| (path.to_string(), reply))
                    .collect(),
            ),
            requests: requests.clone(),
        };

        let app = Router::new().fallback(record).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("fake server address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake server");
        });

        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn record(
    State(state): State<FakeState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    state
        .requests
        .lock()
        .expect("requests lock")
        .push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            content_type: header_value(header::CONTENT_TYPE),
            authorization: header_value(header::AUTHORIZATION),
            accept: header_value(header::ACCEPT),
            body,
        });

    let Some(reply) = state.routes.get(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let status = StatusCode::from_u16(reply.status).expect("valid status");
    let mut response = match &reply.body {
        Some(body) => (status, axum::Json(body.clone())).into_response(),
        None => status.into_response(),
    };
    if let Some(location) = &reply.location {
        response.headers_mut().insert(
            header::LOCATION,
            location.parse().expect("valid location header"),
        );
    }
    response
}

/// Config pointing every endpoint at `server`.
pub(crate) fn test_config(server: &FakeServer) -> SmartConfig {
    test_config_with(server, ConfigValues::default())
}

pub(crate) fn test_config_with(server: &FakeServer, values: ConfigValues) -> SmartConfig {
    SmartConfig::resolve(ConfigValues {
        client_id: Some("test-client".into()),
        authorize_url: Some(server.url("/oauth2/authorize")),
        token_url: Some(server.url("/oauth2/token")),
        fhir_base_url: Some(server.url("/fhir/R4/")),
        ..values
    })
    .expect("test config")
}
