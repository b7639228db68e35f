//! # API REST
//!
//! Browser-facing HTTP surface for the SMART client.
//!
//! Handles:
//! - the OAuth redirect (`/`, `/callback`) and sign-in (`/sign-in`)
//! - server-rendered patient and questionnaire pages (maud)
//! - QuestionnaireResponse submission as JSON
//! - OpenAPI/Swagger documentation for the JSON endpoints
//!
//! Each browser gets its own session, keyed by the `smart_session` cookie set at sign-in.
//! Requests without a known cookie see the signed-out pages. All outbound calls go through
//! [`smart_core::SmartService`].

#![warn(rust_2018_idioms)]

pub mod views;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use fhir::QuestionnaireResponse;
use maud::Markup;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smart_core::{
    CallbackParams, FormRenderer, LhcForms, Panel, SessionRegistry, SessionStore, SmartError,
    SmartResult, SmartService, SubmissionReceipt, ViewState,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// JSON body extractor that keeps the rejection. Aliased so utoipa 4's `axum_extras`
/// argument inspection does not try (and fail) to parse `Result<Json<_>, _>` as a body.
type JsonPayload = Result<Json<Value>, JsonRejection>;

/// Name of the cookie carrying the browser's session id.
pub const SESSION_COOKIE: &str = "smart_session";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: SmartService,
    pub sessions: SessionRegistry,
    pub renderer: Arc<dyn FormRenderer>,
}

impl AppState {
    /// State using the LHC-Forms widget from its public CDN.
    pub fn new(service: SmartService) -> Self {
        Self {
            service,
            sessions: SessionRegistry::new(),
            renderer: Arc::new(LhcForms::default()),
        }
    }

    /// The session named by the request's cookie, if the registry knows it.
    async fn session_for(&self, jar: &CookieJar) -> Option<SessionStore> {
        let id = jar.get(SESSION_COOKIE)?.value().to_owned();
        self.sessions.get(&id).await
    }
}

fn session_cookie(id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Outcome of a QuestionnaireResponse submission, shown to the user as an alert.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmissionRes {
    pub ok: bool,
    pub message: String,
    /// Server-assigned QuestionnaireResponse id, when known.
    pub id: Option<String>,
}

impl SubmissionRes {
    fn failed(message: String) -> Json<Self> {
        Json(Self {
            ok: false,
            message,
            id: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ViewForm {
    panel: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, submit_questionnaire_response),
    components(schemas(HealthRes, SubmissionRes))
)]
struct ApiDoc;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/callback", get(index))
        .route("/sign-in", get(sign_in))
        .route("/view", post(select_view))
        .route("/questionnaire", get(questionnaire))
        .route("/questionnaire-response", post(submit_questionnaire_response))
        .route("/logout", post(logout))
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Landing page and OAuth redirect target.
///
/// Any `code` in the query is handled first; the page then reflects the resulting view
/// state. Without a session cookie the callback has no pending sign-in and is rejected.
#[axum::debug_handler]
async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Markup {
    let session = state.session_for(&jar).await.unwrap_or_default();
    let view = state.service.handle_callback(&session, params).await;
    match view {
        ViewState::SignedOut => views::sign_in_page(),
        ViewState::AwaitingToken => views::awaiting_token_page(),
        ViewState::SignedIn(panel) => {
            let snapshot = session.snapshot().await;
            views::patient_page(&snapshot, panel, state.renderer.as_ref())
        }
    }
}

#[axum::debug_handler]
async fn sign_in(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let existing = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned());
    let (id, session) = state.sessions.get_or_create(existing.as_deref()).await;
    let url = state.service.begin_sign_in(&session).await;
    tracing::info!("redirecting to authorization server {}", state.service.config().authorize_url());
    (jar.add(session_cookie(id)), Redirect::to(url.as_str()))
}

#[axum::debug_handler]
async fn select_view(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ViewForm>,
) -> Result<Redirect, (StatusCode, &'static str)> {
    let Some(panel) = Panel::parse(&form.panel) else {
        return Err((StatusCode::BAD_REQUEST, "Unknown panel"));
    };
    if let Some(session) = state.session_for(&jar).await {
        state.service.select_panel(&session, panel).await;
    }
    Ok(Redirect::to("/"))
}

#[axum::debug_handler]
async fn questionnaire(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(session) = state.session_for(&jar).await else {
        return Redirect::to("/").into_response();
    };
    if !matches!(session.snapshot().await.view_state(), ViewState::SignedIn(_)) {
        return Redirect::to("/").into_response();
    }
    let template = state.service.questionnaire_template(&session).await;
    views::questionnaire_page(template.as_ref(), state.renderer.as_ref()).into_response()
}

#[axum::debug_handler]
async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        if let Some(session) = state.sessions.remove(&id).await {
            state.service.logout(&session).await;
        }
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/"))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "SMART client is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/questionnaire-response",
    responses(
        (status = 200, description = "QuestionnaireResponse created", body = SubmissionRes),
        (status = 400, description = "Body is not a QuestionnaireResponse object", body = SubmissionRes),
        (status = 401, description = "Not signed in", body = SubmissionRes),
        (status = 502, description = "FHIR server rejected the submission", body = SubmissionRes)
    )
)]
/// Submit a completed QuestionnaireResponse
///
/// The body is the JSON object produced by the form widget. `questionnaire` and `subject`
/// are filled in when absent, then the resource is POSTed to the FHIR server unchanged.
///
/// # Errors
/// Returns:
/// - `400 Bad Request` if the body is not JSON or not a QuestionnaireResponse object,
/// - `401 Unauthorized` if the browser has no signed-in session,
/// - `502 Bad Gateway` if the FHIR server rejects the request or cannot be reached.
#[axum::debug_handler]
async fn submit_questionnaire_response(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: JsonPayload,
) -> (StatusCode, Json<SubmissionRes>) {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::warn!("Submit QuestionnaireResponse rejected body: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                SubmissionRes::failed(format!("Failed to submit form: {}", rejection.body_text())),
            );
        }
    };

    match submit(&state, &jar, body).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(SubmissionRes {
                ok: true,
                message: "Form submitted successfully!".into(),
                id: receipt.id,
            }),
        ),
        Err(e) => {
            tracing::error!("Submit QuestionnaireResponse error: {:?}", e);
            (status_for(&e), SubmissionRes::failed(format!("Failed to submit form: {e}")))
        }
    }
}

async fn submit(state: &AppState, jar: &CookieJar, body: Value) -> SmartResult<SubmissionReceipt> {
    let response = QuestionnaireResponse::from_value(body)?;
    let session = state
        .session_for(jar)
        .await
        .ok_or(SmartError::NotAuthenticated)?;
    state.service.submit_questionnaire_response(&session, response).await
}

fn status_for(err: &SmartError) -> StatusCode {
    match err {
        SmartError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        SmartError::Fhir(_) | SmartError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SmartError::FhirServer { .. } | SmartError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
