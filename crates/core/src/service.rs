//! Sign-in flow façade.
//!
//! [`SmartService`] strings the pieces together in the order the user drives them:
//! sign-in redirect → callback → token exchange → resource fetch → view / questionnaire →
//! submission. The service holds no user state; each operation acts on the caller's
//! [`SessionStore`]. Failures in the callback path are logged and absorbed; the caller
//! renders whatever [`ViewState`] results.

use crate::auth::{authorize_url, new_state, TokenExchange};
use crate::fetcher::ResourceFetcher;
use crate::session::{FetchedResources, Panel, Session, SessionStore, TokenMetadata, ViewState};
use crate::submitter::{ResponseSubmitter, SubmissionReceipt};
use crate::{SmartConfig, SmartError, SmartResult};
use chrono::Utc;
use fhir::{QuestionnaireResponse, QuestionnaireTemplate};
use serde::Deserialize;
use smart_types::NonEmptyText;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Query parameters on the OAuth redirect back to the application.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Outcome of claiming a callback code under the session lock.
enum Claim {
    /// Nothing to exchange.
    Skip,
    /// This code was already handled.
    Duplicate,
    Exchange(NonEmptyText),
}

#[derive(Clone, Debug)]
pub struct SmartService {
    cfg: Arc<SmartConfig>,
    exchange: TokenExchange,
    fetcher: ResourceFetcher,
    submitter: ResponseSubmitter,
}

impl SmartService {
    /// Build the service and its shared HTTP client.
    pub fn new(cfg: Arc<SmartConfig>) -> SmartResult<Self> {
        let http = crate::http::build_client()?;
        Ok(Self {
            exchange: TokenExchange::new(http.clone(), cfg.clone()),
            fetcher: ResourceFetcher::new(http.clone(), cfg.clone()),
            submitter: ResponseSubmitter::new(http, cfg.clone()),
            cfg,
        })
    }

    pub fn config(&self) -> &SmartConfig {
        &self.cfg
    }

    /// Start sign-in: remember a fresh `state` in `session` and return the authorize URL.
    pub async fn begin_sign_in(&self, session: &SessionStore) -> Url {
        let state = new_state();
        let url = authorize_url(&self.cfg, &state);
        session.update(|s| s.pending_state = Some(state)).await;
        url
    }

    /// Handle the redirect back from the authorization server.
    ///
    /// Without a `code` nothing happens and the signed-out view is kept. A code is exchanged
    /// at most once; on success the configured resources are fetched. Errors are logged and
    /// the resulting view state is returned.
    pub async fn handle_callback(&self, session: &SessionStore, params: CallbackParams) -> ViewState {
        if let Err(e) = self.try_handle_callback(session, params).await {
            warn!("sign-in callback failed: {e}");
        }
        session.snapshot().await.view_state()
    }

    async fn try_handle_callback(
        &self,
        session: &SessionStore,
        params: CallbackParams,
    ) -> SmartResult<()> {
        if let Some(error) = params.error {
            let detail = params
                .error_description
                .map(|d| format!("{error}: {d}"))
                .unwrap_or(error);
            session.update(|s| s.pending_state = None).await;
            return Err(SmartError::AuthorizationDenied(detail));
        }

        let code = NonEmptyText::from_optional(params.code);
        let returned_state = params.state;

        let claim = session
            .update(|s| claim_code(s, code, returned_state.as_deref()))
            .await?;

        let code = match claim {
            Claim::Skip => return Ok(()),
            Claim::Duplicate => {
                info!("authorization code already handled");
                return Ok(());
            }
            Claim::Exchange(code) => code,
        };

        let token = self.exchange.exchange(&code).await?;
        let patient_id = NonEmptyText::from_optional(token.patient.clone());
        if patient_id.is_none() {
            warn!("{}", SmartError::MissingPatientContext);
        }

        let still_current = session
            .update(|s| {
                if s.authorization_code.as_ref() != Some(&code) {
                    return false;
                }
                s.access_token = Some(token.access_token.clone());
                s.patient_id = patient_id;
                s.token = TokenMetadata {
                    token_type: token.token_type.clone(),
                    scope: token.scope.clone(),
                    expires_in: token.expires_in,
                    id_token: token.id_token.clone(),
                    obtained_at: Some(Utc::now()),
                };
                true
            })
            .await;

        if still_current {
            self.refresh_resources(session).await;
        }
        Ok(())
    }

    /// Fetch the configured resources for the signed-in patient and store them.
    ///
    /// Does nothing unless both token and patient id are present.
    pub async fn refresh_resources(&self, session: &SessionStore) -> FetchedResources {
        let snapshot = session.snapshot().await;
        let Some((token, patient_id)) = snapshot.credentials() else {
            return FetchedResources::default();
        };

        let resources = self.fetcher.fetch_all(token, patient_id.as_str()).await;

        let stored = resources.clone();
        session
            .update(|s| {
                if s.access_token.as_ref() == Some(token) {
                    s.resources = stored;
                }
            })
            .await;

        resources
    }

    /// Switch the expanded panel. Ignored unless signed in.
    pub async fn select_panel(&self, session: &SessionStore, panel: Panel) -> ViewState {
        session
            .update(|s| {
                if matches!(s.view_state(), ViewState::SignedIn(_)) {
                    s.panel = panel;
                }
                s.view_state()
            })
            .await
    }

    /// The questionnaire to render, from the fetched Questionnaire resource.
    pub async fn questionnaire_template(&self, session: &SessionStore) -> Option<QuestionnaireTemplate> {
        session
            .snapshot()
            .await
            .resources
            .questionnaire
            .as_ref()
            .and_then(QuestionnaireTemplate::locate)
    }

    /// Annotate a completed response and submit it.
    ///
    /// `questionnaire` is filled from the rendered template (or the configured
    /// questionnaire id) and `subject` from the signed-in patient, each only when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::NotAuthenticated`] without a token; otherwise any submission
    /// error.
    pub async fn submit_questionnaire_response(
        &self,
        session: &SessionStore,
        mut response: QuestionnaireResponse,
    ) -> SmartResult<SubmissionReceipt> {
        let snapshot = session.snapshot().await;
        let token = snapshot
            .access_token
            .as_ref()
            .ok_or(SmartError::NotAuthenticated)?;

        annotate_response(&self.cfg, &snapshot, &mut response);
        self.submitter.submit(token, &response).await
    }

    /// Clear the session.
    pub async fn logout(&self, session: &SessionStore) {
        session.clear().await;
        info!("signed out");
    }
}

/// Claim `code` for exchange. The pending `state` is consumed only by a callback that
/// presents it, so a forged callback cannot cancel a sign-in in progress.
fn claim_code(
    session: &mut Session,
    code: Option<NonEmptyText>,
    returned_state: Option<&str>,
) -> SmartResult<Claim> {
    let Some(code) = code else {
        return Ok(Claim::Skip);
    };

    if session.authorization_code.as_ref() == Some(&code) {
        return Ok(Claim::Duplicate);
    }

    match (session.pending_state.as_deref(), returned_state) {
        (Some(expected), Some(actual)) if expected == actual => {}
        _ => return Err(SmartError::StateMismatch),
    }

    *session = Session {
        authorization_code: Some(code.clone()),
        ..Session::default()
    };
    Ok(Claim::Exchange(code))
}

fn annotate_response(cfg: &SmartConfig, session: &Session, response: &mut QuestionnaireResponse) {
    let questionnaire_ref = session
        .resources
        .questionnaire
        .as_ref()
        .and_then(QuestionnaireTemplate::locate)
        .and_then(|t| t.reference())
        .or_else(|| cfg.questionnaire_id().map(|id| format!("Questionnaire/{id}")));

    if let Some(reference) = questionnaire_ref {
        response.set_questionnaire_if_absent(&reference);
    }
    if let Some(patient_id) = &session.patient_id {
        response.set_subject_if_absent(patient_id.as_str());
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, FakeServer, Reply};
    use serde_json::{json, Value};

    fn token_reply() -> Reply {
        Reply::json(
            200,
            json!({
                "access_token": "tok-1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "patient/*.read",
                "patient": "p1"
            }),
        )
    }

    async fn full_server() -> FakeServer {
        FakeServer::start(vec![
            ("/oauth2/token", token_reply()),
            (
                "/fhir/R4/Patient/p1",
                Reply::json(200, json!({ "resourceType": "Patient", "id": "p1", "gender": "female" })),
            ),
            (
                "/fhir/R4/Questionnaire",
                Reply::json(
                    200,
                    json!({
                        "resourceType": "Bundle",
                        "entry": [{ "resource": { "resourceType": "Questionnaire", "id": "q1" } }]
                    }),
                ),
            ),
            (
                "/fhir/R4/CarePlan",
                Reply::json(200, json!({ "resourceType": "Bundle", "total": 0 })),
            ),
            (
                "/fhir/R4/QuestionnaireResponse",
                Reply::json(201, json!({ "resourceType": "QuestionnaireResponse", "id": "qr1" })),
            ),
        ])
        .await
    }

    fn service(server: &FakeServer) -> SmartService {
        SmartService::new(Arc::new(test_config(server))).unwrap()
    }

    fn state_of(url: &Url) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
    }

    fn callback(code: &str, state: Option<String>) -> CallbackParams {
        CallbackParams {
            code: Some(code.into()),
            state,
            ..Default::default()
        }
    }

    async fn sign_in(service: &SmartService, session: &SessionStore, code: &str) -> ViewState {
        let url = service.begin_sign_in(session).await;
        service
            .handle_callback(session, callback(code, state_of(&url)))
            .await
    }

    #[tokio::test]
    async fn callback_exchanges_code_and_fetches_resources() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();

        let view = sign_in(&service, &store, "code-1").await;

        assert_eq!(view, ViewState::SignedIn(Panel::Summary));
        let session = store.snapshot().await;
        assert_eq!(session.access_token.as_ref().unwrap().expose(), "tok-1");
        assert_eq!(session.patient_id.as_ref().unwrap().as_str(), "p1");
        assert_eq!(session.token.expires_in, Some(3600));
        assert!(session.token.obtained_at.is_some());
        assert_eq!(session.resources.patient.as_ref().unwrap()["gender"], "female");
        assert!(session.resources.questionnaire.is_some());
        assert!(session.resources.care_plan.is_some());

        assert_eq!(server.requests_to("/oauth2/token").len(), 1);
        assert_eq!(server.requests_to("/fhir/R4/Patient/p1").len(), 1);
        assert_eq!(server.requests_to("/fhir/R4/Questionnaire").len(), 1);
        assert_eq!(server.requests_to("/fhir/R4/CarePlan").len(), 1);
    }

    #[tokio::test]
    async fn string_expires_in_still_signs_in() {
        let server = FakeServer::start(vec![
            (
                "/oauth2/token",
                Reply::json(
                    200,
                    json!({ "access_token": "tok-1", "expires_in": "3600", "patient": "p1" }),
                ),
            ),
            (
                "/fhir/R4/Patient/p1",
                Reply::json(200, json!({ "resourceType": "Patient", "id": "p1" })),
            ),
        ])
        .await;
        let service = service(&server);
        let store = SessionStore::new();

        let view = sign_in(&service, &store, "code-1").await;

        assert_eq!(view, ViewState::SignedIn(Panel::Summary));
        let session = store.snapshot().await;
        assert_eq!(session.token.expires_in, Some(3600));
        assert!(session.resources.patient.is_some());
    }

    #[tokio::test]
    async fn no_code_means_no_exchange() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();

        let view = service
            .handle_callback(&store, CallbackParams::default())
            .await;

        assert_eq!(view, ViewState::SignedOut);
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn repeated_callback_does_not_exchange_twice() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();

        sign_in(&service, &store, "code-1").await;
        let view = service.handle_callback(&store, callback("code-1", None)).await;

        assert_eq!(view, ViewState::SignedIn(Panel::Summary));
        assert_eq!(server.requests_to("/oauth2/token").len(), 1);
    }

    #[tokio::test]
    async fn state_mismatch_skips_exchange() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();
        service.begin_sign_in(&store).await;

        let view = service
            .handle_callback(&store, callback("code-1", Some("forged".into())))
            .await;

        assert_eq!(view, ViewState::SignedOut);
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn forged_callback_does_not_cancel_pending_sign_in() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();
        let url = service.begin_sign_in(&store).await;

        let forged = service
            .handle_callback(&store, callback("attacker-code", Some("forged".into())))
            .await;
        assert_eq!(forged, ViewState::SignedOut);

        let view = service
            .handle_callback(&store, callback("code-1", state_of(&url)))
            .await;

        assert_eq!(view, ViewState::SignedIn(Panel::Summary));
        let posts = server.requests_to("/oauth2/token");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].form()["code"], "code-1");
    }

    #[tokio::test]
    async fn callback_without_pending_sign_in_is_rejected() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();

        service
            .handle_callback(&store, callback("code-1", Some("anything".into())))
            .await;

        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn concurrent_sign_ins_stay_separate() {
        let server = full_server().await;
        let service = service(&server);
        let first = SessionStore::new();
        let second = SessionStore::new();

        let first_url = service.begin_sign_in(&first).await;
        let second_url = service.begin_sign_in(&second).await;
        assert_ne!(state_of(&first_url), state_of(&second_url));

        let view = service
            .handle_callback(&first, callback("code-1", state_of(&first_url)))
            .await;

        assert_eq!(view, ViewState::SignedIn(Panel::Summary));
        assert_eq!(server.requests_to("/oauth2/token").len(), 1);
        let other = second.snapshot().await;
        assert_eq!(other.view_state(), ViewState::SignedOut);
        assert!(other.access_token.is_none());
        assert!(other.resources.is_empty());
        assert_eq!(other.pending_state, state_of(&second_url));
    }

    #[tokio::test]
    async fn authorization_error_skips_exchange() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();
        service.begin_sign_in(&store).await;

        let view = service
            .handle_callback(
                &store,
                CallbackParams {
                    error: Some("access_denied".into()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(view, ViewState::SignedOut);
        assert!(store.snapshot().await.pending_state.is_none());
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_exchange_leaves_patient_data_hidden() {
        let server = FakeServer::start(vec![(
            "/oauth2/token",
            Reply::json(401, json!({ "error": "invalid_client" })),
        )])
        .await;
        let service = service(&server);
        let store = SessionStore::new();

        let view = sign_in(&service, &store, "code-1").await;

        assert_eq!(view, ViewState::AwaitingToken);
        let session = store.snapshot().await;
        assert!(session.access_token.is_none());
        assert!(session.resources.is_empty());
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn token_without_patient_does_not_fetch() {
        let server = FakeServer::start(vec![(
            "/oauth2/token",
            Reply::json(200, json!({ "access_token": "tok-1", "token_type": "Bearer" })),
        )])
        .await;
        let service = service(&server);
        let store = SessionStore::new();

        let view = sign_in(&service, &store, "code-1").await;

        assert_eq!(view, ViewState::SignedIn(Panel::Summary));
        assert_eq!(server.requests().len(), 1);
        assert_eq!(server.requests()[0].path, "/oauth2/token");
    }

    #[tokio::test]
    async fn submission_is_annotated_and_posted_once() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();
        sign_in(&service, &store, "code-1").await;

        let response = QuestionnaireResponse::from_value(json!({
            "resourceType": "QuestionnaireResponse",
            "status": "completed"
        }))
        .unwrap();
        let receipt = service
            .submit_questionnaire_response(&store, response)
            .await
            .unwrap();

        assert_eq!(receipt.id.as_deref(), Some("qr1"));
        let posts = server.requests_to("/fhir/R4/QuestionnaireResponse");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].authorization.as_deref(), Some("Bearer tok-1"));
        let sent: Value = serde_json::from_str(&posts[0].body).unwrap();
        assert_eq!(sent["questionnaire"], "Questionnaire/q1");
        assert_eq!(sent["subject"]["reference"], "Patient/p1");
        assert_eq!(sent["status"], "completed");
    }

    #[tokio::test]
    async fn submission_requires_sign_in() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();

        let response = QuestionnaireResponse::from_value(json!({})).unwrap();
        let err = service
            .submit_questionnaire_response(&store, response)
            .await
            .unwrap_err();

        assert!(matches!(err, SmartError::NotAuthenticated));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn panel_selection_only_applies_when_signed_in() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();

        assert_eq!(
            service.select_panel(&store, Panel::Questionnaire).await,
            ViewState::SignedOut
        );

        sign_in(&service, &store, "code-1").await;
        assert_eq!(
            service.select_panel(&store, Panel::Questionnaire).await,
            ViewState::SignedIn(Panel::Questionnaire)
        );
        assert_eq!(
            service.questionnaire_template(&store).await.unwrap().id(),
            Some("q1")
        );
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let server = full_server().await;
        let service = service(&server);
        let store = SessionStore::new();
        sign_in(&service, &store, "code-1").await;

        service.logout(&store).await;

        let session = store.snapshot().await;
        assert_eq!(session.view_state(), ViewState::SignedOut);
        assert!(session.access_token.is_none());
        assert!(session.resources.is_empty());
    }
}
