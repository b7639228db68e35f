//! Session and view state, one per browser.
//!
//! A [`Session`] is created by the sign-in callback, filled once by the token exchange and
//! cleared on logout. What the user sees is derived from it as a [`ViewState`], so a form
//! panel without a token cannot be represented. [`SessionRegistry`] keys sessions by an
//! opaque id that the web layer keeps in a cookie.

use chrono::{DateTime, Utc};
use fhir::ResourceKind;
use serde_json::Value;
use smart_types::{AccessToken, NonEmptyText};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Which section of the signed-in view is expanded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Panel {
    #[default]
    Summary,
    Profile,
    Questionnaire,
}

impl Panel {
    pub fn as_str(self) -> &'static str {
        match self {
            Panel::Summary => "summary",
            Panel::Profile => "profile",
            Panel::Questionnaire => "questionnaire",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "summary" => Some(Panel::Summary),
            "profile" => Some(Panel::Profile),
            "questionnaire" => Some(Panel::Questionnaire),
            _ => None,
        }
    }
}

/// What the user is currently shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewState {
    /// No authorization code yet: show the sign-in affordance.
    SignedOut,
    /// A code arrived but no token was obtained. Patient data stays hidden.
    AwaitingToken,
    /// Token present.
    SignedIn(Panel),
}

/// Token details kept alongside the access token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenMetadata {
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    /// OpenID Connect identity token, when `openid` was granted.
    pub id_token: Option<String>,
    pub obtained_at: Option<DateTime<Utc>>,
}

/// Raw resources fetched after sign-in. A failed fetch leaves its slot empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchedResources {
    pub patient: Option<Value>,
    pub questionnaire: Option<Value>,
    pub care_plan: Option<Value>,
}

impl FetchedResources {
    pub fn get(&self, kind: ResourceKind) -> Option<&Value> {
        match kind {
            ResourceKind::Patient => self.patient.as_ref(),
            ResourceKind::Questionnaire => self.questionnaire.as_ref(),
            ResourceKind::CarePlan => self.care_plan.as_ref(),
            ResourceKind::QuestionnaireResponse => None,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, value: Value) {
        match kind {
            ResourceKind::Patient => self.patient = Some(value),
            ResourceKind::Questionnaire => self.questionnaire = Some(value),
            ResourceKind::CarePlan => self.care_plan = Some(value),
            ResourceKind::QuestionnaireResponse => {
                tracing::warn!("ignoring QuestionnaireResponse in fetched resources");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patient.is_none() && self.questionnaire.is_none() && self.care_plan.is_none()
    }
}

/// Per-user sign-in state.
#[derive(Clone, Debug, Default)]
pub struct Session {
    /// `state` value sent with the authorize request, awaiting the callback.
    pub pending_state: Option<String>,
    pub authorization_code: Option<NonEmptyText>,
    pub access_token: Option<AccessToken>,
    pub patient_id: Option<NonEmptyText>,
    pub token: TokenMetadata,
    pub resources: FetchedResources,
    pub panel: Panel,
}

impl Session {
    pub fn view_state(&self) -> ViewState {
        match (&self.authorization_code, &self.access_token) {
            (_, Some(_)) => ViewState::SignedIn(self.panel),
            (Some(_), None) => ViewState::AwaitingToken,
            (None, None) => ViewState::SignedOut,
        }
    }

    /// Token and patient id, when both are present.
    pub fn credentials(&self) -> Option<(&AccessToken, &NonEmptyText)> {
        self.access_token.as_ref().zip(self.patient_id.as_ref())
    }
}

/// Shared handle to the session, cheap to clone into request handlers.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current session for rendering.
    pub async fn snapshot(&self) -> Session {
        self.inner.read().await.clone()
    }

    /// Apply `f` to the session under the write lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.inner.write().await;
        f(&mut session)
    }

    /// Drop everything, returning to [`ViewState::SignedOut`].
    pub async fn clear(&self) {
        *self.inner.write().await = Session::default();
    }
}

/// Sessions keyed by browser session id.
#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, SessionStore>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<SessionStore> {
        self.inner.read().await.get(id).cloned()
    }

    /// The session for `id`, or a new session under a fresh id when `id` is absent or unknown.
    pub async fn get_or_create(&self, id: Option<&str>) -> (String, SessionStore) {
        let mut sessions = self.inner.write().await;
        if let Some(id) = id {
            if let Some(store) = sessions.get(id) {
                return (id.to_owned(), store.clone());
            }
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        let store = SessionStore::new();
        sessions.insert(id.clone(), store.clone());
        (id, store)
    }

    pub async fn remove(&self, id: &str) -> Option<SessionStore> {
        self.inner.write().await.remove(id)
    }
}
