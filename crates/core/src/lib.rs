//! # SMART Core
//!
//! Client-side logic for a SMART-on-FHIR patient application.
//!
//! This crate owns the sign-in flow and every outbound call:
//! - OAuth2 authorization-code flow (authorize URL, `state` check, token exchange)
//! - Read-only FHIR fetches for the signed-in patient
//! - QuestionnaireResponse submission
//! - Session and view state for the single signed-in user
//!
//! **No HTTP server concerns**: routing, HTML rendering and the CLI belong in `api-rest` and
//! `smart-cli`.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod service;
pub mod session;
pub mod submitter;
pub mod widget;

#[cfg(test)]
mod test_support;

pub use auth::{TokenExchange, TokenResponse};
pub use config::{ConfigValues, Environment, SmartConfig};
pub use error::{SmartError, SmartResult};
pub use fetcher::{ResourceFetcher, ResourceRequest};
pub use service::{CallbackParams, SmartService};
pub use session::{
    FetchedResources, Panel, Session, SessionRegistry, SessionStore, TokenMetadata, ViewState,
};
pub use submitter::{ResponseSubmitter, SubmissionReceipt};
pub use widget::{FormAssets, FormRenderer, LhcForms};
