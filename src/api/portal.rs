//! Webhook portal: `GET|POST {path}/:app_name`.
//!
//! GET is the URL-verification handshake: the platform sends an encrypted
//! `echostr` and expects its plaintext back. POST delivers an encrypted
//! message whose ciphertext sits in the body's `<Encrypt>` element.
//!
//! Rejections carry one of three generic bodies and never the underlying
//! error; detail goes to the log only.

use crate::config::AppRegistry;
use crate::credentials::TenantCredential;
use crate::error::NoticeError;
use crate::message::CallbackMessage;
use crate::{crypto, signature, xml};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared state for portal handlers
pub struct PortalAppState {
    pub registry: Arc<AppRegistry>,
}

/// Query string sent by the platform on every callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub msg_signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub echostr: Option<String>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the portal router under `path` (e.g. `/wx/cp/portal`).
pub fn create_portal_router(state: PortalAppState, path: &str) -> Router {
    let route = format!("{}/:app_name", path.trim_end_matches('/'));
    Router::new()
        .route(&route, get(verify_url).post(receive_message))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// GET - URL verification handshake
async fn verify_url(
    State(state): State<Arc<PortalAppState>>,
    Path(app_name): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, PortalError> {
    let (msg_signature, timestamp, nonce) = required_params(&query)?;
    let echostr = non_blank(&query.echostr).ok_or(PortalError::InvalidRequest)?;
    let credential = resolve_app(&state, &app_name)?;

    if !signature::verify(&credential.token, msg_signature, timestamp, nonce, echostr) {
        warn!(app = %app_name, "URL verification signature mismatch");
        return Err(PortalError::InvalidSignature);
    }

    let plain = crypto::decrypt(echostr, &credential.aes_key).map_err(|e| {
        warn!(app = %app_name, error = %e, "Failed to decrypt echostr");
        PortalError::from(e)
    })?;

    info!(app = %app_name, "URL verification succeeded");
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], plain).into_response())
}

/// POST - encrypted message delivery
async fn receive_message(
    State(state): State<Arc<PortalAppState>>,
    Path(app_name): Path<String>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<Response, PortalError> {
    let (msg_signature, timestamp, nonce) = required_params(&query)?;
    let credential = resolve_app(&state, &app_name)?;

    let encrypted = xml::extract_field(&body, "Encrypt")
        .ok()
        .flatten()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            warn!(app = %app_name, "Callback body has no Encrypt element");
            PortalError::InvalidRequest
        })?;

    // Platform signs over the ciphertext; the empty-echo form is accepted too.
    let signed = signature::verify(&credential.token, msg_signature, timestamp, nonce, &encrypted)
        || signature::verify(&credential.token, msg_signature, timestamp, nonce, "");
    if !signed {
        warn!(app = %app_name, "Callback signature mismatch");
        return Err(PortalError::InvalidSignature);
    }

    let plain = crypto::decrypt_for_tenant(&encrypted, &credential.aes_key, &credential.corp_id)
        .map_err(|e| {
            match &e {
                NoticeError::TenantMismatch { .. } => warn!(
                    app = %app_name,
                    corp_id = %credential.corp_id,
                    error = %e,
                    "Callback bound to another tenant"
                ),
                _ => warn!(app = %app_name, error = %e, "Failed to decrypt callback"),
            }
            PortalError::from(e)
        })?;

    let fields = xml::parse_fields(&plain).map_err(PortalError::from)?;
    let message = CallbackMessage::from_fields(&fields).map_err(|e| {
        warn!(app = %app_name, error = %e, "Malformed callback fields");
        PortalError::from(e)
    })?;

    debug!(
        app = %app_name,
        kind = ?message.kind(),
        from = ?message.from_user_name,
        "Callback received"
    );

    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], plain).into_response())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn required_params(query: &CallbackQuery) -> Result<(&str, &str, &str), PortalError> {
    match (
        non_blank(&query.msg_signature),
        non_blank(&query.timestamp),
        non_blank(&query.nonce),
    ) {
        (Some(sig), Some(ts), Some(nonce)) => Ok((sig, ts, nonce)),
        _ => Err(PortalError::InvalidRequest),
    }
}

fn resolve_app(state: &PortalAppState, app_name: &str) -> Result<TenantCredential, PortalError> {
    state.registry.get_app(app_name).map_err(|e| {
        warn!(app = %app_name, error = %e, "Callback for unusable application");
        PortalError::UnknownApp
    })
}

/// Portal rejection kinds
#[derive(Debug, PartialEq)]
enum PortalError {
    InvalidSignature,
    InvalidRequest,
    UnknownApp,
}

impl From<NoticeError> for PortalError {
    fn from(err: NoticeError) -> Self {
        match err {
            NoticeError::SignatureMismatch => PortalError::InvalidSignature,
            NoticeError::Configuration(_) => PortalError::UnknownApp,
            NoticeError::Decrypt(_)
            | NoticeError::TenantMismatch { .. }
            | NoticeError::CredentialFetch(_)
            | NoticeError::Transport(_) => PortalError::InvalidRequest,
        }
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            PortalError::InvalidSignature => (StatusCode::FORBIDDEN, "invalid signature"),
            PortalError::InvalidRequest => (StatusCode::BAD_REQUEST, "invalid request"),
            PortalError::UnknownApp => (StatusCode::NOT_FOUND, "unknown application"),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message.to_string(),
            }),
        )
            .into_response()
    }
}
