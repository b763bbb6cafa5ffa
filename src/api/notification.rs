//! Outbound notification API: `POST /api/notification/send/*`.
//!
//! Every route answers with the `MessageResult` of the send. A platform
//! rejection is still a 200 carrying `success: false`; only a malformed
//! request is turned away before reaching the service.

use crate::message::{Article, MessageResult, OutboundMessage, Recipients, SendRequest};
use crate::service::NoticeService;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for notification handlers
pub struct NotificationAppState {
    pub service: Arc<NoticeService>,
}

/// Body of `send/text` and `send/markdown`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendContentRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub to_user: String,
    pub app_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNewsRequest {
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub to_user: String,
    pub app_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextCardRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    pub btn_txt: Option<String>,
    #[serde(default)]
    pub to_user: String,
    pub app_name: Option<String>,
}

/// Body of `send/all`: text to every member of the app
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendToAllRequest {
    #[serde(default)]
    pub content: String,
    pub app_name: Option<String>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create notification API router
pub fn create_notification_router(state: NotificationAppState) -> Router {
    Router::new()
        .route("/api/notification/send/text", post(send_text))
        .route("/api/notification/send/markdown", post(send_markdown))
        .route("/api/notification/send/news", post(send_news))
        .route("/api/notification/send/textcard", post(send_textcard))
        .route("/api/notification/send/all", post(send_to_all))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// POST /api/notification/send/text
async fn send_text(
    State(state): State<Arc<NotificationAppState>>,
    Json(request): Json<SendContentRequest>,
) -> Result<Json<MessageResult>, NotificationError> {
    let content = required("content", &request.content)?;
    let to_user = required("toUser", &request.to_user)?;

    info!(to_user = %to_user, app = ?request.app_name, "Sending text notification");
    let result = state
        .service
        .send_text(request.app_name.as_deref(), to_user, content)
        .await;
    Ok(Json(result))
}

/// POST /api/notification/send/markdown
async fn send_markdown(
    State(state): State<Arc<NotificationAppState>>,
    Json(request): Json<SendContentRequest>,
) -> Result<Json<MessageResult>, NotificationError> {
    let content = required("content", &request.content)?;
    let to_user = required("toUser", &request.to_user)?;

    info!(to_user = %to_user, app = ?request.app_name, "Sending markdown notification");
    let result = state
        .service
        .send_markdown(request.app_name.as_deref(), to_user, content)
        .await;
    Ok(Json(result))
}

/// POST /api/notification/send/news
async fn send_news(
    State(state): State<Arc<NotificationAppState>>,
    Json(request): Json<SendNewsRequest>,
) -> Result<Json<MessageResult>, NotificationError> {
    let to_user = required("toUser", &request.to_user)?;
    if request.articles.is_empty() {
        return Err(NotificationError::MissingField("articles"));
    }
    for article in &request.articles {
        required("title", &article.title)?;
        required("url", &article.url)?;
    }

    info!(to_user = %to_user, articles = request.articles.len(), "Sending news notification");
    let send = SendRequest::new(
        Recipients::users([to_user]),
        OutboundMessage::News {
            articles: request.articles,
        },
    );
    let result = state
        .service
        .send_message(request.app_name.as_deref(), &send)
        .await;
    Ok(Json(result))
}

/// POST /api/notification/send/textcard
async fn send_textcard(
    State(state): State<Arc<NotificationAppState>>,
    Json(request): Json<SendTextCardRequest>,
) -> Result<Json<MessageResult>, NotificationError> {
    let title = required("title", &request.title)?;
    let description = required("description", &request.description)?;
    let url = required("url", &request.url)?;
    let to_user = required("toUser", &request.to_user)?;

    info!(to_user = %to_user, app = ?request.app_name, "Sending text card notification");
    let send = SendRequest::new(
        Recipients::users([to_user]),
        OutboundMessage::TextCard {
            title: title.to_string(),
            description: description.to_string(),
            url: url.to_string(),
            btn_txt: request.btn_txt.clone(),
        },
    );
    let result = state
        .service
        .send_message(request.app_name.as_deref(), &send)
        .await;
    Ok(Json(result))
}

/// POST /api/notification/send/all
async fn send_to_all(
    State(state): State<Arc<NotificationAppState>>,
    Json(request): Json<SendToAllRequest>,
) -> Result<Json<MessageResult>, NotificationError> {
    let content = required("content", &request.content)?;

    info!(app = ?request.app_name, "Sending text notification to all members");
    let send = SendRequest::new(Recipients::all(), OutboundMessage::text(content));
    let result = state
        .service
        .send_message(request.app_name.as_deref(), &send)
        .await;
    Ok(Json(result))
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, NotificationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NotificationError::MissingField(field));
    }
    Ok(value)
}

/// Notification API error types
#[derive(Debug)]
enum NotificationError {
    MissingField(&'static str),
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            NotificationError::MissingField(field) => {
                (StatusCode::BAD_REQUEST, format!("{} is required", field))
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
            }),
        )
            .into_response()
    }
}
