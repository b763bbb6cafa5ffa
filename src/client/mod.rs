//! HTTP client for the platform's `cgi-bin` API.
//!
//! Two calls are used: `gettoken` to mint access tokens, and `message/send`
//! to push application messages. Every response carries `errcode`/`errmsg`;
//! a non-zero `errcode` is a platform-level failure even on HTTP 200.

use crate::config::ApiConfig;
use crate::credentials::{TenantCredential, TokenFetcher};
use crate::error::{NoticeError, NoticeResult};
use crate::message::{MessageResult, SendRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Envelope shared by all platform responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub msgid: Option<String>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.errcode == 0
    }
}

pub struct ApiClient {
    http_client: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client with the configured base URL and timeouts.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("wecom-notice/1.0")
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Default timeouts against a custom base URL (for testing with a mock server).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let config = ApiConfig {
            base_url: base_url.into(),
            ..ApiConfig::default()
        };
        Self::new(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange corp id and secret for an access token.
    ///
    /// # Errors
    /// * `CredentialFetch` - transport failure, non-zero errcode, or no token in the reply
    pub async fn fetch_access_token(&self, corp_id: &str, secret: &str) -> NoticeResult<String> {
        let url = format!(
            "{}/cgi-bin/gettoken?corpid={}&corpsecret={}",
            self.base_url,
            urlencoding::encode(corp_id),
            urlencoding::encode(secret)
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| NoticeError::CredentialFetch(format!("gettoken request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NoticeError::CredentialFetch(format!(
                "gettoken returned HTTP {}",
                status
            )));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| NoticeError::CredentialFetch(format!("invalid gettoken response: {}", e.without_url())))?;

        if !body.is_success() {
            return Err(NoticeError::CredentialFetch(format!(
                "errcode {}: {}",
                body.errcode, body.errmsg
            )));
        }

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NoticeError::CredentialFetch("gettoken returned no access_token".to_string()))?;

        debug!(corp_id = %corp_id, expires_in = ?body.expires_in, "Fetched access token");
        Ok(token)
    }

    /// Push one message.
    ///
    /// A platform rejection comes back as a failed [`MessageResult`]; only a
    /// transport problem is an `Err`.
    pub async fn send_message(
        &self,
        access_token: &str,
        agent_id: i64,
        request: &SendRequest,
    ) -> NoticeResult<MessageResult> {
        let url = format!(
            "{}/cgi-bin/message/send?access_token={}",
            self.base_url,
            urlencoding::encode(access_token)
        );

        let response = self
            .http_client
            .post(&url)
            .json(&request.to_payload(agent_id))
            .send()
            .await
            .map_err(|e| NoticeError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NoticeError::Transport(format!("message/send returned HTTP {}", status)));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| NoticeError::Transport(format!("invalid message/send response: {}", e.without_url())))?;

        if body.is_success() {
            debug!(agent_id, msg_type = request.message.msg_type(), "Message sent");
            Ok(MessageResult::success(body.msgid))
        } else {
            warn!(
                agent_id,
                errcode = body.errcode,
                errmsg = %body.errmsg,
                "Platform rejected message"
            );
            Ok(MessageResult::failure(body.errcode, body.errmsg))
        }
    }
}

#[async_trait]
impl TokenFetcher for ApiClient {
    async fn fetch_token(&self, credential: &TenantCredential) -> NoticeResult<String> {
        self.fetch_access_token(&credential.corp_id, &credential.secret)
            .await
    }
}
