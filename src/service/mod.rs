//! Notification send path: resolve app, get token, push, fold failures.

use crate::client::ApiClient;
use crate::config::{AppRegistry, NoticeConfig};
use crate::credentials::CredentialCache;
use crate::error::NoticeResult;
use crate::message::{MessageResult, OutboundMessage, Recipients, SendRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Errcodes meaning the access token was rejected.
const TOKEN_REJECTED_CODES: [i64; 3] = [40014, 42001, 40001];

/// Errcode reported for failures that never reached the platform.
pub const LOCAL_FAILURE_CODE: i64 = -1;

pub struct NoticeService {
    registry: Arc<AppRegistry>,
    client: Arc<ApiClient>,
    cache: Arc<CredentialCache>,
    batch_interval: Duration,
}

impl NoticeService {
    pub fn new(registry: Arc<AppRegistry>, client: Arc<ApiClient>, cache: Arc<CredentialCache>) -> Self {
        Self {
            registry,
            client,
            cache,
            batch_interval: Duration::from_millis(100),
        }
    }

    /// Wire client, token cache and batch pacing from configuration.
    ///
    /// Fails on an out-of-range `token_cache.ttl_seconds`.
    pub fn from_config(config: &NoticeConfig, registry: Arc<AppRegistry>) -> anyhow::Result<Self> {
        let ttl = config.token_cache.ttl()?;
        let client = Arc::new(ApiClient::new(&config.api)?);
        let cache = Arc::new(
            CredentialCache::new(client.clone())
                .with_ttl(ttl)
                .with_single_flight(config.token_cache.single_flight),
        );
        Ok(Self::new(registry, client, cache)
            .with_batch_interval(Duration::from_millis(config.api.batch_interval_ms)))
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    /// Pause between messages of a batch
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    /// Text message to `to_user` (ids joined with `|`) via `app_name` or the default app.
    pub async fn send_text(&self, app_name: Option<&str>, to_user: &str, content: &str) -> MessageResult {
        let request = SendRequest::new(Recipients::users([to_user]), OutboundMessage::text(content));
        self.send_message(app_name, &request).await
    }

    /// Markdown message via `app_name` or the default app.
    pub async fn send_markdown(
        &self,
        app_name: Option<&str>,
        to_user: &str,
        content: &str,
    ) -> MessageResult {
        let request = SendRequest::new(Recipients::users([to_user]), OutboundMessage::markdown(content));
        self.send_message(app_name, &request).await
    }

    /// Send through `app_name`, or the default app when `None`.
    ///
    /// Never fails: configuration, credential and transport errors come back
    /// as a failed [`MessageResult`] with errcode -1.
    pub async fn send_message(&self, app_name: Option<&str>, request: &SendRequest) -> MessageResult {
        let app = app_name.unwrap_or_else(|| self.registry.default_app_name());
        match self.try_send(app, request).await {
            Ok(result) => result,
            Err(e) => {
                error!(app = %app, error = %e, "Message send failed");
                MessageResult::failure(LOCAL_FAILURE_CODE, e.to_string())
            }
        }
    }

    /// Send sequentially, pausing between messages. One result per request, in order.
    pub async fn batch_send(&self, app_name: Option<&str>, requests: &[SendRequest]) -> Vec<MessageResult> {
        let mut results = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            if i > 0 && !self.batch_interval.is_zero() {
                tokio::time::sleep(self.batch_interval).await;
            }
            results.push(self.send_message(app_name, request).await);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "Batch send complete"
        );
        results
    }

    async fn try_send(&self, app_name: &str, request: &SendRequest) -> NoticeResult<MessageResult> {
        if request.recipients.is_empty() {
            return Ok(MessageResult::failure(LOCAL_FAILURE_CODE, "no recipients"));
        }

        let credential = self.registry.get_app(app_name)?;
        let access_token = self.cache.get(&credential).await?;

        let result = self
            .client
            .send_message(&access_token, credential.agent_id, request)
            .await?;

        if result.success {
            info!(
                app = %app_name,
                agent_id = credential.agent_id,
                msg_type = request.message.msg_type(),
                "Message delivered"
            );
        } else if result
            .err_code
            .is_some_and(|code| TOKEN_REJECTED_CODES.contains(&code))
        {
            warn!(
                app = %app_name,
                err_code = ?result.err_code,
                "Access token rejected, invalidating cache entry"
            );
            self.cache.invalidate(&credential);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, NoticeConfig};
    use mockito::{Matcher, Server, ServerGuard};

    fn registry() -> Arc<AppRegistry> {
        let mut config = NoticeConfig::default();
        config.apps.insert(
            "default".to_string(),
            AppConfig {
                corp_id: "wxcorp".to_string(),
                secret: "s3cret".to_string(),
                agent_id: Some(1000002),
                token: "cbtoken".to_string(),
                aes_key: "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C".to_string(),
            },
        );
        config.apps.insert(
            "hr".to_string(),
            AppConfig {
                corp_id: "wxcorp".to_string(),
                secret: "hr-secret".to_string(),
                agent_id: Some(1000003),
                token: "cbtoken".to_string(),
                aes_key: "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C".to_string(),
            },
        );
        config.apps.insert(
            "broken".to_string(),
            AppConfig {
                corp_id: "wxcorp".to_string(),
                ..AppConfig::default()
            },
        );
        Arc::new(AppRegistry::new(&config))
    }

    fn service(server: &ServerGuard) -> (NoticeService, Arc<CredentialCache>) {
        let client = Arc::new(ApiClient::with_base_url(server.url()).unwrap());
        let cache = Arc::new(CredentialCache::new(client.clone()));
        let service = NoticeService::new(registry(), client, cache.clone())
            .with_batch_interval(Duration::ZERO);
        (service, cache)
    }

    async fn mock_gettoken(server: &mut ServerGuard, token: &str, hits: usize) -> mockito::Mock {
        server
            .mock("GET", Matcher::Regex(r"^/cgi-bin/gettoken".to_string()))
            .with_status(200)
            .with_body(format!(
                r#"{{"errcode":0,"errmsg":"ok","access_token":"{}","expires_in":7200}}"#,
                token
            ))
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_send_text_uses_cached_token() {
        let mut server = Server::new_async().await;
        let gettoken = mock_gettoken(&mut server, "ACCESS", 1).await;
        let send = server
            .mock("POST", Matcher::Regex(r"^/cgi-bin/message/send".to_string()))
            .match_query(Matcher::UrlEncoded("access_token".into(), "ACCESS".into()))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok","msgid":"M1"}"#)
            .expect(2)
            .create_async()
            .await;

        let (service, _) = service(&server);
        assert!(service.send_text(None, "zhangsan", "first").await.success);
        let second = service.send_markdown(None, "zhangsan", "**second**").await;
        assert!(second.success);
        assert_eq!(second.msg_id.as_deref(), Some("M1"));

        gettoken.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_token_invalidates_cache() {
        let mut server = Server::new_async().await;
        let _gettoken = mock_gettoken(&mut server, "STALE", 1).await;
        let _send = server
            .mock("POST", Matcher::Regex(r"^/cgi-bin/message/send".to_string()))
            .with_status(200)
            .with_body(r#"{"errcode":42001,"errmsg":"access_token expired"}"#)
            .create_async()
            .await;

        let (service, cache) = service(&server);
        let credential = registry().default_app().unwrap();

        let result = service.send_text(None, "zhangsan", "hi").await;
        assert!(!result.success);
        assert_eq!(result.err_code, Some(42001));
        assert!(cache.peek(&credential).is_none());
    }

    #[tokio::test]
    async fn test_other_platform_errors_keep_cache() {
        let mut server = Server::new_async().await;
        let _gettoken = mock_gettoken(&mut server, "ACCESS", 1).await;
        let _send = server
            .mock("POST", Matcher::Regex(r"^/cgi-bin/message/send".to_string()))
            .with_status(200)
            .with_body(r#"{"errcode":81013,"errmsg":"user & party & tag all invalid"}"#)
            .create_async()
            .await;

        let (service, cache) = service(&server);
        let credential = registry().default_app().unwrap();

        let result = service.send_text(None, "nobody", "hi").await;
        assert_eq!(result.err_code, Some(81013));
        assert!(cache.peek(&credential).is_some());
    }

    #[tokio::test]
    async fn test_gettoken_failure_folds_into_result() {
        let mut server = Server::new_async().await;
        let _gettoken = server
            .mock("GET", Matcher::Regex(r"^/cgi-bin/gettoken".to_string()))
            .with_status(200)
            .with_body(r#"{"errcode":40013,"errmsg":"invalid corpid"}"#)
            .create_async()
            .await;

        let (service, _) = service(&server);
        let result = service.send_text(None, "zhangsan", "hi").await;

        assert!(!result.success);
        assert_eq!(result.err_code, Some(LOCAL_FAILURE_CODE));
        assert!(result.err_msg.unwrap().contains("40013"));
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_apps_fold_into_result() {
        let server = Server::new_async().await;
        let (service, _) = service(&server);
        let request = SendRequest::new(Recipients::all(), OutboundMessage::text("hi"));

        for app in ["missing", "broken"] {
            let result = service.send_message(Some(app), &request).await;
            assert!(!result.success);
            assert_eq!(result.err_code, Some(LOCAL_FAILURE_CODE));
        }
    }

    #[tokio::test]
    async fn test_empty_recipients_rejected_locally() {
        let server = Server::new_async().await;
        let (service, _) = service(&server);
        let request = SendRequest::new(Recipients::default(), OutboundMessage::text("hi"));

        let result = service.send_message(None, &request).await;
        assert_eq!(result.err_code, Some(LOCAL_FAILURE_CODE));
        assert_eq!(result.err_msg.as_deref(), Some("no recipients"));
    }

    #[tokio::test]
    async fn test_from_config() {
        let mut server = Server::new_async().await;
        let _gettoken = mock_gettoken(&mut server, "ACCESS", 1).await;
        let _send = server
            .mock("POST", Matcher::Regex(r"^/cgi-bin/message/send".to_string()))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
            .create_async()
            .await;

        let mut config = NoticeConfig::default();
        config.api.base_url = server.url();
        config.api.batch_interval_ms = 0;
        let service = NoticeService::from_config(&config, registry()).unwrap();

        assert!(service.registry().has_app("default"));
        assert!(service.send_text(None, "zhangsan", "hi").await.success);
    }

    #[test]
    fn test_from_config_rejects_bad_ttl() {
        for ttl_seconds in [0, -1, 100_000_000_000_000, i64::MAX] {
            let mut config = NoticeConfig::default();
            config.token_cache.ttl_seconds = ttl_seconds;
            let err = NoticeService::from_config(&config, registry())
                .err()
                .unwrap_or_else(|| panic!("ttl_seconds = {} accepted", ttl_seconds));
            assert!(err.to_string().contains("ttl_seconds"));
        }
    }

    #[tokio::test]
    async fn test_text_and_markdown_through_named_app() {
        let mut server = Server::new_async().await;
        let _gettoken = server
            .mock("GET", Matcher::Regex(r"^/cgi-bin/gettoken".to_string()))
            .match_query(Matcher::UrlEncoded("corpsecret".into(), "hr-secret".into()))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok","access_token":"HR"}"#)
            .expect(1)
            .create_async()
            .await;
        let send = server
            .mock("POST", Matcher::Regex(r"^/cgi-bin/message/send".to_string()))
            .match_query(Matcher::UrlEncoded("access_token".into(), "HR".into()))
            .match_body(Matcher::PartialJson(serde_json::json!({ "agentid": 1000003 })))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok","msgid":"HR-1"}"#)
            .expect(2)
            .create_async()
            .await;

        let (service, _) = service(&server);
        assert!(service.send_text(Some("hr"), "wangwu", "welcome").await.success);
        assert!(service.send_markdown(Some("hr"), "wangwu", "**welcome**").await.success);

        let broken = service.send_text(Some("broken"), "wangwu", "welcome").await;
        assert_eq!(broken.err_code, Some(LOCAL_FAILURE_CODE));

        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_batch_send_preserves_order() {
        let mut server = Server::new_async().await;
        let _gettoken = mock_gettoken(&mut server, "ACCESS", 1).await;
        let _ok = server
            .mock("POST", Matcher::Regex(r"^/cgi-bin/message/send".to_string()))
            .match_body(Matcher::PartialJson(serde_json::json!({ "touser": "good" })))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok","msgid":"M"}"#)
            .create_async()
            .await;
        let _bad = server
            .mock("POST", Matcher::Regex(r"^/cgi-bin/message/send".to_string()))
            .match_body(Matcher::PartialJson(serde_json::json!({ "touser": "bad" })))
            .with_status(200)
            .with_body(r#"{"errcode":81013,"errmsg":"invalid user"}"#)
            .create_async()
            .await;

        let (service, _) = service(&server);
        let requests = vec![
            SendRequest::new(Recipients::users(["good"]), OutboundMessage::text("1")),
            SendRequest::new(Recipients::users(["bad"]), OutboundMessage::text("2")),
            SendRequest::new(Recipients::users(["good"]), OutboundMessage::text("3")),
        ];

        let results = service.batch_send(None, &requests).await;
        let outcome: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(outcome, vec![true, false, true]);
    }
}
