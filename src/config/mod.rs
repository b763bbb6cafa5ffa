pub mod registry;
pub use registry::AppRegistry;

use crate::credentials::MAX_TOKEN_TTL_SECONDS;
use crate::error::{NoticeError, NoticeResult};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Env var naming the TOML file to load
pub const CONFIG_PATH_ENV: &str = "WECOM_NOTICE_CONFIG";

/// Complete notifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NoticeConfig {
    /// Application used when a send does not name one
    #[serde(default = "default_app_name")]
    pub default_app: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub token_cache: TokenCacheConfig,
    /// Corp applications by name
    #[serde(default)]
    pub apps: HashMap<String, AppConfig>,
}

fn default_app_name() -> String {
    "default".to_string()
}

/// HTTP listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Serve `POST /api/notification/send/*`
    #[serde(default = "default_notification_api")]
    pub notification_api: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_notification_api() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            notification_api: default_notification_api(),
        }
    }
}

/// Callback portal
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_enabled")]
    pub enabled: bool,
    /// Route prefix; the app name is appended as the last segment
    #[serde(default = "default_portal_path")]
    pub path: String,
}

fn default_portal_enabled() -> bool {
    true
}

fn default_portal_path() -> String {
    "/wx/cp/portal".to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            enabled: default_portal_enabled(),
            path: default_portal_path(),
        }
    }
}

/// Platform API client
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Override to route through a proxy
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Pause between messages in a batch send
    #[serde(default = "default_batch_interval")]
    pub batch_interval_ms: u64,
}

fn default_base_url() -> String {
    "https://qyapi.weixin.qq.com".to_string()
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_read_timeout() -> u64 {
    30_000
}

fn default_batch_interval() -> u64 {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            batch_interval_ms: default_batch_interval(),
        }
    }
}

/// Access-token cache
#[derive(Debug, Clone, Deserialize)]
pub struct TokenCacheConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: i64,
    /// Coalesce concurrent refreshes of one key
    #[serde(default)]
    pub single_flight: bool,
}

fn default_ttl_seconds() -> i64 {
    crate::credentials::DEFAULT_TOKEN_TTL_SECONDS
}

impl TokenCacheConfig {
    /// `ttl_seconds` as a duration.
    ///
    /// # Errors
    /// * `Configuration` - `ttl_seconds` outside `1..=7200`
    pub fn ttl(&self) -> NoticeResult<chrono::Duration> {
        let invalid = || {
            NoticeError::Configuration(format!(
                "token_cache.ttl_seconds must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_SECONDS, self.ttl_seconds
            ))
        };
        if !(1..=MAX_TOKEN_TTL_SECONDS).contains(&self.ttl_seconds) {
            return Err(invalid());
        }
        chrono::Duration::try_seconds(self.ttl_seconds).ok_or_else(invalid)
    }
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            single_flight: false,
        }
    }
}

/// One corp application as written in the config file.
///
/// Every field is required; [`AppRegistry`] rejects blanks.
#[derive(Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub corp_id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub aes_key: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("corp_id", &self.corp_id)
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            default_app: default_app_name(),
            server: ServerConfig::default(),
            portal: PortalConfig::default(),
            api: ApiConfig::default(),
            token_cache: TokenCacheConfig::default(),
            apps: HashMap::new(),
        }
    }
}

impl NoticeConfig {
    /// Load from `$WECOM_NOTICE_CONFIG` (default `config.toml`), then apply env overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
        let mut config = load_config(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// `WECOM_NOTICE_BASE_URL` and `WECOM_NOTICE_BIND` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WECOM_NOTICE_BASE_URL") {
            if !v.trim().is_empty() {
                self.api.base_url = v;
            }
        }
        if let Ok(v) = std::env::var("WECOM_NOTICE_BIND") {
            if !v.trim().is_empty() {
                self.server.bind = v;
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<NoticeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: NoticeConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
