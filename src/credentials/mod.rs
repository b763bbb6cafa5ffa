//! Tenant credentials and the access-token cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       NoticeService (send path)          │
//! └─────────────────────────────────────────┘
//!          ↓ get(credential)      ↑ token
//! ┌─────────────────────────────────────────┐
//! │       CredentialCache                    │
//! │  - DashMap keyed by corp_id + agent_id   │
//! │  - Fixed TTL, whole-entry replacement    │
//! └─────────────────────────────────────────┘
//!          ↓ miss / stale
//! ┌─────────────────────────────────────────┐
//! │       TokenFetcher (ApiClient)           │
//! │  - GET /cgi-bin/gettoken                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use wecom_notice::client::ApiClient;
//! use wecom_notice::config::ApiConfig;
//! use wecom_notice::credentials::{CredentialCache, TenantCredential};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = Arc::new(ApiClient::new(&ApiConfig::default())?);
//! let cache = CredentialCache::new(client);
//!
//! let credential = TenantCredential {
//!     app_name: "alerts".to_string(),
//!     corp_id: "wx5823bf96d3bd56c7".to_string(),
//!     agent_id: 1000002,
//!     secret: "corp-secret".to_string(),
//!     token: "callback-token".to_string(),
//!     aes_key: "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C".to_string(),
//! };
//!
//! let access_token = cache.get(&credential).await?;
//! # let _ = access_token;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::fmt;

mod cache;

pub use cache::{
    Clock, CredentialCache, SystemClock, TokenFetcher, DEFAULT_TOKEN_TTL_SECONDS,
    MAX_TOKEN_TTL_SECONDS,
};

/// Identity of one corp application.
///
/// Loaded once from configuration and never mutated afterwards.
#[derive(Clone, PartialEq)]
pub struct TenantCredential {
    /// Configuration name of the application
    pub app_name: String,

    /// Corp id; also the tenant suffix inside callback envelopes
    pub corp_id: String,

    /// Application (agent) id
    pub agent_id: i64,

    /// Application secret used for gettoken
    pub secret: String,

    /// Callback verification token
    pub token: String,

    /// Base64 EncodingAESKey for callback envelopes
    pub aes_key: String,
}

impl TenantCredential {
    /// Key used by the token cache.
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.corp_id, self.agent_id)
    }
}

// Secrets stay out of logs and panics.
impl fmt::Debug for TenantCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredential")
            .field("app_name", &self.app_name)
            .field("corp_id", &self.corp_id)
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

/// Access token plus the instant after which the cache stops serving it.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedAccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedAccessToken {
    /// Usable iff `now < expires_at`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
