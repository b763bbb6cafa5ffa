//! Access-token cache with a fixed TTL.
//!
//! Per key the entry moves `Absent → Fresh → Stale → Fresh …`. A fresh entry is
//! served without touching the network; anything else triggers one fetch
//! through the [`TokenFetcher`] and a wholesale replacement of the entry.

use super::{CachedAccessToken, TenantCredential};
use crate::error::{NoticeError, NoticeResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Platform tokens live 7200s; stop serving them a little earlier.
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 7000;

/// Platform token lifetime; caching longer serves dead tokens.
pub const MAX_TOKEN_TTL_SECONDS: i64 = 7200;

/// Remote source of access tokens (gettoken).
///
/// Implementations must not retry internally; retry policy belongs to the caller.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch_token(&self, credential: &TenantCredential) -> NoticeResult<String>;
}

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Access tokens keyed by `corp_id_agent_id`.
///
/// Constructed once and shared by `Arc`. Without single-flight, concurrent
/// misses on one key each fetch and the last insert wins; either token is valid.
pub struct CredentialCache {
    entries: DashMap<String, CachedAccessToken>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    fetcher: Arc<dyn TokenFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    single_flight: bool,
}

impl CredentialCache {
    /// Create a cache with the default TTL, the system clock and no coalescing.
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            entries: DashMap::new(),
            refresh_locks: DashMap::new(),
            fetcher,
            clock: Arc::new(SystemClock),
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS),
            single_flight: false,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serialize refreshes per key so concurrent misses cost one fetch.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Return a fresh token for `credential`, fetching one if needed.
    ///
    /// # Errors
    /// * `CredentialFetch` - the fetch failed; the cache is left unchanged
    pub async fn get(&self, credential: &TenantCredential) -> NoticeResult<String> {
        let key = credential.cache_key();

        if let Some(token) = self.lookup(&key) {
            debug!(app = %credential.app_name, "Using cached access token");
            return Ok(token);
        }

        if !self.single_flight {
            return self.refresh(key, credential).await;
        }

        let lock = self
            .refresh_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.lookup(&key) {
            debug!(app = %credential.app_name, "Access token refreshed by concurrent caller");
            return Ok(token);
        }

        self.refresh(key, credential).await
    }

    /// Drop the cached token so the next `get` refetches.
    pub fn invalidate(&self, credential: &TenantCredential) {
        let removed = self.entries.remove(&credential.cache_key()).is_some();
        info!(
            app = %credential.app_name,
            removed = removed,
            "Invalidated access token cache"
        );
    }

    /// Current entry for `credential`, fresh or not.
    pub fn peek(&self, credential: &TenantCredential) -> Option<CachedAccessToken> {
        self.entries
            .get(&credential.cache_key())
            .map(|entry| entry.clone())
    }

    /// Number of cached entries (including stale ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.access_token.clone())
    }

    async fn refresh(&self, key: String, credential: &TenantCredential) -> NoticeResult<String> {
        let access_token = self.fetcher.fetch_token(credential).await.map_err(|e| {
            warn!(
                app = %credential.app_name,
                corp_id = %credential.corp_id,
                agent_id = credential.agent_id,
                error = %e,
                "Failed to fetch access token"
            );
            match e {
                NoticeError::CredentialFetch(_) => e,
                other => NoticeError::CredentialFetch(other.to_string()),
            }
        })?;

        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| NoticeError::Configuration("token TTL overflows the clock".to_string()))?;
        self.entries.insert(
            key,
            CachedAccessToken {
                access_token: access_token.clone(),
                expires_at,
            },
        );

        info!(
            app = %credential.app_name,
            expires_at = %expires_at,
            "Fetched new access token"
        );
        Ok(access_token)
    }
}
