//! Resolves configured applications into [`TenantCredential`]s.

use super::{AppConfig, NoticeConfig};
use crate::credentials::TenantCredential;
use crate::error::{NoticeError, NoticeResult};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Validated, immutable credentials per application name.
///
/// Apps are validated lazily on first lookup and memoized.
pub struct AppRegistry {
    default_app: String,
    apps: HashMap<String, AppConfig>,
    resolved: DashMap<String, TenantCredential>,
}

impl AppRegistry {
    pub fn new(config: &NoticeConfig) -> Self {
        Self {
            default_app: config.default_app.clone(),
            apps: config.apps.clone(),
            resolved: DashMap::new(),
        }
    }

    /// Credentials of the configured default application.
    pub fn default_app(&self) -> NoticeResult<TenantCredential> {
        if self.default_app.trim().is_empty() {
            return Err(NoticeError::Configuration(
                "default application name is not configured".to_string(),
            ));
        }
        self.get_app(&self.default_app)
    }

    pub fn default_app_name(&self) -> &str {
        &self.default_app
    }

    /// Credentials of `app_name`.
    ///
    /// # Errors
    /// * `Configuration` - blank name, unknown app, or a missing/blank field
    pub fn get_app(&self, app_name: &str) -> NoticeResult<TenantCredential> {
        if app_name.trim().is_empty() {
            return Err(NoticeError::Configuration(
                "application name must not be blank".to_string(),
            ));
        }

        if let Some(credential) = self.resolved.get(app_name) {
            return Ok(credential.clone());
        }

        let app = self.apps.get(app_name).ok_or_else(|| {
            NoticeError::Configuration(format!("no configuration for application '{}'", app_name))
        })?;

        let credential = validate(app_name, app)?;
        self.resolved
            .insert(app_name.to_string(), credential.clone());

        debug!(
            app = %app_name,
            corp_id = %credential.corp_id,
            agent_id = credential.agent_id,
            "Loaded application config"
        );

        Ok(credential)
    }

    /// All valid applications; invalid ones are skipped with a warning.
    pub fn all_apps(&self) -> HashMap<String, TenantCredential> {
        let mut all = HashMap::new();
        for name in self.apps.keys() {
            match self.get_app(name) {
                Ok(credential) => {
                    all.insert(name.clone(), credential);
                }
                Err(e) => warn!(app = %name, error = %e, "Skipping invalid application config"),
            }
        }
        all
    }

    pub fn has_app(&self, app_name: &str) -> bool {
        !app_name.trim().is_empty() && self.apps.contains_key(app_name)
    }
}

fn validate(app_name: &str, app: &AppConfig) -> NoticeResult<TenantCredential> {
    let required = |field: &str, value: &str| -> NoticeResult<String> {
        if value.trim().is_empty() {
            return Err(NoticeError::Configuration(format!(
                "application '{}' is missing {}",
                app_name, field
            )));
        }
        Ok(value.to_string())
    };

    let corp_id = required("corp_id", &app.corp_id)?;
    let secret = required("secret", &app.secret)?;
    let agent_id = app.agent_id.ok_or_else(|| {
        NoticeError::Configuration(format!("application '{}' is missing agent_id", app_name))
    })?;
    let token = required("token", &app.token)?;
    let aes_key = required("aes_key", &app.aes_key)?;

    Ok(TenantCredential {
        app_name: app_name.to_string(),
        corp_id,
        agent_id,
        secret,
        token,
        aes_key,
    })
}
