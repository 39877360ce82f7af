//! Application configuration read once at construction.

use crate::{ConfigError, EnvLoader, EnvUpdate, Result};
use std::collections::HashMap;
use std::fs;

/// Webhook path used when neither `WEBHOOK_PATH` nor `WEBHOOKS_PATH` is set.
pub const DEFAULT_WEBHOOK_PATH: &str = "/api/github/webhooks";

/// Port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3000;

/// Configuration keys understood by [`Config`].
pub mod keys {
    pub const APP_ID: &str = "APP_ID";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const PRIVATE_KEY_PATH: &str = "PRIVATE_KEY_PATH";
    pub const WEBHOOK_SECRET: &str = "WEBHOOK_SECRET";
    pub const WEBHOOK_PATH: &str = "WEBHOOK_PATH";
    /// Deprecated alias of [`WEBHOOK_PATH`].
    pub const WEBHOOKS_PATH: &str = "WEBHOOKS_PATH";
    pub const WEBHOOK_PROXY_URL: &str = "WEBHOOK_PROXY_URL";
    pub const HOST: &str = "HOST";
    pub const PORT: &str = "PORT";
    pub const BASE_URL: &str = "BASE_URL";
    pub const GHE_HOST: &str = "GHE_HOST";
    pub const GH_ORG: &str = "GH_ORG";
    pub const GITHUB_CLIENT_ID: &str = "GITHUB_CLIENT_ID";
    pub const GITHUB_CLIENT_SECRET: &str = "GITHUB_CLIENT_SECRET";
}

/// Credentials required to serve webhooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub app_id: String,
    pub private_key: String,
    pub webhook_secret: String,
}

/// Sprocket configuration.
///
/// Values are read once; there is no hot reload. Use [`Config::with_updates`]
/// to derive a new configuration after credentials have been provisioned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub app_id: Option<String>,
    pub private_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_path: String,
    pub webhook_proxy_url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub base_url: Option<String>,
    pub ghe_host: Option<String>,
    pub gh_org: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Config {
    /// Read the configuration from the environment, applying `.env` first.
    pub fn from_env() -> Result<Self> {
        let vars = EnvLoader::new().with_dotenv().load()?;
        Self::from_map(&vars)
    }

    /// Read the configuration from an explicit variable map.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let private_key = match get(keys::PRIVATE_KEY) {
            Some(key) => Some(unescape_private_key(&key)),
            None => match get(keys::PRIVATE_KEY_PATH) {
                Some(path) => Some(read_private_key(&path)?),
                None => None,
            },
        };

        let port = match get(keys::PORT) {
            Some(port) => port
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid(keys::PORT, e.to_string()))?,
            None => DEFAULT_PORT,
        };

        let webhook_proxy_url = get(keys::WEBHOOK_PROXY_URL);
        if let Some(url) = &webhook_proxy_url {
            require_http_url(keys::WEBHOOK_PROXY_URL, url)?;
        }

        let base_url = get(keys::BASE_URL).map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = &base_url {
            require_http_url(keys::BASE_URL, url)?;
        }

        Ok(Self {
            app_id: get(keys::APP_ID),
            private_key,
            webhook_secret: get(keys::WEBHOOK_SECRET),
            webhook_path: resolve_webhook_path(
                get(keys::WEBHOOK_PATH).as_deref(),
                get(keys::WEBHOOKS_PATH).as_deref(),
            ),
            webhook_proxy_url,
            host: get(keys::HOST),
            port,
            base_url,
            ghe_host: get(keys::GHE_HOST),
            gh_org: get(keys::GH_ORG),
            client_id: get(keys::GITHUB_CLIENT_ID),
            client_secret: get(keys::GITHUB_CLIENT_SECRET),
        })
    }

    /// The credentials needed to verify and dispatch webhooks.
    ///
    /// Fails with every missing key listed.
    pub fn credentials(&self) -> Result<AppCredentials> {
        let mut missing = Vec::new();
        for (key, value) in [
            (keys::APP_ID, &self.app_id),
            (keys::PRIVATE_KEY, &self.private_key),
            (keys::WEBHOOK_SECRET, &self.webhook_secret),
        ] {
            if value.is_none() {
                missing.push(key.to_string());
            }
        }

        match (&self.app_id, &self.private_key, &self.webhook_secret) {
            (Some(app_id), Some(private_key), Some(webhook_secret)) => Ok(AppCredentials {
                app_id: app_id.clone(),
                private_key: private_key.clone(),
                webhook_secret: webhook_secret.clone(),
            }),
            _ => Err(ConfigError::MissingKey(missing)),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials().is_ok()
    }

    /// Base URL the server is reachable at, derived from host and port when
    /// `BASE_URL` is not set.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.clone(),
            None => format!(
                "http://{}:{}",
                self.host.as_deref().unwrap_or("localhost"),
                self.port
            ),
        }
    }

    /// Apply values emitted by an [`EnvUpdater`](crate::EnvUpdater) call.
    ///
    /// Unknown keys are ignored.
    pub fn with_updates(&self, update: &EnvUpdate) -> Self {
        let mut next = self.clone();
        for (key, value) in update {
            let value = Some(value.clone());
            match key.as_str() {
                keys::APP_ID => next.app_id = value,
                keys::PRIVATE_KEY => next.private_key = value.map(|v| unescape_private_key(&v)),
                keys::WEBHOOK_SECRET => next.webhook_secret = value,
                keys::WEBHOOK_PROXY_URL => next.webhook_proxy_url = value,
                keys::GITHUB_CLIENT_ID => next.client_id = value,
                keys::GITHUB_CLIENT_SECRET => next.client_secret = value,
                _ => tracing::debug!(key = %key, "Ignoring unknown configuration update"),
            }
        }
        next
    }
}

/// Resolve the webhook path. The current key wins over the deprecated alias,
/// which wins over the default.
pub fn resolve_webhook_path(current: Option<&str>, deprecated: Option<&str>) -> String {
    if current.is_none() && deprecated.is_some() {
        tracing::warn!(
            "{} is deprecated, use {} instead",
            keys::WEBHOOKS_PATH,
            keys::WEBHOOK_PATH
        );
    }

    normalize_path(current.or(deprecated).unwrap_or(DEFAULT_WEBHOOK_PATH))
}

/// Ensure a leading slash and drop a trailing one, keeping `/` intact.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn unescape_private_key(key: &str) -> String {
    key.replace("\\n", "\n")
}

fn read_private_key(path: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| ConfigError::LoadError(format!("{}: {}", keys::PRIVATE_KEY_PATH, e)))
}

fn require_http_url(key: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, "must be an http(s) URL"))
    }
}
