//! App manifest assembly

use crate::Result;
use serde::{Deserialize, Serialize};
use sprocket_config::ConfigLoader;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Manifest keys Sprocket always sets itself
const RESERVED_KEYS: [&str; 4] = ["hook_attributes", "redirect_url", "callback_urls", "setup_url"];

/// User-editable part of a manifest, usually loaded from `app.json` or
/// `app.toml`.
///
/// Keys not modelled here are passed through to GitHub unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Homepage of the app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Shown on the setup page only; not sent to GitHub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,

    #[serde(default)]
    pub default_events: Vec<String>,

    /// Permission name to access level (`read`, `write`)
    #[serde(default)]
    pub default_permissions: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ManifestTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Load a template file; the format follows the extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(ConfigLoader::load_as(path)?)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.default_events.push(event.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>, access: impl Into<String>) -> Self {
        self.default_permissions
            .insert(permission.into(), access.into());
        self
    }

    /// Assemble the manifest posted to GitHub.
    ///
    /// Deliveries go to `webhook_url`; the browser round-trip returns to
    /// `base_url`. Extra keys that would clash with those URLs are dropped.
    pub fn build(&self, base_url: &str, webhook_url: &str) -> AppManifest {
        let base_url = base_url.trim_end_matches('/');
        let mut extra = self.extra.clone();
        for key in RESERVED_KEYS {
            if extra.remove(key).is_some() {
                warn!(key, "Ignoring manifest template key set by Sprocket");
            }
        }
        AppManifest {
            name: self.name.clone(),
            url: self.url.clone().unwrap_or_else(|| base_url.to_string()),
            hook_attributes: HookAttributes {
                url: webhook_url.to_string(),
                active: true,
            },
            redirect_url: format!("{}/setup/callback", base_url),
            callback_urls: vec![base_url.to_string()],
            setup_url: format!("{}/setup/success", base_url),
            description: self.description.clone(),
            public: self.public.unwrap_or(true),
            default_events: self.default_events.clone(),
            default_permissions: self.default_permissions.clone(),
            extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookAttributes {
    pub url: String,
    pub active: bool,
}

/// Manifest in the shape GitHub's app-creation form expects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    pub hook_attributes: HookAttributes,
    pub redirect_url: String,
    pub callback_urls: Vec<String>,
    pub setup_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub public: bool,
    pub default_events: Vec<String>,
    pub default_permissions: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AppManifest {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
