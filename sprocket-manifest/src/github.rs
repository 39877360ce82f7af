//! GitHub endpoints used by the manifest flow

use crate::{ProvisioningError, Result};
use async_trait::async_trait;
use reqwest::{Client, Url, header};
use serde::Deserialize;
use sprocket_config::{Config, EnvUpdate, keys};
use tracing::{debug, info};

const GITHUB_WEB_URL: &str = "https://github.com";
const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("sprocket/", env!("CARGO_PKG_VERSION"));

/// github.com or a GitHub Enterprise Server host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubHost {
    web_url: String,
    api_url: String,
}

impl GitHubHost {
    pub fn github_com() -> Self {
        Self {
            web_url: GITHUB_WEB_URL.to_string(),
            api_url: GITHUB_API_URL.to_string(),
        }
    }

    /// Enterprise host, with or without a scheme (`https` is assumed)
    pub fn enterprise(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        let web_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Self {
            api_url: format!("{}/api/v3", web_url),
            web_url,
        }
    }

    /// Explicit URLs, for tests and proxies
    pub fn custom(web_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            web_url: web_url.into(),
            api_url: api_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        match &config.ghe_host {
            Some(host) => Self::enterprise(host),
            None => Self::github_com(),
        }
    }

    pub fn web_url(&self) -> &str {
        &self.web_url
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Where the registration form posts the manifest
    pub fn create_app_url(&self, org: Option<&str>) -> String {
        match org {
            Some(org) => format!("{}/organizations/{}/settings/apps/new", self.web_url, org),
            None => format!("{}/settings/apps/new", self.web_url),
        }
    }
}

impl Default for GitHubHost {
    fn default() -> Self {
        Self::github_com()
    }
}

/// Credentials of a newly registered app
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub private_key: String,
    pub webhook_secret: String,
    pub client_id: String,
    pub client_secret: String,
    /// Page of the app on GitHub
    pub html_url: String,
}

impl Credentials {
    /// Configuration values to hand to the host process
    pub fn to_env(&self) -> EnvUpdate {
        EnvUpdate::from([
            (keys::APP_ID.to_string(), self.app_id.clone()),
            (keys::PRIVATE_KEY.to_string(), self.private_key.clone()),
            (keys::WEBHOOK_SECRET.to_string(), self.webhook_secret.clone()),
            (keys::GITHUB_CLIENT_ID.to_string(), self.client_id.clone()),
            (keys::GITHUB_CLIENT_SECRET.to_string(), self.client_secret.clone()),
        ])
    }

    /// Where to send the operator to install the new app
    pub fn installation_url(&self) -> String {
        format!("{}/installations/new", self.html_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("client_id", &self.client_id)
            .field("html_url", &self.html_url)
            .finish_non_exhaustive()
    }
}

/// Exchanges the one-time code from the manifest redirect for credentials
#[async_trait]
pub trait CodeExchange: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<Credentials>;
}

#[async_trait]
impl<T: CodeExchange + ?Sized> CodeExchange for std::sync::Arc<T> {
    async fn exchange(&self, code: &str) -> Result<Credentials> {
        (**self).exchange(code).await
    }
}

#[derive(Deserialize)]
struct Conversion {
    id: u64,
    pem: String,
    webhook_secret: Option<String>,
    client_id: String,
    client_secret: String,
    html_url: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Code exchange against the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubCodeExchange {
    api_url: String,
    client: Client,
}

impl GitHubCodeExchange {
    pub fn new(host: &GitHubHost) -> Self {
        Self::with_client(host, Client::new())
    }

    pub fn with_client(host: &GitHubHost, client: Client) -> Self {
        Self {
            api_url: host.api_url().to_string(),
            client,
        }
    }

    fn conversion_url(&self, code: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| ProvisioningError::Config(format!("invalid API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProvisioningError::Config("API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["app-manifests", code, "conversions"]);
        Ok(url)
    }
}

#[async_trait]
impl CodeExchange for GitHubCodeExchange {
    async fn exchange(&self, code: &str) -> Result<Credentials> {
        let url = self.conversion_url(code)?;
        debug!(url = %url, "Exchanging manifest code");

        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ProvisioningError::Exchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiError>()
                .await
                .map(|err| err.message)
                .unwrap_or_else(|_| "no details".to_string());
            return Err(ProvisioningError::Exchange(format!(
                "GitHub answered {}: {}",
                status, message
            )));
        }

        let conversion: Conversion = response
            .json()
            .await
            .map_err(|e| ProvisioningError::Exchange(format!("unexpected response: {}", e)))?;
        let webhook_secret = conversion.webhook_secret.ok_or_else(|| {
            ProvisioningError::Exchange("response carries no webhook secret".to_string())
        })?;

        info!(app_id = conversion.id, html_url = %conversion.html_url, "Registered GitHub App");
        Ok(Credentials {
            app_id: conversion.id.to_string(),
            private_key: conversion.pem,
            webhook_secret,
            client_id: conversion.client_id,
            client_secret: conversion.client_secret,
            html_url: conversion.html_url,
        })
    }
}
