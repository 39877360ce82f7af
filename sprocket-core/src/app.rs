//! The app runtime instance

use crate::loader::{AppFn, LoadRegistry};
use crate::Result;
use sprocket_config::{AppCredentials, Config};
use sprocket_webhooks::{BoxError, DispatchError, EventRouter, WebhookEvent, Webhooks};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

struct AppInner {
    app_id: Option<String>,
    webhooks: Webhooks,
    loads: LoadRegistry,
}

/// A running GitHub App: webhook secret, event router and load state.
///
/// Clones are handles to the same instance. App functions are loaded at most
/// once per instance.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Create an app verifying deliveries with `webhook_secret`
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self::build(None, webhook_secret.into())
    }

    /// Create an app from provisioned credentials
    pub fn from_credentials(credentials: &AppCredentials) -> Self {
        Self::build(
            Some(credentials.app_id.clone()),
            credentials.webhook_secret.clone(),
        )
    }

    /// Create an app from configuration.
    ///
    /// Fails before anything is served when a required credential is missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = config.credentials()?;
        Ok(Self::from_credentials(&credentials))
    }

    fn build(app_id: Option<String>, webhook_secret: String) -> Self {
        Self {
            inner: Arc::new(AppInner {
                app_id,
                webhooks: Webhooks::new(webhook_secret),
                loads: LoadRegistry::default(),
            }),
        }
    }

    pub fn app_id(&self) -> Option<&str> {
        self.inner.app_id.as_deref()
    }

    pub fn router(&self) -> &EventRouter {
        self.inner.webhooks.router()
    }

    pub fn webhooks(&self) -> &Webhooks {
        &self.inner.webhooks
    }

    /// Register a handler for `name` or `name.action`
    pub fn on<F, Fut>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.router().on(key, handler);
    }

    /// Register a handler for every event
    pub fn on_any<F, Fut>(&self, handler: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.router().on_any(handler);
    }

    /// Register an observer of failed dispatches
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.router().on_error(handler);
    }

    /// Run an app function against this instance unless it already ran
    pub async fn load(&self, function: &AppFn) -> Result<()> {
        self.inner.loads.load(self, function).await
    }

    /// Load app functions in order; stops at the first failure
    pub async fn load_all(&self, functions: &[AppFn]) -> Result<()> {
        for function in functions {
            self.load(function).await?;
        }
        Ok(())
    }

    pub fn is_loaded(&self, function: &AppFn) -> bool {
        self.inner.loads.is_loaded(function)
    }

    /// Number of distinct app functions this instance has seen
    pub fn loaded_count(&self) -> usize {
        self.inner.loads.len()
    }

    /// Dispatch an already verified event
    pub async fn receive(&self, event: WebhookEvent) -> std::result::Result<(), DispatchError> {
        self.router().receive(event).await
    }

    /// Verify a raw delivery against the webhook secret and dispatch it
    pub async fn verify_and_receive(
        &self,
        id: &str,
        name: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<()> {
        self.inner
            .webhooks
            .verify_and_receive(id, name, signature, body)
            .await?;
        Ok(())
    }

    pub(crate) fn log_ready(&self) {
        info!(app_id = ?self.app_id(), "App ready to receive webhooks");
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("app_id", &self.inner.app_id)
            .field("router", self.router())
            .finish()
    }
}
