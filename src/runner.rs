//! Choosing between setup mode and webhook mode

use crate::{Error, Result};
use sprocket_config::{Config, EnvUpdate, EnvUpdater, keys};
use sprocket_core::{App, AppFn, MiddlewareChain, Server, WebhookMiddleware};
use sprocket_manifest::{
    ChannelProvider, CodeExchange, Completion, ManifestCreation, ManifestTemplate,
    SetupMiddleware, ViewRenderer,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Which server a [`Runner`] starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Credentials are configured: verify and dispatch deliveries
    Webhooks,
    /// No credentials yet: serve the registration flow
    Setup,
}

/// Runs app functions as a GitHub App.
///
/// With `APP_ID`, `PRIVATE_KEY` and `WEBHOOK_SECRET` configured the webhook
/// server starts right away. Without them the runner serves the manifest
/// registration flow, waits for the exchanged credentials, then restarts in
/// webhook mode.
pub struct Runner {
    config: Config,
    functions: Vec<AppFn>,
    template: ManifestTemplate,
    updater: Arc<dyn EnvUpdater>,
    renderer: Option<Arc<dyn ViewRenderer>>,
    channel: Option<Arc<dyn ChannelProvider>>,
    exchange: Option<Arc<dyn CodeExchange>>,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            functions: Vec::new(),
            template: ManifestTemplate::default(),
            updater: Arc::new(|env: &EnvUpdate| {
                let keys: Vec<&str> = env.keys().map(String::as_str).collect();
                info!(?keys, "New configuration values available; persist them to keep them");
            }),
            renderer: None,
            channel: None,
            exchange: None,
        }
    }

    /// Read configuration from the environment and `.env`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Config::from_env()?))
    }

    /// Add an app function, loaded once on first request
    pub fn load(mut self, function: AppFn) -> Self {
        self.functions.push(function);
        self
    }

    /// Manifest used when registering a new app
    pub fn with_manifest(mut self, template: ManifestTemplate) -> Self {
        self.template = template;
        self
    }

    /// Receives configuration produced during setup
    pub fn with_env_updater(mut self, updater: impl EnvUpdater + 'static) -> Self {
        self.updater = Arc::new(updater);
        self
    }

    pub fn with_renderer(mut self, renderer: impl ViewRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn with_channel_provider(mut self, channel: impl ChannelProvider + 'static) -> Self {
        self.channel = Some(Arc::new(channel));
        self
    }

    pub fn with_code_exchange(mut self, exchange: impl CodeExchange + 'static) -> Self {
        self.exchange = Some(Arc::new(exchange));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        if self.config.has_credentials() {
            Mode::Webhooks
        } else {
            Mode::Setup
        }
    }

    /// Start the webhook server for `config`
    pub async fn start_webhooks(&self, config: &Config) -> Result<Server> {
        let app = App::from_config(config)?;
        let webhooks = WebhookMiddleware::new(app)
            .with_path(&config.webhook_path)
            .with_app_fns(self.functions.iter().cloned());

        let mut chain = MiddlewareChain::new();
        chain.use_middleware(webhooks);

        let mut server = Server::from_config(config, chain);
        let addr = server.start().await?;
        info!(addr = %addr, path = %config.webhook_path, "Receiving webhooks");
        Ok(server)
    }

    /// Open a proxy channel if none is configured and serve the setup pages
    pub async fn start_setup(&self) -> Result<SetupSession> {
        let updater = self.updater.clone();
        let mut creation = ManifestCreation::new(
            self.template.clone(),
            &self.config,
            move |env: &EnvUpdate| updater.update_env(env),
        )?;
        if let Some(channel) = &self.channel {
            creation = creation.with_channel_provider(channel.clone());
        }
        if let Some(exchange) = &self.exchange {
            creation = creation.with_code_exchange(exchange.clone());
        }

        let creation = Arc::new(creation);
        let completion = creation.completion().ok_or(Error::SetupAbandoned)?;
        if self.config.webhook_proxy_url.is_none() {
            creation.create_webhook_channel().await?;
        }

        let mut setup = SetupMiddleware::new(creation.clone());
        if let Some(renderer) = &self.renderer {
            setup = setup.with_renderer(renderer.clone());
        }
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(setup);

        let mut server = Server::new(chain).with_port(self.config.port);
        if let Some(host) = &self.config.host {
            server = server.with_host(host);
        }
        let addr = server.start().await?;
        info!(
            "Welcome! Register your GitHub App at {}/setup (listening on {})",
            self.config.base_url(),
            addr
        );

        Ok(SetupSession {
            config: self.config.clone(),
            creation,
            completion,
            server,
        })
    }

    /// Serve until interrupted with Ctrl-C
    pub async fn run(self) -> Result<()> {
        let _guard = sprocket_log::LogConfig::from_env().init();

        let config = match self.mode() {
            Mode::Webhooks => self.config.clone(),
            Mode::Setup => {
                let session = self.start_setup().await?;
                tokio::select! {
                    config = session.finish() => config?,
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                }
            }
        };

        let mut server = self.start_webhooks(&config).await?;
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for shutdown signal");
        }
        server.stop().await;
        Ok(())
    }
}

/// A running setup server and the flow it serves
pub struct SetupSession {
    config: Config,
    creation: Arc<ManifestCreation>,
    completion: Completion,
    server: Server,
}

impl SetupSession {
    pub fn creation(&self) -> &Arc<ManifestCreation> {
        &self.creation
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Wait for registration, stop the setup server and return the
    /// configuration extended with the new credentials.
    ///
    /// The setup server is stopped whether or not registration succeeded.
    pub async fn finish(self) -> Result<Config> {
        let SetupSession {
            config,
            creation,
            completion,
            mut server,
        } = self;

        let outcome = completion.await;
        server.stop().await;
        let credentials = outcome?;

        let mut update = credentials.to_env();
        if let Some(url) = creation.webhook_proxy_url() {
            update.insert(keys::WEBHOOK_PROXY_URL.to_string(), url);
        }
        info!(app_id = %credentials.app_id, "Setup complete, switching to webhook mode");
        Ok(config.with_updates(&update))
    }
}
