//! Manifest creation state machine
//!
//! ```text
//! Created -> ChannelReady -> AwaitingCode -> Exchanged
//!    |             |              |
//!    +-------------+--------------+--------> Failed
//! ```
//!
//! A flow with a public base URL may skip the channel and go straight from
//! `Created` to `AwaitingCode`.
//!
//! Any failure moves the flow to `Failed` and rejects the completion promise.
//! `Exchanged` and `Failed` are terminal: a new attempt needs a new
//! [`ManifestCreation`].

use crate::channel::{ChannelProvider, SmeeChannel};
use crate::github::{CodeExchange, Credentials, GitHubCodeExchange, GitHubHost};
use crate::manifest::ManifestTemplate;
use crate::{ProvisioningError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use sprocket_config::{Config, EnvUpdate, EnvUpdater, keys};
use sprocket_core::{Promise, Resolver, deferred};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a manifest flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestState {
    Created,
    ChannelReady,
    AwaitingCode,
    Exchanged,
    Failed,
}

impl ManifestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exchanged | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ChannelReady => "channel_ready",
            Self::AwaitingCode => "awaiting_code",
            Self::Exchanged => "exchanged",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ManifestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the setup page needs for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSession {
    pub webhook_proxy_url: Option<String>,
    pub manifest_json: String,
    pub create_app_url: String,
}

/// Awaitable outcome of a manifest flow
pub type Completion = Promise<Credentials, ProvisioningError>;

struct FlowState {
    state: ManifestState,
    webhook_proxy_url: Option<String>,
    completion: Option<Completion>,
    exchanging: bool,
}

/// Clears the in-flight exchange marker, including when the exchange future
/// is dropped part way.
struct ExchangeGuard<'a>(&'a Mutex<FlowState>);

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().exchanging = false;
    }
}

/// Drives one GitHub App registration.
///
/// Collaborators are injected: the channel provider (smee.io by default),
/// the code exchange (GitHub REST by default) and the [`EnvUpdater`] that
/// receives every configuration value the flow produces.
pub struct ManifestCreation {
    template: ManifestTemplate,
    base_url: String,
    org: Option<String>,
    host: GitHubHost,
    channel: Arc<dyn ChannelProvider>,
    exchange: Arc<dyn CodeExchange>,
    updater: Arc<dyn EnvUpdater>,
    resolver: Resolver<Credentials, ProvisioningError>,
    flow: Mutex<FlowState>,
}

impl ManifestCreation {
    /// Start a flow for `template`, reading base URL, GitHub host,
    /// organization and any existing proxy URL from `config`.
    ///
    /// With `WEBHOOK_PROXY_URL` already set the flow starts in
    /// `ChannelReady` and reuses that channel.
    pub fn new(
        template: ManifestTemplate,
        config: &Config,
        updater: impl EnvUpdater + 'static,
    ) -> Result<Self> {
        let host = GitHubHost::from_config(config);
        let (resolver, completion) = deferred();
        let state = match config.webhook_proxy_url {
            Some(_) => ManifestState::ChannelReady,
            None => ManifestState::Created,
        };

        Ok(Self {
            template,
            base_url: config.base_url(),
            org: config.gh_org.clone(),
            channel: Arc::new(SmeeChannel::new()?),
            exchange: Arc::new(GitHubCodeExchange::new(&host)),
            host,
            updater: Arc::new(updater),
            resolver,
            flow: Mutex::new(FlowState {
                state,
                webhook_proxy_url: config.webhook_proxy_url.clone(),
                completion: Some(completion),
                exchanging: false,
            }),
        })
    }

    pub fn with_channel_provider(mut self, channel: impl ChannelProvider + 'static) -> Self {
        self.channel = Arc::new(channel);
        self
    }

    pub fn with_code_exchange(mut self, exchange: impl CodeExchange + 'static) -> Self {
        self.exchange = Arc::new(exchange);
        self
    }

    /// Use another GitHub host; also re-targets the default code exchange
    pub fn with_host(mut self, host: GitHubHost) -> Self {
        self.exchange = Arc::new(GitHubCodeExchange::new(&host));
        self.host = host;
        self
    }

    pub fn state(&self) -> ManifestState {
        self.flow.lock().state
    }

    pub fn template(&self) -> &ManifestTemplate {
        &self.template
    }

    pub fn webhook_proxy_url(&self) -> Option<String> {
        self.flow.lock().webhook_proxy_url.clone()
    }

    pub fn create_app_url(&self) -> String {
        self.host.create_app_url(self.org.as_deref())
    }

    /// Take the completion promise. Only the first caller gets it.
    pub fn completion(&self) -> Option<Completion> {
        self.flow.lock().completion.take()
    }

    /// Open a forwarding channel and record it as `WEBHOOK_PROXY_URL`.
    ///
    /// Returns the existing URL when a channel is already open. Not retried:
    /// a failure is terminal for this flow.
    pub async fn create_webhook_channel(&self) -> Result<String> {
        {
            let flow = self.flow.lock();
            match flow.state {
                ManifestState::Created => {}
                ManifestState::ChannelReady | ManifestState::AwaitingCode
                    if flow.webhook_proxy_url.is_some() =>
                {
                    return Ok(flow.webhook_proxy_url.clone().unwrap_or_default());
                }
                actual => {
                    return Err(ProvisioningError::InvalidState {
                        operation: "create webhook channel",
                        actual,
                    });
                }
            }
        }

        let url = match self.channel.create_channel().await {
            Ok(url) => url,
            Err(err) => return Err(self.fail(err)),
        };

        {
            let mut flow = self.flow.lock();
            if flow.state.is_terminal() {
                return Err(ProvisioningError::InvalidState {
                    operation: "create webhook channel",
                    actual: flow.state,
                });
            }
            flow.webhook_proxy_url = Some(url.clone());
            if flow.state == ManifestState::Created {
                flow.state = ManifestState::ChannelReady;
            }
        }

        self.updater.update_env(&EnvUpdate::from([(
            keys::WEBHOOK_PROXY_URL.to_string(),
            url.clone(),
        )]));
        info!(channel = %url, state = %ManifestState::ChannelReady, "Webhook channel ready");
        Ok(url)
    }

    /// Assemble the manifest JSON. Deliveries target the proxy channel when
    /// one is open, the base URL otherwise.
    pub fn manifest(&self) -> Result<String> {
        let proxy = self.webhook_proxy_url();
        let webhook_url = proxy.unwrap_or_else(|| format!("{}/", self.base_url));
        self.template.build(&self.base_url, &webhook_url).to_json()
    }

    /// Produce the setup page data and wait for the operator's code.
    ///
    /// May be called again while awaiting the code, for page reloads.
    pub fn session(&self) -> Result<ManifestSession> {
        let state = self.state();
        if state.is_terminal() {
            return Err(ProvisioningError::InvalidState {
                operation: "serve setup page",
                actual: state,
            });
        }

        let session = ManifestSession {
            webhook_proxy_url: self.webhook_proxy_url(),
            manifest_json: self.manifest()?,
            create_app_url: self.create_app_url(),
        };

        let mut flow = self.flow.lock();
        if flow.state.is_terminal() {
            return Err(ProvisioningError::InvalidState {
                operation: "serve setup page",
                actual: flow.state,
            });
        }
        if flow.state != ManifestState::AwaitingCode {
            debug!(from = %flow.state, "Awaiting manifest code");
            flow.state = ManifestState::AwaitingCode;
        }
        Ok(session)
    }

    /// Exchange the one-time code GitHub redirected back with.
    ///
    /// On success the credentials go to the [`EnvUpdater`] and settle the
    /// completion promise. Any failure is terminal for this flow. Only one
    /// exchange runs at a time; a second call made while one is in flight
    /// is refused without touching the flow.
    pub async fn exchange_code(&self, code: &str) -> Result<Credentials> {
        let _guard = {
            let mut flow = self.flow.lock();
            if flow.state.is_terminal() {
                return Err(ProvisioningError::InvalidState {
                    operation: "exchange code",
                    actual: flow.state,
                });
            }
            if flow.exchanging {
                warn!(state = %flow.state, "Manifest code exchange already in progress");
                return Err(ProvisioningError::InvalidState {
                    operation: "exchange code while another exchange is in flight",
                    actual: flow.state,
                });
            }
            flow.exchanging = true;
            ExchangeGuard(&self.flow)
        };

        let credentials = match self.exchange.exchange(code).await {
            Ok(credentials) => credentials,
            Err(err) => return Err(self.fail(err)),
        };

        {
            let mut flow = self.flow.lock();
            if flow.state.is_terminal() {
                return Err(ProvisioningError::InvalidState {
                    operation: "exchange code",
                    actual: flow.state,
                });
            }
            flow.state = ManifestState::Exchanged;
        }

        self.updater.update_env(&credentials.to_env());
        self.resolver.resolve(credentials.clone());
        info!(app_id = %credentials.app_id, state = %ManifestState::Exchanged, "Manifest exchange complete");
        Ok(credentials)
    }

    /// Move to `Failed`, reject the completion and hand the error back
    fn fail(&self, err: ProvisioningError) -> ProvisioningError {
        {
            let mut flow = self.flow.lock();
            if flow.state.is_terminal() {
                return err;
            }
            flow.state = ManifestState::Failed;
        }
        error!(error = %err, state = %ManifestState::Failed, "Manifest creation failed");
        self.resolver.reject(err.clone());
        err
    }
}

impl fmt::Debug for ManifestCreation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestCreation")
            .field("state", &self.state())
            .field("base_url", &self.base_url)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
