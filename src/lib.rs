// Sprocket - a framework for building GitHub Apps
//
// Verified webhook delivery, ordered event routing and manifest-based app
// registration, built on tokio and hyper.

pub mod error;
pub mod runner;

pub use error::Error;
pub use runner::{Mode, Runner, SetupSession};

// Re-export the workspace crates
pub use sprocket_config as config;
pub use sprocket_core as runtime;
pub use sprocket_log as logging;
pub use sprocket_manifest as manifest;
pub use sprocket_webhooks as webhooks;

pub use sprocket_config::{Config, EnvUpdate, EnvUpdater};
pub use sprocket_core::{App, AppFn, ApplicationFunction, Server, WebhookMiddleware, app_fn};
pub use sprocket_manifest::{Credentials, ManifestCreation, ManifestTemplate};
pub use sprocket_webhooks::{BoxError, DispatchError, EventRouter, WebhookEvent};

/// Result type for running an app
pub type Result<T> = std::result::Result<T, Error>;
