//! GitHub App registration through the manifest flow
//!
//! When an app starts without credentials, [`ManifestCreation`] walks the
//! operator through registering it: a public forwarding channel is opened
//! ([`SmeeChannel`] by default), [`SetupMiddleware`] serves a page whose form
//! posts the assembled manifest to GitHub, and the one-time code GitHub
//! redirects back with is exchanged for [`Credentials`]
//! ([`GitHubCodeExchange`] by default). New configuration values are handed
//! to an [`EnvUpdater`](sprocket_config::EnvUpdater); persisting them is up
//! to the host.

mod channel;
mod creation;
mod error;
mod github;
mod manifest;
mod setup;

pub use channel::{ChannelProvider, SMEE_NEW_URL, SmeeChannel};
pub use creation::{Completion, ManifestCreation, ManifestSession, ManifestState};
pub use error::{ProvisioningError, Result};
pub use github::{CodeExchange, Credentials, GitHubCodeExchange, GitHubHost};
pub use manifest::{AppManifest, HookAttributes, ManifestTemplate};
pub use setup::{
    CALLBACK_PATH, JsonRenderer, SETUP_PATH, SUCCESS_PATH, SetupMiddleware, SetupView,
    SuccessView, ViewRenderer,
};
