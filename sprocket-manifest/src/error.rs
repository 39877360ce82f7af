//! Provisioning errors

use sprocket_config::ConfigError;
use thiserror::Error;

/// Failures of the manifest flow.
///
/// Terminal for the setup attempt that raised them; nothing is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    /// The forwarding channel could not be created
    #[error("Failed to create webhook channel: {0}")]
    Channel(String),

    /// The one-time code could not be exchanged for credentials
    #[error("Failed to exchange manifest code: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Operation not allowed in state {actual}: {operation}")]
    InvalidState {
        operation: &'static str,
        actual: crate::ManifestState,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ProvisioningError {
    fn from(err: reqwest::Error) -> Self {
        ProvisioningError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ProvisioningError {
    fn from(err: serde_json::Error) -> Self {
        ProvisioningError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for ProvisioningError {
    fn from(err: ConfigError) -> Self {
        ProvisioningError::Config(err.to_string())
    }
}

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisioningError>;
