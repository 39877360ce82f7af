// Error types for the Sprocket runtime

use sprocket_config::ConfigError;
use sprocket_webhooks::{DispatchError, WebhookError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Signature missing or not matching the body
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    /// One or more event handlers failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// An app function returned an error while loading
    #[error("Failed to load app function: {0}")]
    Load(String),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code to respond with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Authentication(_) => 401,
            Error::BadRequest(_) => 400,
            Error::NotFound(_) => 404,
            Error::Http(_) => 502,
            Error::Dispatch(_)
            | Error::Load(_)
            | Error::Configuration(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Internal(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Message safe to send back to the client.
    ///
    /// Server-side failures are collapsed to a generic message; their detail
    /// belongs in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::Authentication(_) => "Unauthorized".to_string(),
            Error::BadRequest(message) | Error::NotFound(message) => message.clone(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl From<WebhookError> for Error {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::SignatureMissing | WebhookError::SignatureInvalid => {
                Error::Authentication(err.to_string())
            }
            WebhookError::MissingHeaders(_) | WebhookError::PayloadError(_) => {
                Error::BadRequest(err.to_string())
            }
            WebhookError::Dispatch(dispatch) => Error::Dispatch(dispatch),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}
