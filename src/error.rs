// Error types for running a Sprocket app

use sprocket_config::ConfigError;
use sprocket_core::DeferredError;
use sprocket_manifest::ProvisioningError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] sprocket_core::Error),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Setup ended without producing credentials
    #[error("Setup ended before the app was registered")]
    SetupAbandoned,
}

impl From<DeferredError<ProvisioningError>> for Error {
    fn from(err: DeferredError<ProvisioningError>) -> Self {
        match err {
            DeferredError::Rejected(err) => Error::Provisioning(err),
            DeferredError::Abandoned => Error::SetupAbandoned,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Runtime(sprocket_core::Error::Io(err))
    }
}
