//! Configuration management for Sprocket
//!
//! Reads the environment-style settings a GitHub App needs (credentials,
//! webhook path, proxy URL, server address), loads manifest template files,
//! and defines the [`EnvUpdater`] seam through which newly provisioned
//! credentials are handed back to the host process.

pub mod config;
pub mod env;
pub mod error;
pub mod loader;
pub mod update;

pub use config::{
    AppCredentials, Config, DEFAULT_PORT, DEFAULT_WEBHOOK_PATH, keys, normalize_path,
    resolve_webhook_path,
};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use update::{EnvUpdate, EnvUpdater};
