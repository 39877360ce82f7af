//! Public forwarding channels

use crate::{ProvisioningError, Result};
use async_trait::async_trait;
use reqwest::{Client, header, redirect};
use tracing::{debug, info};

/// Default smee.io endpoint that allocates a fresh channel
pub const SMEE_NEW_URL: &str = "https://smee.io/new";

/// Opens a public URL whose deliveries can be forwarded to a local server
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn create_channel(&self) -> Result<String>;
}

#[async_trait]
impl<T: ChannelProvider + ?Sized> ChannelProvider for std::sync::Arc<T> {
    async fn create_channel(&self) -> Result<String> {
        (**self).create_channel().await
    }
}

/// Channel provider backed by smee.io.
///
/// Requesting the `new` endpoint answers with a redirect whose `Location` is
/// the allocated channel; the redirect is read, not followed.
#[derive(Debug, Clone)]
pub struct SmeeChannel {
    new_url: String,
    client: Client,
}

impl SmeeChannel {
    pub fn new() -> Result<Self> {
        Self::with_url(SMEE_NEW_URL)
    }

    /// Use another smee-compatible service
    pub fn with_url(new_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            new_url: new_url.into(),
            client,
        })
    }
}

#[async_trait]
impl ChannelProvider for SmeeChannel {
    async fn create_channel(&self) -> Result<String> {
        debug!(url = %self.new_url, "Requesting webhook channel");
        let response = self
            .client
            .head(&self.new_url)
            .send()
            .await
            .map_err(|e| ProvisioningError::Channel(e.to_string()))?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.starts_with("http://") || value.starts_with("https://"))
            .ok_or_else(|| {
                ProvisioningError::Channel(format!(
                    "{} answered {} without a channel location",
                    self.new_url,
                    response.status()
                ))
            })?;

        info!(channel = %location, "Created webhook channel");
        Ok(location.to_string())
    }
}
