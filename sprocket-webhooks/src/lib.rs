//! Webhook verification and event dispatch for Sprocket
//!
//! This crate turns raw GitHub webhook deliveries into dispatched events:
//!
//! - **Signature Verification**: HMAC-SHA256 over the untouched request body,
//!   compared in constant time against `x-hub-signature-256`
//! - **Event Routing**: ordered handler lists keyed by `name` or `name.action`,
//!   plus wildcard handlers
//! - **Error Aggregation**: every failing handler is reported in one
//!   [`DispatchError`]; a failure never stops the handlers after it
//!
//! # Example
//!
//! ```rust,no_run
//! use sprocket_webhooks::{Webhooks, WebhookEvent, sign};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let webhooks = Webhooks::new("secret");
//!
//! webhooks.router().on("issues.opened", |event: WebhookEvent| async move {
//!     println!("issue opened in delivery {}", event.id());
//!     Ok(())
//! });
//!
//! let body = br#"{"action":"opened"}"#;
//! let signature = sign("secret", body);
//! webhooks
//!     .verify_and_receive("delivery-1", "issues", Some(&signature), body)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod event;
mod receiver;
mod router;
mod signature;

pub use error::{BoxError, DispatchError, HandlerFailure, WebhookError};
pub use event::WebhookEvent;
pub use receiver::Webhooks;
pub use router::{ErrorHandler, EventHandler, EventRouter, WILDCARD};
pub use signature::{SIGNATURE_PREFIX, WebhookSignature, headers, sign, verify};

/// Result type for webhook operations
pub type Result<T> = std::result::Result<T, WebhookError>;
