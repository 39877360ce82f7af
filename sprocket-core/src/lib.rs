//! Sprocket runtime
//!
//! Hosts a GitHub App: an [`App`] instance owns the webhook secret, the event
//! router and the load state of app functions. [`WebhookMiddleware`] turns
//! POSTs on the webhook path into verified, dispatched events, and [`Server`]
//! binds it to a port, optionally forwarding deliveries from a
//! [`WebhookProxy`] channel.
//!
//! ```rust,no_run
//! use sprocket_core::{App, MiddlewareChain, Server, WebhookMiddleware, app_fn};
//! use sprocket_webhooks::WebhookEvent;
//!
//! # async fn run() -> sprocket_core::Result<()> {
//! let greet = app_fn(|app: &App| {
//!     app.on("issues.opened", |event: WebhookEvent| async move {
//!         tracing::info!(delivery = %event.id(), "issue opened");
//!         Ok(())
//!     });
//!     Ok(())
//! });
//!
//! let mut chain = MiddlewareChain::new();
//! chain.use_middleware(WebhookMiddleware::new(App::new("secret")).with_app_fn(greet));
//!
//! let mut server = Server::new(chain).with_port(3000);
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod deferred;
pub mod error;
pub mod http;
pub mod loader;
pub mod middleware;
pub mod proxy;
pub mod server;
pub mod webhook;

pub use app::App;
pub use deferred::{DeferredError, Promise, Resolver, deferred};
pub use error::Error;
pub use http::{HttpRequest, HttpResponse};
pub use loader::{AppFn, ApplicationFunction, app_fn};
pub use middleware::{HandlerFn, Middleware, MiddlewareChain, Next, ResponseFuture, not_found_handler};
pub use proxy::{SseMessage, SseParser, WebhookProxy, delivery_request};
pub use server::Server;
pub use webhook::WebhookMiddleware;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;
