//! Event router: ordered handler registry and dispatch

use crate::{BoxError, DispatchError, HandlerFailure, WebhookEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

/// Key that matches every event
pub const WILDCARD: &str = "*";

/// Handles one kind of webhook event.
///
/// Closures of the form `|event: WebhookEvent| async move { Ok(()) }` can be
/// registered directly through [`EventRouter::on`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BoxError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(WebhookEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BoxError> {
        (self.0)(event.clone()).await
    }
}

/// Observer notified with the aggregate error of a failed dispatch
pub type ErrorHandler = Arc<dyn Fn(&DispatchError) + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    error_handlers: Vec<ErrorHandler>,
}

/// Maps event keys to ordered handler lists.
///
/// Registration order is invocation order. Entries are only ever appended.
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventRouter {
    registry: Arc<RwLock<Registry>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for an event name (`push`) or `name.action`
    /// (`issues.opened`).
    pub fn on<F, Fut>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_handler(key, Arc::new(FnHandler(handler)));
    }

    /// Register a handler object
    pub fn on_handler(&self, key: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let key = key.into();
        debug!(event = %key, "Registering event handler");
        self.registry
            .write()
            .handlers
            .entry(key)
            .or_default()
            .push(handler);
    }

    /// Register one closure under several keys
    pub fn on_many<F, Fut>(&self, keys: &[&str], handler: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: Arc<dyn EventHandler> = Arc::new(FnHandler(handler));
        for key in keys {
            self.on_handler(*key, handler.clone());
        }
    }

    /// Register a closure invoked for every event
    pub fn on_any<F, Fut>(&self, handler: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on(WILDCARD, handler);
    }

    /// Register an observer of failed dispatches
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.registry.write().error_handlers.push(Arc::new(handler));
    }

    /// Number of handlers registered under exactly `key`
    pub fn handler_count(&self, key: &str) -> usize {
        self.registry
            .read()
            .handlers
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Handlers for an event, in invocation order: `name.action`, then `name`,
    /// then wildcard handlers.
    fn resolve(&self, event: &WebhookEvent) -> Vec<(String, Arc<dyn EventHandler>)> {
        let registry = self.registry.read();
        let mut keys = Vec::with_capacity(3);
        if event.action().is_some() {
            keys.push(event.key());
        }
        keys.push(event.name().to_string());
        keys.push(WILDCARD.to_string());

        keys.into_iter()
            .flat_map(|key| {
                registry
                    .handlers
                    .get(&key)
                    .into_iter()
                    .flatten()
                    .map(move |handler| (key.clone(), handler.clone()))
            })
            .collect()
    }

    /// Dispatch an event to its handlers.
    ///
    /// Handlers run one after another. A failing handler does not stop the
    /// ones after it; once all have run, every failure is returned in a single
    /// [`DispatchError`]. An event without handlers succeeds.
    pub async fn receive(&self, event: WebhookEvent) -> Result<(), DispatchError> {
        let handlers = self.resolve(&event);
        if handlers.is_empty() {
            trace!(event = %event.key(), "No handlers registered");
            return Ok(());
        }

        debug!(
            event = %event.key(),
            delivery_id = %event.id(),
            handlers = handlers.len(),
            "Dispatching event"
        );

        let mut failures = Vec::new();
        for (position, (key, handler)) in handlers.into_iter().enumerate() {
            if let Err(error) = handler.handle(&event).await {
                failures.push(HandlerFailure {
                    key,
                    position,
                    error,
                });
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        let error = DispatchError::new(event.key(), event.id(), failures);
        let observers = self.registry.read().error_handlers.clone();
        for observer in observers {
            observer(&error);
        }
        Err(error)
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        let mut keys: Vec<&String> = registry.handlers.keys().collect();
        keys.sort();
        f.debug_struct("EventRouter")
            .field("keys", &keys)
            .field("error_handlers", &registry.error_handlers.len())
            .finish()
    }
}
