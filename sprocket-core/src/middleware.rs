// Middleware system for request/response processing

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

/// Boxed response future
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// Type alias for the next handler in the middleware chain
pub type Next = Box<dyn FnOnce(HttpRequest) -> ResponseFuture + Send>;

/// Type alias for handler functions
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> ResponseFuture + Send + Sync>;

/// Middleware trait for processing requests before they reach the handler.
///
/// A middleware that does not own a request passes it on untouched by
/// calling `next(req)`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Middleware chain executor
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.use_arc(Arc::new(middleware));
    }

    /// Add a shared middleware to the chain
    pub fn use_arc(&mut self, middleware: Arc<dyn Middleware>) {
        Arc::make_mut(&mut self.middlewares).push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    /// Execute the chain, answering `404` when no middleware takes the request
    pub async fn handle(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        self.apply(req, not_found_handler()).await
    }

    fn execute_from(&self, index: usize, req: HttpRequest, handler: HandlerFn) -> ResponseFuture {
        let Some(middleware) = self.middlewares.get(index).cloned() else {
            trace!("No middleware left, calling handler");
            return handler(req);
        };

        let chain = self.clone();
        trace!(index, "Entering middleware");
        Box::pin(async move {
            let next: Next = Box::new(move |req| chain.execute_from(index + 1, req, handler));
            middleware.handle(req, next).await
        })
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal handler for requests no middleware claimed
pub fn not_found_handler() -> HandlerFn {
    Arc::new(|req: HttpRequest| {
        Box::pin(async move {
            trace!(path = %req.path, "No middleware handled request");
            Ok(HttpResponse::not_found().with_text("Not Found"))
        })
    })
}
