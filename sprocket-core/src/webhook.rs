//! Webhook middleware

use crate::loader::AppFn;
use crate::middleware::{Middleware, Next};
use crate::{App, Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use sprocket_config::{DEFAULT_WEBHOOK_PATH, normalize_path};
use sprocket_webhooks::{WebhookError, headers};
use tracing::{debug, error, warn};

/// Serves webhook deliveries on one path and passes everything else on.
///
/// The first request through the middleware loads the configured app
/// functions, so registration happens on first traffic rather than at bind.
pub struct WebhookMiddleware {
    app: App,
    path: String,
    functions: Vec<AppFn>,
}

impl WebhookMiddleware {
    pub fn new(app: App) -> Self {
        Self {
            app,
            path: DEFAULT_WEBHOOK_PATH.to_string(),
            functions: Vec::new(),
        }
    }

    /// Serve deliveries on `path` (`/` is allowed)
    pub fn with_path(mut self, path: impl AsRef<str>) -> Self {
        self.path = normalize_path(path.as_ref());
        self
    }

    /// App function to load on first request
    pub fn with_app_fn(mut self, function: AppFn) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_app_fns(mut self, functions: impl IntoIterator<Item = AppFn>) -> Self {
        self.functions.extend(functions);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    fn matches(&self, path: &str) -> bool {
        normalize_path(path) == self.path
    }

    async fn ensure_loaded(&self) -> Result<(), Error> {
        let first = !self.functions.iter().all(|f| self.app.is_loaded(f));
        self.app.load_all(&self.functions).await?;
        if first {
            self.app.log_ready();
        }
        Ok(())
    }

    async fn receive(&self, req: &HttpRequest) -> Result<(), Error> {
        let event = req.header(headers::EVENT);
        let delivery = req.header(headers::DELIVERY);

        let (Some(name), Some(id)) = (event, delivery) else {
            let mut missing = Vec::new();
            if event.is_none() {
                missing.push(headers::EVENT);
            }
            if delivery.is_none() {
                missing.push(headers::DELIVERY);
            }
            return Err(WebhookError::MissingHeaders(missing).into());
        };

        debug!(event = %name, delivery_id = %id, "Received webhook delivery");
        self.app
            .verify_and_receive(id, name, req.header(headers::SIGNATURE_256), &req.body)
            .await
    }
}

#[async_trait]
impl Middleware for WebhookMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let loaded = self.ensure_loaded().await;

        if !self.matches(&req.path) {
            return next(req).await;
        }

        if let Err(err) = loaded {
            error!(error = %err, "App functions failed to load, rejecting delivery");
            return Ok(HttpResponse::from_error(&err));
        }

        if !req.is_method("POST") {
            return Ok(HttpResponse::not_found().with_text("Unknown route"));
        }

        match self.receive(&req).await {
            Ok(()) => Ok(HttpResponse::ok().with_text("ok\n")),
            Err(Error::Dispatch(dispatch)) => {
                for failure in dispatch.failures() {
                    error!(
                        event = %dispatch.event(),
                        delivery_id = %dispatch.delivery_id(),
                        handler = %failure.key,
                        position = failure.position,
                        error = %failure.error,
                        "Webhook handler failed"
                    );
                }
                Ok(HttpResponse::from_error(&Error::Dispatch(dispatch)))
            }
            Err(err) => {
                warn!(
                    delivery_id = req.header(headers::DELIVERY).unwrap_or("-"),
                    status = err.status_code(),
                    error = %err,
                    "Rejected webhook delivery"
                );
                Ok(HttpResponse::from_error(&err))
            }
        }
    }
}
