//! Setup-mode HTTP routes

use crate::{ManifestCreation, ProvisioningError};
use async_trait::async_trait;
use serde::Serialize;
use sprocket_core::{Error, HttpRequest, HttpResponse, Middleware, Next};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const SETUP_PATH: &str = "/setup";
pub const CALLBACK_PATH: &str = "/setup/callback";
pub const SUCCESS_PATH: &str = "/setup/success";

/// Data the registration page is rendered from.
///
/// The page's form POSTs `manifest` to `create_app_url` in a new browsing
/// context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupView {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub create_app_url: String,
    pub manifest: String,
}

/// Data for the page shown once the app is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessView {
    pub name: Option<String>,
}

/// Turns view data into responses; HTML templates live outside Sprocket
pub trait ViewRenderer: Send + Sync {
    fn render_setup(&self, view: &SetupView) -> Result<HttpResponse, Error>;
    fn render_success(&self, view: &SuccessView) -> Result<HttpResponse, Error>;
}

impl<T: ViewRenderer + ?Sized> ViewRenderer for Arc<T> {
    fn render_setup(&self, view: &SetupView) -> Result<HttpResponse, Error> {
        (**self).render_setup(view)
    }

    fn render_success(&self, view: &SuccessView) -> Result<HttpResponse, Error> {
        (**self).render_success(view)
    }
}

/// Renders view data as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ViewRenderer for JsonRenderer {
    fn render_setup(&self, view: &SetupView) -> Result<HttpResponse, Error> {
        HttpResponse::ok().with_json(view)
    }

    fn render_success(&self, view: &SuccessView) -> Result<HttpResponse, Error> {
        HttpResponse::ok().with_json(view)
    }
}

/// Serves the registration flow while the app has no credentials:
///
/// - `GET /` redirects to `/setup`
/// - `GET /setup` renders the registration page
/// - `GET /setup/callback?code=` exchanges the code and sends the operator
///   on to install the app
/// - `GET /setup/success` renders the confirmation page
pub struct SetupMiddleware {
    creation: Arc<ManifestCreation>,
    renderer: Arc<dyn ViewRenderer>,
}

impl SetupMiddleware {
    pub fn new(creation: Arc<ManifestCreation>) -> Self {
        Self {
            creation,
            renderer: Arc::new(JsonRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: impl ViewRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn creation(&self) -> &Arc<ManifestCreation> {
        &self.creation
    }

    fn setup_page(&self) -> Result<HttpResponse, Error> {
        let session = self.creation.session().map_err(internal)?;
        let template = self.creation.template();
        self.renderer.render_setup(&SetupView {
            name: template.name.clone(),
            description: template.description.clone(),
            version: template.version.clone(),
            create_app_url: session.create_app_url,
            manifest: session.manifest_json,
        })
    }

    async fn callback(&self, req: &HttpRequest) -> Result<HttpResponse, Error> {
        let Some(code) = req.query("code").filter(|code| !code.is_empty()) else {
            return Err(Error::BadRequest("Missing code".to_string()));
        };

        let credentials = self.creation.exchange_code(code).await.map_err(internal)?;
        info!(app_id = %credentials.app_id, "App registered, redirecting to installation");
        Ok(HttpResponse::redirect(credentials.installation_url()))
    }
}

fn internal(err: ProvisioningError) -> Error {
    error!(error = %err, "Setup step failed");
    Error::Internal(err.to_string())
}

#[async_trait]
impl Middleware for SetupMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        if !req.is_method("GET") {
            return next(req).await;
        }

        let path = req.path.clone();
        let result = match path.as_str() {
            "/" => Ok(HttpResponse::redirect(SETUP_PATH)),
            SETUP_PATH => self.setup_page(),
            CALLBACK_PATH => self.callback(&req).await,
            SUCCESS_PATH => self.renderer.render_success(&SuccessView {
                name: self.creation.template().name.clone(),
            }),
            _ => return next(req).await,
        };

        Ok(result.unwrap_or_else(|err| {
            warn!(path = %path, status = err.status_code(), "Setup request failed");
            HttpResponse::from_error(&err)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelProvider, CodeExchange, Credentials, ManifestState, ManifestTemplate};
    use sprocket_config::{Config, EnvUpdate};
    use sprocket_core::MiddlewareChain;
    use std::collections::HashMap;

    struct Channel;

    #[async_trait]
    impl ChannelProvider for Channel {
        async fn create_channel(&self) -> crate::Result<String> {
            Ok("https://smee.io/xyz".into())
        }
    }

    struct Exchange;

    #[async_trait]
    impl CodeExchange for Exchange {
        async fn exchange(&self, code: &str) -> crate::Result<Credentials> {
            match code {
                "123" => Ok(Credentials {
                    app_id: "1".into(),
                    private_key: "pem".into(),
                    webhook_secret: "secret".into(),
                    client_id: "id".into(),
                    client_secret: "client-secret".into(),
                    html_url: "https://github.com/apps/my-app".into(),
                }),
                _ => Err(ProvisioningError::Exchange("code expired".into())),
            }
        }
    }

    fn chain() -> (MiddlewareChain, Arc<ManifestCreation>) {
        let config = Config::from_map(&HashMap::new()).unwrap();
        let creation = Arc::new(
            ManifestCreation::new(
                ManifestTemplate::new("my-app")
                    .with_description("Does things")
                    .with_version("1.0.0"),
                &config,
                |_env: &EnvUpdate| {},
            )
            .unwrap()
            .with_channel_provider(Channel)
            .with_code_exchange(Exchange),
        );
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(SetupMiddleware::new(creation.clone()));
        (chain, creation)
    }

    #[tokio::test]
    async fn test_root_redirects_to_setup() {
        let (chain, _) = chain();
        let res = chain.handle(HttpRequest::new("GET", "/")).await.unwrap();
        assert_eq!(res.status, 302);
        assert_eq!(res.header("location"), Some("/setup"));
    }

    #[tokio::test]
    async fn test_setup_page_data() {
        let (chain, creation) = chain();
        let res = chain.handle(HttpRequest::new("GET", "/setup")).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(creation.state(), ManifestState::AwaitingCode);

        let view: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(view["name"], "my-app");
        assert_eq!(view["description"], "Does things");
        assert_eq!(view["version"], "1.0.0");
        assert_eq!(view["createAppUrl"], "https://github.com/settings/apps/new");
        let manifest: serde_json::Value =
            serde_json::from_str(view["manifest"].as_str().unwrap()).unwrap();
        assert_eq!(manifest["name"], "my-app");
    }

    #[tokio::test]
    async fn test_callback_redirects_to_installation() {
        let (chain, creation) = chain();
        let completion = creation.completion().unwrap();

        let req = HttpRequest::new("GET", "/setup/callback").with_query("code=123");
        let res = chain.handle(req).await.unwrap();
        assert_eq!(res.status, 302);
        assert_eq!(
            res.header("location"),
            Some("https://github.com/apps/my-app/installations/new")
        );
        assert_eq!(completion.await.unwrap().app_id, "1");
    }

    #[tokio::test]
    async fn test_callback_without_code() {
        let (chain, creation) = chain();
        let res = chain
            .handle(HttpRequest::new("GET", "/setup/callback"))
            .await
            .unwrap();
        assert_eq!(res.status, 400);
        assert_ne!(creation.state(), ManifestState::Failed);
    }

    #[tokio::test]
    async fn test_callback_exchange_failure() {
        let (chain, creation) = chain();
        let req = HttpRequest::new("GET", "/setup/callback").with_query("code=old");
        let res = chain.handle(req).await.unwrap();
        assert_eq!(res.status, 500);
        assert!(!res.text().contains("expired"));
        assert_eq!(creation.state(), ManifestState::Failed);
    }

    #[tokio::test]
    async fn test_other_routes_pass_through() {
        let (chain, _) = chain();
        let res = chain
            .handle(HttpRequest::new("GET", "/api/github/webhooks"))
            .await
            .unwrap();
        assert_eq!(res.status, 404);
        let res = chain.handle(HttpRequest::new("POST", "/setup")).await.unwrap();
        assert_eq!(res.status, 404);
    }
}
