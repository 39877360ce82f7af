//! HTTP server hosting the middleware chain

use crate::proxy::WebhookProxy;
use crate::{HttpRequest, HttpResponse, MiddlewareChain, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use sprocket_config::{Config, DEFAULT_PORT, DEFAULT_WEBHOOK_PATH};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEFAULT_HOST: &str = "0.0.0.0";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    server: JoinHandle<()>,
    proxy: Option<JoinHandle<()>>,
}

/// Binds the HTTP port and optionally forwards deliveries from a proxy.
///
/// `start` and `stop` may be called repeatedly; dropping a running server
/// closes the port and the proxy connection.
pub struct Server {
    host: String,
    port: u16,
    webhook_path: String,
    proxy_url: Option<String>,
    chain: MiddlewareChain,
    running: Option<Running>,
}

impl Server {
    pub fn new(chain: MiddlewareChain) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            webhook_path: DEFAULT_WEBHOOK_PATH.to_string(),
            proxy_url: None,
            chain,
            running: None,
        }
    }

    /// Host, port, webhook path and proxy URL taken from configuration
    pub fn from_config(config: &Config, chain: MiddlewareChain) -> Self {
        let mut server = Self::new(chain)
            .with_port(config.port)
            .with_webhook_path(&config.webhook_path);
        if let Some(host) = &config.host {
            server = server.with_host(host);
        }
        if let Some(url) = &config.webhook_proxy_url {
            server = server.with_proxy(url);
        }
        server
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Port to bind; `0` picks a free port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Path proxied deliveries are replayed to
    pub fn with_webhook_path(mut self, path: impl Into<String>) -> Self {
        self.webhook_path = path.into();
        self
    }

    /// Forward deliveries from this channel URL once started
    pub fn with_proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Bound address, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind the port and start serving. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.local_addr);
        }

        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Listening on http://{}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server = tokio::spawn(serve(listener, self.chain.clone(), shutdown_rx));

        let proxy = self.proxy_url.as_ref().map(|url| {
            WebhookProxy::new(url.clone(), self.webhook_path.clone(), self.chain.clone()).spawn()
        });

        self.running = Some(Running {
            local_addr,
            shutdown_tx,
            server,
            proxy,
        });
        Ok(local_addr)
    }

    /// Close the port and the proxy connection, draining open connections
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        if let Some(proxy) = running.proxy {
            proxy.abort();
            let _ = proxy.await;
        }
        let _ = running.shutdown_tx.send(());
        if let Err(err) = running.server.await {
            warn!(error = %err, "Server task ended abnormally");
        }
        info!(addr = %running.local_addr, "Server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            if let Some(proxy) = running.proxy {
                proxy.abort();
            }
            let _ = running.shutdown_tx.send(());
        }
    }
}

async fn serve(listener: TcpListener, chain: MiddlewareChain, mut shutdown_rx: oneshot::Receiver<()>) {
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "Failed to accept connection");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let chain = chain.clone();

                let service = service_fn(move |req: Request<IncomingBody>| {
                    let chain = chain.clone();
                    async move { handle_request(req, chain).await }
                });

                let connection = graceful.watch(http1::Builder::new().serve_connection(io, service));
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        debug!(peer = %peer, error = ?err, "Error serving connection");
                    }
                });
            }
            _ = &mut shutdown_rx => break,
        }
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => debug!("All connections drained"),
        _ = tokio::time::sleep(DRAIN_TIMEOUT) => warn!("Timed out draining connections"),
    }
}

/// Handle an incoming HTTP request
async fn handle_request(
    req: Request<IncomingBody>,
    chain: MiddlewareChain,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let mut request = HttpRequest::new(req.method().as_str(), req.uri().path());
    if let Some(query) = req.uri().query() {
        request = request.with_query(query);
    }
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let body = req.collect().await?.to_bytes();
    request.body = body.to_vec();

    let response = match chain.handle(request).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Request failed");
            HttpResponse::from_error(&err)
        }
    };

    Ok(into_hyper(response))
}

fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key, value);
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|err| {
            error!(error = %err, "Invalid response");
            let mut fallback = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
