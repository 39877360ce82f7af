//! Integration tests for sprocket-core

use parking_lot::Mutex;
use sprocket_core::*;
use sprocket_webhooks::{WebhookEvent, headers, sign};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "development";
const PUSH: &str = r#"{"ref":"refs/heads/main","repository":{"full_name":"octo/hello"}}"#;

fn recorded_chain(webhook_path: &str) -> (MiddlewareChain, Arc<Mutex<Vec<String>>>) {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = seen.clone();
    let function = app_fn(move |app: &App| {
        let sink = sink.clone();
        app.on("push", move |event: WebhookEvent| {
            let sink = sink.clone();
            async move {
                sink.lock().push(format!("{}:{}", event.name(), event.id()));
                Ok(())
            }
        });
        Ok(())
    });

    let mut chain = MiddlewareChain::new();
    chain.use_middleware(
        WebhookMiddleware::new(App::new(SECRET))
            .with_path(webhook_path)
            .with_app_fn(function),
    );
    (chain, seen)
}

#[tokio::test]
async fn test_push_delivery_over_http() {
    let (chain, seen) = recorded_chain("/api/github/webhooks");
    let mut server = Server::new(chain).with_host("127.0.0.1").with_port(0);
    let addr = server.start().await.unwrap();

    let client = reqwest::Client::new();
    let res = client
        .post(format!("http://{}/api/github/webhooks", addr))
        .header(headers::EVENT, "push")
        .header(headers::DELIVERY, "d-1")
        .header(headers::SIGNATURE_256, sign(SECRET, PUSH.as_bytes()))
        .header("content-type", "application/json")
        .body(PUSH)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client
        .post(format!("http://{}/api/github/webhooks", addr))
        .header(headers::EVENT, "push")
        .header(headers::DELIVERY, "d-2")
        .header(headers::SIGNATURE_256, sign("not the secret", PUSH.as_bytes()))
        .body(PUSH)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .post(format!("http://{}/elsewhere", addr))
        .body(PUSH)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    server.stop().await;
    assert_eq!(*seen.lock(), vec!["push:d-1"]);
}

#[tokio::test]
async fn test_proxy_forwards_deliveries() {
    let channel = MockServer::start().await;
    let message = serde_json::json!({
        "x-github-event": "push",
        "x-github-delivery": "proxied-1",
        "x-hub-signature-256": sign(SECRET, PUSH.as_bytes()),
        "timestamp": 1700000000000u64,
        "query": {},
    });
    // Splice the body in verbatim so its bytes match the signature.
    let mut data = serde_json::to_string(&message).unwrap();
    data.pop();
    data.push_str(&format!(r#","body":{}}}"#, PUSH));

    let stream = format!("event: ready\ndata: {{}}\n\nevent: ping\ndata: {{}}\n\ndata: {}\n\n", data);
    Mock::given(method("GET"))
        .and(path("/channel"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(stream),
        )
        .expect(1)
        .mount(&channel)
        .await;

    let (chain, seen) = recorded_chain("/api/github/webhooks");
    let proxy = WebhookProxy::new(
        format!("{}/channel", channel.uri()),
        "/api/github/webhooks",
        chain,
    );
    proxy.connect().await.unwrap();

    assert_eq!(*seen.lock(), vec!["push:proxied-1"]);
}

#[tokio::test]
async fn test_proxy_recovers_from_invalid_utf8() {
    let channel = MockServer::start().await;
    let message = serde_json::json!({
        "x-github-event": "push",
        "x-github-delivery": "after-garbage",
        "x-hub-signature-256": sign(SECRET, PUSH.as_bytes()),
    });
    let mut data = serde_json::to_string(&message).unwrap();
    data.pop();
    data.push_str(&format!(r#","body":{}}}"#, PUSH));

    let mut stream = b"data: \xff\xfe junk\n\n".to_vec();
    stream.extend_from_slice(format!("data: {}\n\n", data).as_bytes());
    Mock::given(method("GET"))
        .and(path("/channel"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_bytes(stream),
        )
        .mount(&channel)
        .await;

    let (chain, seen) = recorded_chain("/api/github/webhooks");
    WebhookProxy::new(format!("{}/channel", channel.uri()), "/api/github/webhooks", chain)
        .connect()
        .await
        .unwrap();

    assert_eq!(*seen.lock(), vec!["push:after-garbage"]);
}

#[tokio::test]
async fn test_proxy_connection_failure() {
    let channel = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&channel)
        .await;

    let (chain, _) = recorded_chain("/");
    let proxy = WebhookProxy::new(channel.uri(), "/", chain);
    assert!(matches!(proxy.connect().await, Err(Error::Http(_))));
}

#[tokio::test]
async fn test_server_with_proxy_stops_cleanly() {
    let channel = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("event: ready\ndata: {}\n\n"),
        )
        .mount(&channel)
        .await;

    let (chain, _) = recorded_chain("/");
    let mut server = Server::new(chain)
        .with_host("127.0.0.1")
        .with_port(0)
        .with_proxy(channel.uri());
    server.start().await.unwrap();
    assert!(server.is_running());

    server.stop().await;
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_deferred_bridges_handler_to_caller() {
    let (resolver, promise) = deferred::<String, String>();
    let app = App::new(SECRET);
    app.on("push", move |event: WebhookEvent| {
        let resolver = resolver.clone();
        async move {
            resolver.resolve(event.id().to_string());
            Ok(())
        }
    });

    for id in ["first", "second"] {
        app.verify_and_receive(id, "push", Some(&sign(SECRET, PUSH.as_bytes())), PUSH.as_bytes())
            .await
            .unwrap();
    }

    assert_eq!(promise.await.unwrap(), "first");
}
