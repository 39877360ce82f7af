//! Webhook proxy forwarding
//!
//! Subscribes to a forwarding channel (for example a smee.io URL) as a
//! server-sent-event stream and replays each delivery into the local
//! middleware chain, as if GitHub had posted it directly.

use crate::{Error, HttpRequest, MiddlewareChain, Result};
use futures_util::StreamExt;
use reqwest::{Client, header};
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Event types sent by the channel itself rather than carrying deliveries
const CONTROL_EVENTS: [&str; 2] = ["ready", "ping"];

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Chunks may split lines and events anywhere; complete events are returned
/// as soon as their terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current: SseMessage,
    has_data: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<SseMessage> {
        self.buffer.push_str(chunk);
        let mut messages = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if self.has_data || self.current.event.is_some() {
                    messages.push(std::mem::take(&mut self.current));
                }
                self.has_data = false;
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.current.event = Some(value.to_string()),
                "data" => {
                    if self.has_data {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                    self.has_data = true;
                }
                _ => {}
            }
        }

        messages
    }
}

/// Turn a channel message into the request GitHub originally sent.
///
/// Every top-level string field except `body`, `query` and `timestamp` is a
/// header. The `body` field is taken verbatim, so signatures computed over
/// it still verify. Returns `None` for messages without a body.
pub fn delivery_request(data: &str, path: &str) -> Result<Option<HttpRequest>> {
    let fields: HashMap<String, Box<RawValue>> = serde_json::from_str(data)?;

    let Some(body) = fields.get("body") else {
        return Ok(None);
    };

    let mut req = HttpRequest::new("POST", path).with_body(body.get().as_bytes().to_vec());
    for (name, value) in &fields {
        if matches!(name.as_str(), "body" | "query" | "timestamp") {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<String>(value.get()) {
            req = req.with_header(name, value);
        }
    }
    Ok(Some(req))
}

/// Decode as much of `pending` as possible.
///
/// A truncated sequence at the end is kept for the next chunk; invalid bytes
/// anywhere else are replaced with U+FFFD and consumed.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let complete = match std::str::from_utf8(pending) {
        Ok(text) => text.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => {
            let mut complete = pending.len();
            // Step back over a trailing sequence that may still be incomplete.
            for back in 1..=3.min(pending.len()) {
                let start = pending.len() - back;
                if let Err(err) = std::str::from_utf8(&pending[start..]) {
                    if err.valid_up_to() == 0 && err.error_len().is_none() {
                        complete = start;
                        break;
                    }
                }
            }
            complete
        }
    };
    let text = String::from_utf8_lossy(&pending[..complete]).into_owned();
    pending.drain(..complete);
    text
}

/// Forwards deliveries from a proxy channel into a middleware chain
#[derive(Clone)]
pub struct WebhookProxy {
    url: String,
    path: String,
    chain: MiddlewareChain,
    client: Client,
    reconnect_delay: Duration,
}

impl WebhookProxy {
    pub fn new(url: impl Into<String>, path: impl Into<String>, chain: MiddlewareChain) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            chain,
            client: Client::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run the forwarder in the background, reconnecting when the stream ends.
    ///
    /// Abort the returned handle to close the connection.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(url = %self.url, path = %self.path, "Forwarding webhooks from proxy");
            loop {
                match self.connect().await {
                    Ok(()) => debug!(url = %self.url, "Proxy stream closed"),
                    Err(err) => warn!(url = %self.url, error = %err, "Proxy connection failed"),
                }
                tokio::time::sleep(self.reconnect_delay).await;
            }
        })
    }

    /// Consume the event stream once, until the channel closes it
    pub async fn connect(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "proxy responded with {}",
                response.status()
            )));
        }

        debug!(url = %self.url, "Proxy connection established");
        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            pending.extend_from_slice(&chunk?);
            let text = take_utf8(&mut pending);
            for message in parser.push(&text) {
                self.forward(message).await;
            }
        }
        Ok(())
    }

    /// Replay one channel message into the chain
    pub async fn forward(&self, message: SseMessage) {
        if message
            .event
            .as_deref()
            .is_some_and(|event| CONTROL_EVENTS.contains(&event))
        {
            debug!(event = ?message.event, "Ignoring proxy control event");
            return;
        }

        let req = match delivery_request(&message.data, &self.path) {
            Ok(Some(req)) => req,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "Ignoring malformed proxy message");
                return;
            }
        };

        let delivery_id = req
            .header(sprocket_webhooks::headers::DELIVERY)
            .unwrap_or("-")
            .to_string();
        match self.chain.handle(req).await {
            Ok(res) => debug!(delivery_id = %delivery_id, status = res.status, "Forwarded delivery"),
            Err(err) => error!(delivery_id = %delivery_id, error = %err, "Failed to forward delivery"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push("event: rea").is_empty());
        assert!(parser.push("dy\ndata: {}\n").is_empty());

        let messages = parser.push("\r\ndata: {\"a\":1}\n\n");
        assert_eq!(
            messages,
            vec![
                SseMessage {
                    event: Some("ready".into()),
                    data: "{}".into()
                },
                SseMessage {
                    event: None,
                    data: "{\"a\":1}".into()
                },
            ]
        );
    }

    #[test]
    fn test_parser_joins_data_lines_and_skips_comments() {
        let mut parser = SseParser::new();
        let messages = parser.push(": keepalive\ndata: a\ndata: b\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "a\nb");
    }

    #[test]
    fn test_delivery_request_keeps_body_bytes() {
        let data = r#"{"x-github-event":"push","x-github-delivery":"abc","x-hub-signature-256":"sha256=00","body":{"ref" : "main","n":1.50},"query":{},"timestamp":1}"#;
        let req = delivery_request(data, "/api/github/webhooks")
            .unwrap()
            .unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/github/webhooks");
        assert_eq!(req.body, br#"{"ref" : "main","n":1.50}"#.to_vec());
        assert_eq!(req.header("x-github-event"), Some("push"));
        assert_eq!(req.header("x-github-delivery"), Some("abc"));
        assert_eq!(req.header("timestamp"), None);
    }

    #[test]
    fn test_take_utf8_holds_back_split_sequence() {
        let mut pending = "data: caf\u{e9}".as_bytes().to_vec();
        let tail = pending.pop().unwrap();

        assert_eq!(take_utf8(&mut pending), "data: caf");
        assert_eq!(pending.len(), 1);

        pending.push(tail);
        assert_eq!(take_utf8(&mut pending), "\u{e9}");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_utf8_skips_invalid_bytes() {
        let mut pending = b"data: \xff\xfe junk\n\ndata: {}\n\n".to_vec();
        let text = take_utf8(&mut pending);
        assert!(pending.is_empty());

        let messages = SseParser::new().push(&text);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].data, "{}");
    }

    #[test]
    fn test_take_utf8_invalid_byte_then_split_sequence() {
        let mut pending = b"\xffok\xc3".to_vec();
        assert_eq!(take_utf8(&mut pending), "\u{fffd}ok");
        assert_eq!(pending, vec![0xc3]);
    }

    #[test]
    fn test_delivery_request_without_body() {
        assert!(delivery_request("{}", "/").unwrap().is_none());
        assert!(delivery_request("not json", "/").is_err());
    }
}
