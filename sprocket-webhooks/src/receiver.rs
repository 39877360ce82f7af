//! Verified receipt of raw deliveries

use crate::{EventRouter, Result, WebhookError, WebhookEvent, WebhookSignature};
use tracing::warn;

/// Pairs the shared secret with an [`EventRouter`].
///
/// The only path from raw bytes to a dispatched event: the signature is
/// checked over the untouched body before the body is parsed.
#[derive(Debug, Clone)]
pub struct Webhooks {
    signature: WebhookSignature,
    router: EventRouter,
}

impl Webhooks {
    pub fn new(secret: impl Into<String>) -> Self {
        Self::with_router(secret, EventRouter::new())
    }

    /// Use an existing router
    pub fn with_router(secret: impl Into<String>, router: EventRouter) -> Self {
        Self {
            signature: WebhookSignature::new(secret),
            router,
        }
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Check a signature header against a raw body
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        self.signature.verify(body, signature)
    }

    /// Verify, parse and dispatch a raw delivery.
    pub async fn verify_and_receive(
        &self,
        id: &str,
        name: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<()> {
        let signature = signature.ok_or_else(|| {
            warn!(delivery_id = %id, event = %name, "Webhook signature missing");
            WebhookError::SignatureMissing
        })?;

        if !self.verify(body, signature) {
            warn!(delivery_id = %id, event = %name, "Webhook signature does not match");
            return Err(WebhookError::SignatureInvalid);
        }

        let event = WebhookEvent::from_slice(id, name, body)?;
        self.router.receive(event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, sign};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "development";
    const BODY: &[u8] = br#"{"ref":"refs/heads/main"}"#;

    fn counting(webhooks: &Webhooks) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        webhooks.router().on("push", move |_event: WebhookEvent| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        count
    }

    #[tokio::test]
    async fn test_valid_delivery_dispatched() {
        let webhooks = Webhooks::new(SECRET);
        let count = counting(&webhooks);
        let signature = sign(SECRET, BODY);

        webhooks
            .verify_and_receive("1", "push", Some(&signature), BODY)
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_signature_not_dispatched() {
        let webhooks = Webhooks::new(SECRET);
        let count = counting(&webhooks);

        let err = webhooks
            .verify_and_receive("1", "push", None, BODY)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMissing));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tampered_body_not_dispatched() {
        let webhooks = Webhooks::new(SECRET);
        let count = counting(&webhooks);
        let signature = sign(SECRET, BODY);

        let err = webhooks
            .verify_and_receive("1", "push", Some(&signature), br#"{"ref":"other"}"#)
            .await
            .unwrap_err();
        assert!(err.is_authentication_error());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_failure_surfaces_as_dispatch_error() {
        let webhooks = Webhooks::new(SECRET);
        webhooks
            .router()
            .on("push", |_event: WebhookEvent| async { Err::<(), BoxError>("boom".into()) });
        let signature = sign(SECRET, BODY);

        let err = webhooks
            .verify_and_receive("1", "push", Some(&signature), BODY)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Dispatch(ref e) if e.len() == 1));
    }
}
