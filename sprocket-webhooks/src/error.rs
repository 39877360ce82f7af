//! Error types for webhook verification and dispatch

use std::fmt;
use thiserror::Error;

/// Error type returned by event handlers and app functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while turning a delivery into a dispatched event
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Signature header missing from the delivery
    #[error("Signature missing from request")]
    SignatureMissing,

    /// Signature did not match the body
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// Event name or delivery id header missing
    #[error("Required headers missing: {}", .0.join(", "))]
    MissingHeaders(Vec<&'static str>),

    /// Body is not a JSON document
    #[error("Payload error: {0}")]
    PayloadError(String),

    /// One or more handlers failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl WebhookError {
    /// Whether the delivery was rejected before any handler ran because it
    /// could not be authenticated.
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::SignatureMissing | Self::SignatureInvalid)
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::PayloadError(err.to_string())
    }
}

/// A single handler failure within one dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Key the handler was registered under (`push`, `issues.opened`, `*`)
    pub key: String,
    /// Position of the handler within the invocation order of the dispatch
    pub position: usize,
    /// The error the handler returned
    pub error: BoxError,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler #{} for \"{}\": {}", self.position, self.key, self.error)
    }
}

/// Aggregate of every handler failure from one dispatch.
#[derive(Debug)]
pub struct DispatchError {
    event: String,
    delivery_id: String,
    failures: Vec<HandlerFailure>,
}

impl DispatchError {
    pub fn new(
        event: impl Into<String>,
        delivery_id: impl Into<String>,
        failures: Vec<HandlerFailure>,
    ) -> Self {
        Self {
            event: event.into(),
            delivery_id: delivery_id.into(),
            failures,
        }
    }

    /// Event key of the failed dispatch
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }

    /// Every individual failure, in invocation order
    pub fn failures(&self) -> &[HandlerFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handler(s) failed for event \"{}\" (delivery {})",
            self.failures.len(),
            self.event,
            self.delivery_id
        )?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| failure.error.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn failure(key: &str, position: usize, message: &str) -> HandlerFailure {
        HandlerFailure {
            key: key.to_string(),
            position,
            error: message.into(),
        }
    }

    #[test]
    fn test_dispatch_error_enumerates_failures() {
        let err = DispatchError::new(
            "issues.opened",
            "abc",
            vec![failure("issues", 0, "boom"), failure("*", 2, "bang")],
        );

        let message = err.to_string();
        assert!(message.starts_with("2 handler(s) failed for event \"issues.opened\""));
        assert!(message.contains("handler #0 for \"issues\": boom"));
        assert!(message.contains("handler #2 for \"*\": bang"));
        assert_eq!(err.len(), 2);
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn test_authentication_classification() {
        assert!(WebhookError::SignatureMissing.is_authentication_error());
        assert!(WebhookError::SignatureInvalid.is_authentication_error());
        assert!(!WebhookError::MissingHeaders(vec!["x-github-event"]).is_authentication_error());
    }

    #[test]
    fn test_missing_headers_message() {
        let err = WebhookError::MissingHeaders(vec!["x-github-event", "x-github-delivery"]);
        assert_eq!(
            err.to_string(),
            "Required headers missing: x-github-event, x-github-delivery"
        );
    }
}
