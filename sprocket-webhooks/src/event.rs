//! Verified webhook events

use crate::{Result, WebhookError};
use serde::Serialize;
use serde_json::Value;

/// A verified webhook delivery.
///
/// Built only after the signature over the raw body has been checked, and
/// read-only from then on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEvent {
    id: String,
    name: String,
    action: Option<String>,
    payload: Value,
}

impl WebhookEvent {
    /// Create an event; the action is taken from the payload's `action` field.
    pub fn new(id: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            id: id.into(),
            name: name.into(),
            action,
            payload,
        }
    }

    /// Parse the raw JSON body of a delivery.
    pub fn from_slice(id: impl Into<String>, name: impl Into<String>, body: &[u8]) -> Result<Self> {
        let payload: Value = serde_json::from_slice(body)?;
        if !payload.is_object() {
            return Err(WebhookError::PayloadError(
                "payload must be a JSON object".to_string(),
            ));
        }
        Ok(Self::new(id, name, payload))
    }

    /// Delivery id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event name, e.g. `issues`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sub-action, e.g. `opened`
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// `name.action` when an action is present, otherwise `name`
    pub fn key(&self) -> String {
        match &self.action {
            Some(action) => format!("{}.{}", self.name, action),
            None => self.name.clone(),
        }
    }

    /// Installation id the event was delivered for, if any
    pub fn installation_id(&self) -> Option<u64> {
        self.payload
            .get("installation")
            .and_then(|installation| installation.get("id"))
            .and_then(Value::as_u64)
    }
}
